//! SeedTx - scenario runner
//!
//! Runs a TOML transaction scenario on the in-memory backend and prints what
//! every handler did.

use std::path::PathBuf;
use std::process::ExitCode;

use seedtx::scenario::{Scenario, ScenarioReport, ScenarioRunner};
use seedtx::transaction::{Propagation, TransactionConfig};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    // Parse simple command line args.
    let mut scenario_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut verbose = false;
    let mut json = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                i += 1;
                match args.get(i) {
                    Some(path) => config_path = Some(PathBuf::from(path)),
                    None => {
                        eprintln!("Missing value for {}", args[i - 1]);
                        return ExitCode::FAILURE;
                    }
                }
            }
            "-v" | "--verbose" => {
                verbose = true;
            }
            "-j" | "--json" => {
                json = true;
            }
            "-h" | "--help" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            "--version" => {
                println!("seedtx v{}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            arg => {
                if !arg.starts_with('-') && scenario_path.is_none() {
                    scenario_path = Some(PathBuf::from(arg));
                } else {
                    eprintln!("Unknown option: {}", arg);
                    return ExitCode::FAILURE;
                }
            }
        }
        i += 1;
    }

    init_logging(verbose);

    let Some(scenario_path) = scenario_path else {
        eprintln!("No scenario file given");
        print_help();
        return ExitCode::FAILURE;
    };

    let report = match run(scenario_path, config_path) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("{}", report);
    }

    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "seedtx=debug" } else { "seedtx=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(
    scenario_path: PathBuf,
    config_path: Option<PathBuf>,
) -> Result<ScenarioReport, Box<dyn std::error::Error>> {
    let mut scenario = Scenario::load(&scenario_path)?;
    if let Some(path) = config_path {
        scenario.config = TransactionConfig::load(&path)?;
    }
    let runner = ScenarioRunner::new(scenario)?;
    Ok(runner.run())
}

fn print_help() {
    println!("seedtx - transactional boundary scenario runner");
    println!();
    println!("Usage: seedtx [OPTIONS] SCENARIO");
    println!();
    println!("Options:");
    println!("  -c, --config PATH    Transaction config (overrides the scenario's [config])");
    println!("  -j, --json           Print the report as JSON");
    println!("  -v, --verbose        Enable debug logging (RUST_LOG takes precedence)");
    println!("  -h, --help           Show this help message");
    println!("  --version            Show version");
    println!();
    println!("Propagation policies:");
    for propagation in [
        Propagation::Required,
        Propagation::RequiresNew,
        Propagation::Mandatory,
        Propagation::Supports,
        Propagation::NotSupported,
        Propagation::Never,
    ] {
        println!("  {:<14} {}", propagation.to_string(), propagation.description());
    }
    println!();
    println!("Examples:");
    println!("  seedtx orders.toml              Run a scenario and print the journal");
    println!("  RUST_LOG=trace seedtx -j a.toml Trace every handler call, JSON report");
}
