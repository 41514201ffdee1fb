//! Scenario execution against the in-memory backend.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::error::{ScenarioError, StepError};
use super::model::{Scenario, Step};
use crate::memory::{HandlerEvent, MemoryHandler, MemoryTransaction};
use crate::transaction::{
    CategoryExceptionHandler, HandlerRegistry, Invocation, ManagerStats, Propagation,
    ResourceKey, TransactionContext, TransactionError, TransactionManager, TransactionResult,
};

/// What happened to one step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: String,
    /// Nesting depth, 0 for top-level steps.
    pub depth: usize,
    pub propagation: Propagation,
    /// `handler/resource`, when the step resolved to one.
    pub resource: Option<String>,
    /// The error the step's boundary returned, if any.
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub name: Option<String>,
    /// Step outcomes in the order the steps were entered.
    pub outcomes: Vec<StepOutcome>,
    /// Handler journals, by handler name.
    pub events: BTreeMap<String, Vec<HandlerEvent>>,
    /// Committed data, by handler name then resource.
    pub stores: BTreeMap<String, BTreeMap<String, BTreeMap<String, Value>>>,
    pub stats: ManagerStats,
}

impl ScenarioReport {
    /// Check if every top-level step succeeded.
    pub fn succeeded(&self) -> bool {
        self.outcomes
            .iter()
            .filter(|o| o.depth == 0)
            .all(StepOutcome::is_ok)
    }

    /// Outcome of the first step named `step`.
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.outcomes.iter().find(|o| o.step == step)
    }

    /// Committed value of `key` in `handler`'s `resource` store.
    pub fn value(&self, handler: &str, resource: &str, key: &str) -> Option<&Value> {
        self.stores.get(handler)?.get(resource)?.get(key)
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            writeln!(f, "scenario: {}", name)?;
        }
        writeln!(f, "steps:")?;
        for outcome in &self.outcomes {
            let indent = "  ".repeat(outcome.depth + 1);
            let status = if outcome.is_ok() { "ok  " } else { "FAIL" };
            write!(
                f,
                "{}{} {} [{}",
                indent, status, outcome.step, outcome.propagation
            )?;
            if let Some(resource) = &outcome.resource {
                write!(f, " {}", resource)?;
            }
            write!(f, "]")?;
            if let Some(error) = &outcome.error {
                write!(f, ": {}", error)?;
            }
            writeln!(f)?;
        }
        for (handler, events) in &self.events {
            writeln!(f, "journal ({}):", handler)?;
            for event in events {
                writeln!(f, "  {}", event)?;
            }
        }
        for (handler, stores) in &self.stores {
            for (resource, data) in stores {
                writeln!(f, "store {}/{}:", handler, resource)?;
                for (key, value) in data {
                    writeln!(f, "  {} = {}", key, value)?;
                }
            }
        }
        write!(
            f,
            "stats: created={} joined={} committed={} rolled_back={}",
            self.stats.created, self.stats.joined, self.stats.committed, self.stats.rolled_back
        )
    }
}

/// Runs a scenario on a fresh manager over in-memory handlers.
#[derive(Debug)]
pub struct ScenarioRunner {
    scenario: Scenario,
    manager: TransactionManager<MemoryHandler>,
}

impl ScenarioRunner {
    pub fn new(scenario: Scenario) -> Result<Self, ScenarioError> {
        scenario.validate()?;

        let mut registry = HandlerRegistry::new();
        for name in &scenario.handlers {
            if registry.register(MemoryHandler::new(name.as_str())).is_some() {
                return Err(ScenarioError::Invalid(format!(
                    "handler '{}' is listed twice",
                    name
                )));
            }
        }
        for (name, categories) in &scenario.exception_handlers {
            registry.register_exception_handler(
                name.as_str(),
                CategoryExceptionHandler::new(categories.iter().cloned()),
            );
        }

        let manager = TransactionManager::with_config(scenario.config.clone(), registry)?;
        Ok(Self { scenario, manager })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ScenarioError> {
        Self::new(Scenario::from_toml_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        Self::new(Scenario::load(path)?)
    }

    pub fn manager(&self) -> &TransactionManager<MemoryHandler> {
        &self.manager
    }

    /// Run every top-level step from an empty context.
    ///
    /// A failing top-level step does not stop the ones after it.
    pub fn run(&self) -> ScenarioReport {
        let mut outcomes = Vec::new();
        for step in &self.scenario.steps {
            let context = TransactionContext::new();
            if let Err(e) = self.run_step(&context, step, 0, &mut outcomes) {
                info!(step = %step.name, error = %e, "scenario step failed");
            }
        }

        let registry = self.manager.registry();
        let mut events = BTreeMap::new();
        let mut stores = BTreeMap::new();
        for name in registry.names() {
            if let Some(handler) = registry.get(&name) {
                events.insert(name.clone(), handler.events());
                stores.insert(name, handler.snapshot());
            }
        }

        ScenarioReport {
            name: self.scenario.name.clone(),
            outcomes,
            events,
            stores,
            stats: self.manager.stats(),
        }
    }

    fn run_step(
        &self,
        context: &TransactionContext<MemoryTransaction>,
        step: &Step,
        depth: usize,
        outcomes: &mut Vec<StepOutcome>,
    ) -> TransactionResult<(), StepError> {
        let invocation = Invocation::new(&step.name).with_method_attributes(step.attributes());
        let metadata = self.manager.resolve(&invocation);
        debug!(step = %step.name, metadata = %metadata, "running scenario step");

        let index = outcomes.len();
        outcomes.push(StepOutcome {
            step: step.name.clone(),
            depth,
            propagation: metadata.propagation,
            resource: None,
            error: None,
        });

        let result = match self.manager.resource_key(&metadata) {
            Ok(key) => {
                outcomes[index].resource = Some(key.to_string());
                self.manager.invoke_with(
                    context,
                    &metadata,
                    |context| -> TransactionResult<(), StepError> {
                        self.write(context, &key, step)?;
                        for child in &step.steps {
                            let child_result = self.run_step(context, child, depth + 1, outcomes);
                            if !step.recover {
                                child_result?;
                            }
                        }
                        match &step.fail {
                            Some(category) => Err(TransactionError::Body(StepError::Failed {
                                step: step.name.clone(),
                                category: category.clone(),
                            })),
                            None => Ok(()),
                        }
                    },
                )
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = &result {
            outcomes[index].error = Some(e.to_string());
        }
        result
    }

    /// Apply the step's writes: staged in the current transaction of its
    /// resource, or straight to the store when there is none.
    fn write(
        &self,
        context: &TransactionContext<MemoryTransaction>,
        key: &ResourceKey,
        step: &Step,
    ) -> TransactionResult<(), StepError> {
        if step.writes.is_empty() {
            return Ok(());
        }
        match context.get(key) {
            Some(handle) => handle.with_transaction(|tx| {
                step.writes
                    .iter()
                    .try_for_each(|(k, v)| tx.put(k.as_str(), v.clone()))
                    .map_err(|source| {
                        TransactionError::Body(StepError::Write {
                            step: step.name.clone(),
                            source,
                        })
                    })
            }),
            None => {
                if let Some(handler) = self.manager.registry().get(key.handler()) {
                    let store = handler.store(key.resource());
                    for (k, v) in &step.writes {
                        store.put(k.as_str(), v.clone());
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::HandlerOperation;
    use serde_json::json;

    fn run(toml: &str) -> ScenarioReport {
        ScenarioRunner::from_toml_str(toml).unwrap().run()
    }

    #[test]
    fn test_requires_new_failure_is_isolated() {
        let report = run(r#"
            [config]
            default_resource = "main"

            [[steps]]
            name = "place-order"
            writes = { order = 1 }
            recover = true

            [[steps.steps]]
            name = "audit"
            propagation = "REQUIRES_NEW"
            writes = { audit = "placed" }
            fail = "audit"
        "#);

        assert!(report.succeeded());
        assert!(!report.outcome("audit").unwrap().is_ok());
        assert_eq!(report.value("memory", "main", "order"), Some(&json!(1)));
        assert_eq!(report.value("memory", "main", "audit"), None);
        assert_eq!(report.stats.created, 2);
        assert_eq!(report.stats.committed, 1);
        assert_eq!(report.stats.rolled_back, 1);
    }

    #[test]
    fn test_joined_failure_rolls_back_owner() {
        let report = run(r#"
            [[steps]]
            name = "outer"
            writes = { a = 1 }
            recover = true

            [[steps.steps]]
            name = "inner"
            writes = { b = 2 }
            fail = "validation"
        "#);

        assert!(!report.succeeded());
        let outer = report.outcome("outer").unwrap();
        assert!(outer.error.as_deref().unwrap().contains("UNEXPECTED_ROLLBACK"));
        assert_eq!(outer.resource.as_deref(), Some("memory/memory"));
        assert!(report.stores["memory"].get("memory").map_or(true, |d| d.is_empty()));
        assert_eq!(report.stats.joined, 1);
    }

    #[test]
    fn test_handled_joined_failure_lets_owner_commit() {
        let report = run(r#"
            [exception_handlers]
            lenient = ["audit"]

            [[steps]]
            name = "outer"
            writes = { a = 1 }
            recover = true

            [[steps.steps]]
            name = "inner"
            exception_handler = "lenient"
            writes = { b = 2 }
            fail = "audit"
        "#);

        assert!(report.succeeded());
        assert!(!report.outcome("inner").unwrap().is_ok());
        assert_eq!(report.value("memory", "memory", "a"), Some(&json!(1)));
        assert_eq!(report.value("memory", "memory", "b"), Some(&json!(2)));
    }

    #[test]
    fn test_mandatory_without_transaction() {
        let report = run(r#"
            [[steps]]
            name = "orphan"
            propagation = "MANDATORY"
        "#);

        let outcome = report.outcome("orphan").unwrap();
        assert!(outcome.error.as_deref().unwrap().contains("NO_TRANSACTION_FOR_MANDATORY"));
        let ops: Vec<_> = report.events["memory"].iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![HandlerOperation::Initialize, HandlerOperation::Cleanup]);
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let report = run(r#"
            [[steps]]
            name = "report"
            read_only = true
            writes = { x = 1 }
        "#);

        let outcome = report.outcome("report").unwrap();
        assert!(outcome.error.as_deref().unwrap().contains("read-only"));
        assert_eq!(report.stats.rolled_back, 1);
        assert_eq!(report.value("memory", "memory", "x"), None);
    }

    #[test]
    fn test_not_supported_writes_autocommit() {
        let report = run(r#"
            [[steps]]
            name = "outer"
            writes = { a = 1 }
            fail = "boom"

            [[steps.steps]]
            name = "log"
            propagation = "NOT_SUPPORTED"
            writes = { log = "seen" }
        "#);

        assert!(!report.succeeded());
        assert_eq!(report.value("memory", "memory", "a"), None);
        assert_eq!(report.value("memory", "memory", "log"), Some(&json!("seen")));
    }

    #[test]
    fn test_separate_handlers() {
        let report = run(r#"
            handlers = ["orders", "audit"]

            [[steps]]
            name = "place"
            handler = "orders"
            writes = { order = 1 }

            [[steps.steps]]
            name = "record"
            handler = "audit"
            writes = { entry = "placed" }

            [[steps]]
            name = "anonymous"
        "#);

        assert_eq!(report.value("orders", "orders", "order"), Some(&json!(1)));
        assert_eq!(report.value("audit", "audit", "entry"), Some(&json!("placed")));
        assert_eq!(report.stats.created, 2);
        let anonymous = report.outcome("anonymous").unwrap();
        assert!(anonymous.error.as_deref().unwrap().contains("NO_HANDLER_SPECIFIED"));
        assert_eq!(anonymous.resource, None);
    }

    #[test]
    fn test_invalid_scenarios() {
        let err = ScenarioRunner::from_toml_str(
            "handlers = [\"a\", \"a\"]\n[[steps]]\nname = \"s\"",
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Invalid(_)));

        let err = ScenarioRunner::from_toml_str(
            "[config]\ndefault_handler = \"jdbc\"\n[[steps]]\nname = \"s\"",
        )
        .unwrap_err();
        assert!(matches!(err, ScenarioError::Configuration(_)));
    }

    #[test]
    fn test_demo_scenario() {
        let report = run(include_str!("../../demos/orders.toml"));

        assert!(report.succeeded());
        assert!(!report.outcome("notify").unwrap().is_ok());
        assert_eq!(report.value("memory", "orders", "stock-book"), Some(&json!(9)));
        assert_eq!(
            report.value("memory", "audit", "audit-1"),
            Some(&json!("order-1 placed"))
        );
        assert_eq!(report.stats.created, 2);
        assert_eq!(report.stats.committed, 2);
        assert_eq!(report.stats.joined, 2);
    }

    #[test]
    fn test_report_rendering() {
        let report = run(r#"
            name = "demo"

            [[steps]]
            name = "only"
            writes = { k = "v" }
        "#);

        let text = report.to_string();
        assert!(text.starts_with("scenario: demo"));
        assert!(text.contains("ok   only [REQUIRED memory/memory]"));
        assert!(text.contains("journal (memory):"));
        assert!(text.contains("  k = \"v\""));
        assert!(text.ends_with("stats: created=1 joined=0 committed=1 rolled_back=0"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["outcomes"][0]["step"], "only");
        assert_eq!(json["events"]["memory"][0]["operation"], "initialize");
    }
}
