//! Scripted transaction scenarios.
//!
//! A scenario is a TOML document describing a tree of nested transactional
//! steps. Running it against the in-memory backend shows exactly which
//! handler calls each propagation policy produces.
//!
//! ```toml
//! handlers = ["memory"]
//!
//! [config]
//! default_resource = "main"
//!
//! [[steps]]
//! name = "place-order"
//! writes = { order = 1 }
//!
//! [[steps.steps]]
//! name = "audit"
//! propagation = "REQUIRES_NEW"
//! writes = { audit = "order placed" }
//! fail = "audit"
//! ```

mod error;
mod model;
mod runner;

pub use error::{ScenarioError, StepError};
pub use model::{Scenario, Step};
pub use runner::{ScenarioReport, ScenarioRunner, StepOutcome};
