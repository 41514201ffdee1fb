//! Transaction propagation policies.
//!
//! Propagation decides what a boundary does with the transaction already
//! bound to its resource, if any:
//! - Required: join it, or start one
//! - RequiresNew: always start a fresh one, shadowing the existing one
//! - Mandatory: join it, fail if there is none
//! - Supports: join it, or run without one
//! - NotSupported: run without one, suspending the existing one
//! - Never: run without one, fail if there is one

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transaction::error::ParsePropagationError;

/// Transaction propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Propagation {
    /// Join the current transaction or create a new one.
    #[default]
    Required,

    /// Always create a new transaction.
    ///
    /// The caller's transaction, if any, is left untouched and becomes visible
    /// again once the boundary returns.
    RequiresNew,

    /// Join the current transaction; fail if none exists.
    Mandatory,

    /// Join the current transaction if one exists, otherwise run without.
    Supports,

    /// Run without a transaction, suspending the current one.
    NotSupported,

    /// Run without a transaction; fail if one exists.
    Never,
}

impl Propagation {
    /// Check if this policy may create a transaction.
    pub fn may_create(&self) -> bool {
        matches!(self, Propagation::Required | Propagation::RequiresNew)
    }

    /// Check if this policy may join an existing transaction.
    pub fn may_join(&self) -> bool {
        matches!(
            self,
            Propagation::Required | Propagation::Mandatory | Propagation::Supports
        )
    }

    /// Get a human-readable description of this policy.
    pub fn description(&self) -> &'static str {
        match self {
            Propagation::Required => "Join the current transaction or create one",
            Propagation::RequiresNew => "Always run in a new transaction",
            Propagation::Mandatory => "Join the current transaction, which must exist",
            Propagation::Supports => "Join the current transaction if there is one",
            Propagation::NotSupported => "Suspend the current transaction and run without",
            Propagation::Never => "Run without a transaction, which must not exist",
        }
    }
}

impl fmt::Display for Propagation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Propagation::Required => write!(f, "REQUIRED"),
            Propagation::RequiresNew => write!(f, "REQUIRES_NEW"),
            Propagation::Mandatory => write!(f, "MANDATORY"),
            Propagation::Supports => write!(f, "SUPPORTS"),
            Propagation::NotSupported => write!(f, "NOT_SUPPORTED"),
            Propagation::Never => write!(f, "NEVER"),
        }
    }
}

impl std::str::FromStr for Propagation {
    type Err = ParsePropagationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "REQUIRED" => Ok(Propagation::Required),
            "REQUIRES_NEW" | "REQUIRESNEW" => Ok(Propagation::RequiresNew),
            "MANDATORY" => Ok(Propagation::Mandatory),
            "SUPPORTS" => Ok(Propagation::Supports),
            "NOT_SUPPORTED" | "NOTSUPPORTED" => Ok(Propagation::NotSupported),
            "NEVER" => Ok(Propagation::Never),
            _ => Err(ParsePropagationError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptions() {
        assert!(Propagation::Mandatory.description().contains("must exist"));
        assert!(Propagation::Never.description().contains("must not exist"));
    }

    #[test]
    fn test_default_propagation() {
        assert_eq!(Propagation::default(), Propagation::Required);
    }

    #[test]
    fn test_parse_propagation() {
        assert_eq!(
            "requires new".parse::<Propagation>().unwrap(),
            Propagation::RequiresNew
        );
        assert_eq!(
            "NOT-SUPPORTED".parse::<Propagation>().unwrap(),
            Propagation::NotSupported
        );
        assert_eq!(
            " mandatory ".parse::<Propagation>().unwrap(),
            Propagation::Mandatory
        );
        assert_eq!(
            "nested".parse::<Propagation>(),
            Err(ParsePropagationError("nested".to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for p in [
            Propagation::Required,
            Propagation::RequiresNew,
            Propagation::Mandatory,
            Propagation::Supports,
            Propagation::NotSupported,
            Propagation::Never,
        ] {
            assert_eq!(p.to_string().parse::<Propagation>().unwrap(), p);
        }
    }

    #[test]
    fn test_create_and_join() {
        assert!(Propagation::Required.may_create());
        assert!(Propagation::Required.may_join());
        assert!(Propagation::RequiresNew.may_create());
        assert!(!Propagation::RequiresNew.may_join());
        assert!(!Propagation::Supports.may_create());
        assert!(!Propagation::Never.may_join());
    }
}
