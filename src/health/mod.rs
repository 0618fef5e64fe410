//! Readiness reporting.
//!
//! # Data Flow
//! ```text
//! Components implementing ReadyChecker (rule repository, ...)
//!     → ReadinessReport::collect (ask every checker)
//!     → adapter renders the report on its health endpoint
//! ```
//!
//! # Design Decisions
//! - Checks are synchronous and cheap; they read in-memory state only
//! - A report lists every failing checker, not just the first

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A component that can tell whether it is ready to serve decisions.
pub trait ReadyChecker: Send + Sync {
    /// Stable name shown in reports.
    fn name(&self) -> &str;

    /// `Err(reason)` while not ready.
    fn check(&self) -> Result<(), String>;
}

/// Outcome of asking a set of checkers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub errors: BTreeMap<String, String>,
}

impl ReadinessReport {
    pub fn collect(checkers: &[Arc<dyn ReadyChecker>]) -> Self {
        let errors: BTreeMap<String, String> = checkers
            .iter()
            .filter_map(|c| c.check().err().map(|reason| (c.name().to_string(), reason)))
            .collect();
        if !errors.is_empty() {
            tracing::debug!(failing = errors.len(), "Readiness check failed");
        }
        Self {
            ready: errors.is_empty(),
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Result<(), String>);

    impl ReadyChecker for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn check(&self) -> Result<(), String> {
            self.1.clone()
        }
    }

    #[test]
    fn test_report_lists_failing_checkers() {
        let checkers: Vec<Arc<dyn ReadyChecker>> = vec![
            Arc::new(Fixed("a", Ok(()))),
            Arc::new(Fixed("b", Err("no rules".into()))),
        ];
        let report = ReadinessReport::collect(&checkers);
        assert!(!report.ready);
        assert_eq!(report.errors.get("b").map(String::as_str), Some("no rules"));
        assert!(!report.errors.contains_key("a"));
    }

    #[test]
    fn test_empty_report_is_ready() {
        assert!(ReadinessReport::collect(&[]).ready);
    }
}
