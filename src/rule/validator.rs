//! Structural and handler checks run whenever a rule set is replaced.
//!
//! Checks run in a fixed order and the first failure is returned:
//! match (present, and compiling in the active dialect), upstream URL,
//! authenticators, authorizer, mutators, error handlers. Each handler must be known, enabled, and accept its merged
//! configuration.

use std::sync::Arc;
use url::Url;

use crate::matcher::MatchingEngine;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::registry::HandlerRegistry;
use crate::rule::model::{Handler, Rule};

/// Validates rules against the registered stages.
#[derive(Debug, Clone)]
pub struct RuleValidator {
    registry: Arc<HandlerRegistry>,
}

impl RuleValidator {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Checks `rule`, compiling its pattern with `engine`.
    pub fn validate(&self, rule: &Rule, engine: &dyn MatchingEngine) -> DecisionResult<()> {
        let pattern = match &rule.matcher {
            Some(m) if !m.is_empty() => m.pattern(),
            Some(_) => return Err(invalid(rule, "value of \"match\" must not be empty")),
            None => return Err(invalid(rule, "value of \"match\" must be set")),
        };
        engine.is_matching(&pattern, "").map_err(|e| {
            invalid(
                rule,
                format!("value of \"match\" is not a valid {} pattern: {e}", engine.strategy()),
            )
        })?;

        if !rule.upstream.url.is_empty() {
            Url::parse(&rule.upstream.url).map_err(|e| {
                invalid(rule, format!("value of \"upstream.url\" is not a valid URL: {e}"))
            })?;
        }

        if rule.authenticators.is_empty() {
            return Err(invalid(rule, "at least one authenticator must be set"));
        }
        for handler in &rule.authenticators {
            let stage = self.registry.authenticator(&handler.handler)?;
            stage.validate(&self.merged(HandlerKind::Authenticator, handler))?;
        }

        if rule.authorizer.handler.is_empty() {
            return Err(invalid(rule, "value of \"authorizer.handler\" must be set"));
        }
        let stage = self.registry.authorizer(&rule.authorizer.handler)?;
        stage.validate(&self.merged(HandlerKind::Authorizer, &rule.authorizer))?;

        for handler in &rule.mutators {
            let stage = self.registry.mutator(&handler.handler)?;
            stage.validate(&self.merged(HandlerKind::Mutator, handler))?;
        }

        for handler in &rule.errors {
            let stage = self.registry.error_handler(&handler.handler)?;
            stage.validate(&self.merged(HandlerKind::ErrorHandler, handler))?;
        }

        Ok(())
    }

    fn merged(&self, kind: HandlerKind, handler: &Handler) -> serde_json::Value {
        self.registry.merged_config(kind, handler)
    }
}

fn invalid(rule: &Rule, reason: impl Into<String>) -> DecisionError {
    DecisionError::InvalidRule {
        id: rule.id.clone(),
        reason: reason.into(),
    }
}
