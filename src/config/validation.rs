//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check value ranges (timeouts > 0, retry delays ordered)
//! - Check that fallback error handlers are enabled
//! - Check that handler configs are JSON objects
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Handler configs are only checked for shape; each stage validates its own

use serde_json::Value;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::EngineConfig;
use crate::pipeline::error::HandlerKind;

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validates `config`, collecting every problem found.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.timeouts.decision_ms == 0 {
        errors.push(ValidationError::new("timeouts.decision_ms", "must be greater than 0"));
    }
    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be greater than 0"));
    }

    if config.cache.default_ttl_ms == 0 {
        errors.push(ValidationError::new("cache.default_ttl_ms", "must be greater than 0"));
    }
    if config.cache.max_entries == 0 {
        errors.push(ValidationError::new("cache.max_entries", "must be greater than 0"));
    }

    if config.retries.base_delay_ms > config.retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }

    for (index, path) in config.access_rules.repositories.iter().enumerate() {
        if path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                format!("access_rules.repositories[{index}]"),
                "must not be empty",
            ));
        }
    }

    for (section, kind) in [
        ("authenticators", HandlerKind::Authenticator),
        ("authorizers", HandlerKind::Authorizer),
        ("mutators", HandlerKind::Mutator),
        ("errors.handlers", HandlerKind::ErrorHandler),
    ] {
        for (id, settings) in config.handlers(kind) {
            if !matches!(settings.config, Value::Null | Value::Object(_)) {
                errors.push(ValidationError::new(
                    format!("{section}.{id}.config"),
                    "must be a table",
                ));
            }
        }
    }

    for name in &config.errors.fallback {
        if !config.is_enabled(HandlerKind::ErrorHandler, name) {
            errors.push(ValidationError::new(
                "errors.fallback",
                format!("error handler \"{name}\" is not enabled"),
            ));
        }
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("\"{}\" is not a valid filter", config.observability.log_level),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn test_fallback_must_be_enabled() {
        let mut config = EngineConfig::default();
        config.errors.fallback.push("redirect".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "errors.fallback");
        assert!(errors[0].message.contains("redirect"));
    }

    #[test]
    fn test_handler_config_must_be_table() {
        let config =
            EngineConfig::default().enable(HandlerKind::Authorizer, "remote", json!("http://pdp"));
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "authorizers.remote.config");
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.cache.max_entries = 0;
        config.retries.base_delay_ms = 10_000;
        config.timeouts.upstream_ms = 0;
        assert_eq!(validate_config(&config).unwrap_err().len(), 3);
    }
}
