//! Configuration schema definitions.
//!
//! This module defines the engine configuration. Every section has
//! production defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::matcher::MatchingStrategy;
use crate::pipeline::error::HandlerKind;

/// Root configuration of the decision engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule sources and matching dialect.
    pub access_rules: AccessRulesConfig,

    /// Authenticator enablement and global configuration, by handler id.
    pub authenticators: BTreeMap<String, HandlerSettings>,

    /// Authorizer enablement and global configuration, by handler id.
    pub authorizers: BTreeMap<String, HandlerSettings>,

    /// Mutator enablement and global configuration, by handler id.
    pub mutators: BTreeMap<String, HandlerSettings>,

    /// Error handlers and the fallback chain.
    pub errors: ErrorsConfig,

    /// Defaults for stage caches.
    pub cache: CacheConfig,

    /// Deadlines.
    pub timeouts: TimeoutConfig,

    /// Retry budget for remote stage calls.
    pub retries: RetryConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

impl EngineConfig {
    /// Settings map for handlers of `kind`.
    pub fn handlers(&self, kind: HandlerKind) -> &BTreeMap<String, HandlerSettings> {
        match kind {
            HandlerKind::Authenticator => &self.authenticators,
            HandlerKind::Authorizer => &self.authorizers,
            HandlerKind::Mutator => &self.mutators,
            HandlerKind::ErrorHandler => &self.errors.handlers,
        }
    }

    fn handlers_mut(&mut self, kind: HandlerKind) -> &mut BTreeMap<String, HandlerSettings> {
        match kind {
            HandlerKind::Authenticator => &mut self.authenticators,
            HandlerKind::Authorizer => &mut self.authorizers,
            HandlerKind::Mutator => &mut self.mutators,
            HandlerKind::ErrorHandler => &mut self.errors.handlers,
        }
    }

    /// Enables handler `id` of `kind` with the given global configuration.
    pub fn enable(mut self, kind: HandlerKind, id: &str, config: Value) -> Self {
        self.handlers_mut(kind).insert(
            id.to_string(),
            HandlerSettings {
                enabled: true,
                config,
            },
        );
        self
    }

    /// True if handler `id` of `kind` is switched on.
    pub fn is_enabled(&self, kind: HandlerKind, id: &str) -> bool {
        self.handlers(kind).get(id).is_some_and(|s| s.enabled)
    }

    /// Global configuration of handler `id` of `kind` (null when unset).
    pub fn handler_config(&self, kind: HandlerKind, id: &str) -> Value {
        self.handlers(kind)
            .get(id)
            .map(|s| s.config.clone())
            .unwrap_or(Value::Null)
    }
}

/// Where rules come from and how their patterns are read.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessRulesConfig {
    /// JSON files, each holding an array of rules.
    pub repositories: Vec<PathBuf>,

    /// Pattern dialect applied to every rule.
    pub matching_strategy: MatchingStrategy,

    /// Reload rules when a repository file changes.
    pub watch: bool,
}

/// Enablement and global configuration of one handler.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct HandlerSettings {
    /// Handlers are off unless switched on.
    pub enabled: bool,

    /// Global configuration, deep-merged under each rule's own config.
    pub config: Value,
}

/// Error handler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorsConfig {
    /// Handlers tried, in order, for rules that configure none.
    pub fallback: Vec<String>,

    /// Error handler enablement and global configuration, by handler id.
    pub handlers: BTreeMap<String, HandlerSettings>,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        let mut handlers = BTreeMap::new();
        handlers.insert(
            "json".to_string(),
            HandlerSettings {
                enabled: true,
                config: Value::Null,
            },
        );
        Self {
            fallback: vec!["json".to_string()],
            handlers,
        }
    }
}

/// Defaults for stage caches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL used when a stage stores an entry with TTL zero.
    pub default_ttl_ms: u64,

    /// Entries per cache before expired entries are swept.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60_000,
            max_entries: 10_000,
        }
    }
}

/// Deadline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for one whole decision (authenticate, authorize, mutate).
    pub decision_ms: u64,

    /// Upper bound for one remote call made by a stage.
    pub upstream_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            decision_ms: 10_000,
            upstream_ms: 5_000,
        }
    }
}

/// Retry configuration for transient upstream failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay between two attempts in milliseconds.
    pub max_delay_ms: u64,

    /// Total time after which retrying stops, in milliseconds.
    pub give_up_after_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 50,
            max_delay_ms: 500,
            give_up_after_ms: 1_000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Filter directive used when `RUST_LOG` is unset (e.g. "info").
    pub log_level: String,

    /// Emit JSON lines instead of human readable output.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}
