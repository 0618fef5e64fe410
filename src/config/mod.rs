//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors at once)
//!     → EngineConfig (validated, immutable)
//!     → shared via Arc with the handler registry and stages
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a full reload
//! - All fields have defaults to allow minimal configs
//! - Handler configs stay opaque JSON; each stage decodes its own
//! - Durations inside handler configs are humantime strings (duration.rs)

pub mod duration;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AccessRulesConfig, CacheConfig, EngineConfig, ErrorsConfig, HandlerSettings,
    ObservabilityConfig, RetryConfig, TimeoutConfig,
};
pub use validation::{validate_config, ValidationError};
