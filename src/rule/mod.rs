//! Access rules: model, validation, storage and loading.
//!
//! # Data Flow
//! ```text
//! rule files (JSON arrays)
//!     → fetcher.rs (read & decode, watch for changes)
//!     → repository.rs set() → validator.rs (per rule, first failure wins)
//!     → snapshot { rules, invalid_rules, strategy } swapped atomically
//!
//! Per request:
//!     repository.rs match_rule(method, url, protocol)
//!     → MatchingEngine selected by the snapshot strategy
//!     → exactly one rule (valid or invalid) or an error
//! ```
//!
//! # Design Decisions
//! - Invalid rules are kept next to valid ones so shadowing is detected
//! - Readers never block writers; each `set` publishes a whole new snapshot
//! - Handler configuration stays opaque JSON until a stage decodes it

pub mod fetcher;
pub mod model;
pub mod repository;
pub mod validator;

pub use fetcher::RuleFetcher;
pub use model::{GrpcMatch, Handler, HttpMatch, Match, Protocol, Rule, Upstream};
pub use repository::{RuleMatch, RuleRepository};
pub use validator::RuleValidator;
