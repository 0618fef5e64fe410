//! Access-control decision engine.
//!
//! Matches requests against operator-supplied access rules and runs the
//! Authenticate → Authorize → Mutate pipeline of the matched rule. Errors
//! are rendered by the rule's error handlers. HTTP, gRPC and Envoy front
//! ends call into [`DecisionEngine`] and translate its results.

pub mod authn;
pub mod authz;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error_handler;
pub mod health;
pub mod matcher;
pub mod mutate;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod rule;

pub use config::schema::EngineConfig;
pub use matcher::{MatchingEngine, MatchingEngines, MatchingStrategy};
pub use pipeline::{
    AuthenticationSession, Decision, DecisionEngine, DecisionError, DecisionRequest,
    DecisionResult, ErrorResponse,
};
pub use rule::{Rule, RuleRepository};
