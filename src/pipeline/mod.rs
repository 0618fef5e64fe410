//! Decision pipeline.
//!
//! # Data Flow
//! ```text
//! Adapter request → DecisionRequest
//!     → engine.rs       match_rule (repository) → RuleMatch
//!     → handler.rs      authenticate → authorize → mutate
//!         stages resolved through registry.rs, config merged by
//!         handler_config.rs, remote calls through remote.rs
//!     → AuthenticationSession (session.rs) for the upstream request
//!     → or DecisionError (error.rs) rendered into an ErrorResponse
//! ```
//!
//! # Design Decisions
//! - The core never writes to a socket; adapters translate sessions and
//!   error responses to their own wire format
//! - Every error carries an `ErrorClass` for status mapping
//! - Per-request state is owned by the deciding task and never shared

pub mod engine;
pub mod error;
pub mod handler;
pub mod handler_config;
pub mod registry;
pub mod remote;
pub mod request;
pub mod response;
pub mod session;
pub mod template;

pub use engine::{Decision, DecisionEngine};
pub use error::{DecisionError, DecisionResult, ErrorClass, HandlerKind};
pub use handler::RequestHandler;
pub use registry::{HandlerRegistry, StageDependencies};
pub use remote::RemoteClient;
pub use request::DecisionRequest;
pub use response::ErrorResponse;
pub use session::{AuthenticationSession, Header, MatchContext};
