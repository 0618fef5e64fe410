//! Mutators: rewrite the session before the request goes upstream.
//!
//! # Data Flow
//! ```text
//! RequestHandler::mutate
//!     → every rule mutator, in declared order
//!         noop      → copy request headers
//!         header    → templated headers
//!         cookie    → templated cookies
//!         id_token  → signed ID token in Authorization
//!         hydrator  → extra/header from a remote service
//!     → first error aborts the chain
//! ```
//!
//! # Design Decisions
//! - Mutators have no notion of responsibility; each one always runs
//! - Remote mutators memoize their output per session and config

use async_trait::async_trait;
use serde_json::Value;

use crate::pipeline::error::DecisionResult;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

pub mod cookie;
pub mod header;
pub mod hydrator;
pub mod id_token;
pub mod noop;

pub use cookie::CookieMutator;
pub use header::HeaderMutator;
pub use hydrator::HydratorMutator;
pub use id_token::IdTokenMutator;
pub use noop::NoopMutator;

/// One rewrite of the outbound request.
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Name referenced by rules.
    fn id(&self) -> &str;

    /// Checks a (merged) handler configuration.
    fn validate(&self, config: &Value) -> DecisionResult<()>;

    async fn mutate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> DecisionResult<()>;
}
