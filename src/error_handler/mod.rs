//! Error handlers: turn a decision error into the client response.
//!
//! # Data Flow
//! ```text
//! RequestHandler::handle_error(error)
//!     → ForceResponse? return it untouched
//!     → candidates = rule.errors, or errors.fallback from config
//!     → first candidate whose `when` matches renders the response
//!     → none matched: default json handler
//! ```
//!
//! # Design Decisions
//! - Handlers return an [`ErrorResponse`] instead of writing to a sink,
//!   so adapters own the wire format
//! - `when` lives inside each handler's config and is checked by the
//!   orchestrator, not by the handler itself

use serde_json::Value;

use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::rule::Rule;

pub mod json;
pub mod redirect;
pub mod when;
pub mod www_authenticate;

pub use json::JsonErrorHandler;
pub use redirect::RedirectErrorHandler;
pub use when::WhenCondition;
pub use www_authenticate::WwwAuthenticateErrorHandler;

/// Renders decision errors for clients.
pub trait ErrorHandler: Send + Sync {
    /// Name referenced by rules.
    fn id(&self) -> &str;

    /// Checks a (merged) handler configuration, including `when`.
    fn validate(&self, config: &Value) -> DecisionResult<()>;

    /// Conditions under which this handler applies.
    fn when(&self, config: &Value) -> DecisionResult<Vec<WhenCondition>> {
        when::decode(self.id(), config)
    }

    /// Builds the response for `error`. `rule` is absent when matching failed.
    fn handle(
        &self,
        request: &DecisionRequest,
        config: &Value,
        rule: Option<&Rule>,
        error: &DecisionError,
    ) -> DecisionResult<ErrorResponse>;
}
