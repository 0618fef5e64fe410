//! Authenticators: establish who is making the request.
//!
//! # Data Flow
//! ```text
//! RequestHandler::authenticate
//!     → for each rule authenticator, in declared order:
//!         NotResponsible → try the next one
//!         Ok             → session is final, stop
//!         other error    → stop, surface the error
//!     → nobody responsible → Unauthorized
//! ```
//!
//! # Design Decisions
//! - Authenticators mutate the session in place; they never see each
//!   other's configuration
//! - Credential lookups against remote services are memoized per stage
//!   in a `TtlCache`
//! - Missing credentials mean `NotResponsible`, wrong credentials mean
//!   `Unauthorized`

use async_trait::async_trait;
use serde_json::Value;

use crate::pipeline::error::DecisionResult;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

pub mod anonymous;
pub mod bearer_token;
pub mod cookie_session;
pub mod jwt;
pub mod noop;
pub mod oauth2_client_credentials;
pub mod oauth2_introspection;
pub mod scope;
pub mod session_check;
pub mod token;
pub mod unauthorized;

pub use anonymous::AnonymousAuthenticator;
pub use bearer_token::BearerTokenAuthenticator;
pub use cookie_session::CookieSessionAuthenticator;
pub use jwt::JwtAuthenticator;
pub use noop::NoopAuthenticator;
pub use oauth2_client_credentials::ClientCredentialsAuthenticator;
pub use oauth2_introspection::IntrospectionAuthenticator;
pub use scope::ScopeStrategy;
pub use token::TokenFrom;
pub use unauthorized::UnauthorizedAuthenticator;

/// One way of identifying the caller.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Name referenced by rules.
    fn id(&self) -> &str;

    /// Checks a (merged) handler configuration.
    fn validate(&self, config: &Value) -> DecisionResult<()>;

    /// Fills `session` from the request's credentials.
    ///
    /// Returns `DecisionError::NotResponsible` when the request carries
    /// no credential this authenticator understands.
    async fn authenticate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> DecisionResult<()>;
}
