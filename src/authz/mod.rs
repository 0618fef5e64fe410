//! Authorizers: decide whether the identified caller may proceed.
//!
//! # Data Flow
//! ```text
//! RequestHandler::authorize
//!     → the rule's single authorizer
//!         allow / deny                  → local decision
//!         remote / remote_json / keto   → policy decision point over HTTP
//!     → Ok continues to mutators, any error aborts the pipeline
//! ```
//!
//! # Design Decisions
//! - Exactly one authorizer per rule; there is no fallthrough
//! - Remote denials (403) are `Forbidden`; other statuses are upstream faults
//! - Only transient upstream failures are retried

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

pub mod allow;
pub mod deny;
pub mod keto;
pub mod remote;
pub mod remote_json;

pub use allow::AllowAuthorizer;
pub use deny::DenyAuthorizer;
pub use keto::KetoAuthorizer;
pub use remote::RemoteAuthorizer;
pub use remote_json::RemoteJsonAuthorizer;

/// Policy decision for one request.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Name referenced by rules.
    fn id(&self) -> &str;

    /// Checks a (merged) handler configuration.
    fn validate(&self, config: &Value) -> DecisionResult<()>;

    /// `Ok` allows the request. The session may gain upstream headers.
    async fn authorize(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> DecisionResult<()>;
}

/// Maps the status of a policy decision point.
pub(crate) fn decision_from_status(service: &str, status: u16) -> DecisionResult<()> {
    match status {
        200 => Ok(()),
        403 => Err(DecisionError::forbidden(format!("{service} denied the request"))),
        other => Err(DecisionError::UpstreamStatus {
            service: service.to_string(),
            status: other,
        }),
    }
}

/// Copies the named response headers into the session.
pub(crate) fn forward_headers(
    response: &HeaderMap,
    names: &[String],
    session: &mut AuthenticationSession,
) {
    for name in names {
        let mut values = response.get_all(name.as_str()).iter().filter_map(|v| v.to_str().ok());
        if let Some(first) = values.next() {
            session.header.set(name, first);
            for value in values {
                session.header.add(name, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_mapping() {
        assert!(decision_from_status("pdp", 200).is_ok());
        assert!(matches!(
            decision_from_status("pdp", 403),
            Err(DecisionError::Forbidden { .. })
        ));
        assert!(matches!(
            decision_from_status("pdp", 404),
            Err(DecisionError::UpstreamStatus { status: 404, .. })
        ));
    }

    #[test]
    fn test_forward_listed_headers_only() {
        let mut response = HeaderMap::new();
        response.insert("x-user-id", HeaderValue::from_static("42"));
        response.insert("x-internal", HeaderValue::from_static("secret"));

        let mut session = AuthenticationSession::default();
        forward_headers(&response, &["X-User-Id".to_string()], &mut session);
        assert_eq!(session.header.get("x-user-id"), Some("42"));
        assert!(!session.header.contains("x-internal"));
    }
}
