//! Authenticator that rejects every request.

use async_trait::async_trait;
use serde_json::Value;

use crate::authn::Authenticator;
use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Default)]
pub struct UnauthorizedAuthenticator;

#[async_trait]
impl Authenticator for UnauthorizedAuthenticator {
    fn id(&self) -> &str {
        "unauthorized"
    }

    fn validate(&self, _config: &Value) -> DecisionResult<()> {
        Ok(())
    }

    async fn authenticate(
        &self,
        _request: &DecisionRequest,
        _session: &mut AuthenticationSession,
        _config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        Err(DecisionError::unauthorized(
            "the rule rejects all requests",
        ))
    }
}
