//! Authenticator that lets every request through without an identity.

use async_trait::async_trait;
use serde_json::Value;

use crate::authn::Authenticator;
use crate::pipeline::error::DecisionResult;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Default)]
pub struct NoopAuthenticator;

#[async_trait]
impl Authenticator for NoopAuthenticator {
    fn id(&self) -> &str {
        "noop"
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
        Ok(())
    }
}
