use async_trait::async_trait;
use serde_json::Value;

use crate::authz::Authorizer;
use crate::pipeline::error::DecisionResult;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

/// Allows every request.
#[derive(Debug, Default)]
pub struct AllowAuthorizer;

#[async_trait]
impl Authorizer for AllowAuthorizer {
    fn id(&self) -> &str {
        "allow"
    }

    fn validate(&self, _config: &Value) -> DecisionResult<()> {
        Ok(())
    }

    async fn authorize(
        &self,
        _request: &DecisionRequest,
        _session: &mut AuthenticationSession,
        _config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        Ok(())
    }
}
