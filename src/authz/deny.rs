use async_trait::async_trait;
use serde_json::Value;

use crate::authz::Authorizer;
use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

/// Denies every request with `Forbidden`.
#[derive(Debug, Default)]
pub struct DenyAuthorizer;

#[async_trait]
impl Authorizer for DenyAuthorizer {
    fn id(&self) -> &str {
        "deny"
    }

    fn validate(&self, _config: &Value) -> DecisionResult<()> {
        Ok(())
    }

    async fn authorize(
        &self,
        _request: &DecisionRequest,
        _session: &mut AuthenticationSession,
        _config: &Value,
        rule: &Rule,
    ) -> DecisionResult<()> {
        Err(DecisionError::forbidden(format!(
            "rule \"{}\" denies all requests",
            rule.id
        )))
    }
}
