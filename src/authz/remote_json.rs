//! Authorizer that posts a templated JSON document to a remote policy
//! endpoint.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::authz::{decision_from_status, forward_headers, Authorizer};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::RemoteClient;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::resilience::retries::RetryOverrides;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct RemoteJsonConfig {
    remote: Url,
    /// JSON template, e.g. `{"subject": {{ subject | json }}}`.
    payload: String,
    #[serde(default)]
    forward_response_headers_to_upstream: Vec<String>,
    #[serde(default)]
    retry: RetryOverrides,
}

#[derive(Debug)]
pub struct RemoteJsonAuthorizer {
    remote: RemoteClient,
}

impl RemoteJsonAuthorizer {
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    fn config(&self, config: &Value) -> DecisionResult<RemoteJsonConfig> {
        handler_config::decode(HandlerKind::Authorizer, self.id(), config)
    }
}

#[async_trait]
impl Authorizer for RemoteJsonAuthorizer {
    fn id(&self) -> &str {
        "remote_json"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let config = self.config(config)?;
        if config.payload.trim().is_empty() {
            return Err(DecisionError::misconfigured(
                HandlerKind::Authorizer,
                self.id(),
                "payload must not be empty",
            ));
        }
        Ok(())
    }

    async fn authorize(
        &self,
        _request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;
        let payload = session.render(&config.payload);
        if serde_json::from_str::<Value>(&payload).is_err() {
            return Err(DecisionError::misconfigured(
                HandlerKind::Authorizer,
                self.id(),
                "payload did not render to valid JSON",
            ));
        }

        let policy = self.remote.retry_policy().with_overrides(&config.retry);
        let response = self
            .remote
            .send_with_retry(self.id(), &policy, |http| {
                http.post(config.remote.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(payload.clone())
            })
            .await?;

        decision_from_status(self.id(), response.status().as_u16())?;
        forward_headers(
            response.headers(),
            &config.forward_response_headers_to_upstream,
            session,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EngineConfig;
    use serde_json::json;

    fn authorizer() -> RemoteJsonAuthorizer {
        RemoteJsonAuthorizer::new(RemoteClient::from_config(&EngineConfig::default()).unwrap())
    }

    #[test]
    fn test_payload_is_required() {
        let a = authorizer();
        assert!(a
            .validate(&json!({"remote": "http://pdp/check", "payload": ""}))
            .is_err());
        assert!(a
            .validate(&json!({"remote": "http://pdp/check", "payload": "{}"}))
            .is_ok());
        assert!(a.validate(&json!({"payload": "{}"})).is_err());
    }
}
