//! Authorizer that forwards the request body to a remote policy endpoint.
//!
//! The endpoint answers 200 to allow and 403 to deny.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
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
struct RemoteConfig {
    remote: Url,
    /// Header templates rendered against the session.
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    forward_response_headers_to_upstream: Vec<String>,
    #[serde(default)]
    retry: RetryOverrides,
}

#[derive(Debug)]
pub struct RemoteAuthorizer {
    remote: RemoteClient,
}

impl RemoteAuthorizer {
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    fn config(&self, config: &Value) -> DecisionResult<RemoteConfig> {
        handler_config::decode(HandlerKind::Authorizer, self.id(), config)
    }
}

#[async_trait]
impl Authorizer for RemoteAuthorizer {
    fn id(&self) -> &str {
        "remote"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let config = self.config(config)?;
        for name in config.headers.keys() {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                DecisionError::misconfigured(
                    HandlerKind::Authorizer,
                    self.id(),
                    format!("\"{name}\" is not a valid header name"),
                )
            })?;
        }
        Ok(())
    }

    async fn authorize(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;

        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(content_type) = request.headers.get(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, content_type.clone());
        }
        for (name, template) in &config.headers {
            let rendered = session.render(template);
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&rendered),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => {
                    return Err(DecisionError::misconfigured(
                        HandlerKind::Authorizer,
                        self.id(),
                        format!("header \"{name}\" rendered to an invalid value"),
                    ))
                }
            }
        }

        let policy = self.remote.retry_policy().with_overrides(&config.retry);
        let body = request.body.clone();
        let response = self
            .remote
            .send_with_retry(self.id(), &policy, |http| {
                http.post(config.remote.clone())
                    .headers(headers.clone())
                    .body(body.clone())
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
