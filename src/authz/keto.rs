//! Authorizer backed by the ORY Keto access control policy engine.
//!
//! Action and resource are templates over the rule's capture groups
//! (`$1`, `$2`, ...), resolved with the dialect the rule was matched with.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::authz::Authorizer;
use crate::matcher::MatchingEngines;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::{read_json, RemoteClient};
use crate::pipeline::request::{match_candidate, DecisionRequest};
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

const FLAVORS: [&str; 3] = ["regex", "exact", "glob"];

#[derive(Debug, Deserialize)]
struct KetoConfig {
    base_url: Url,
    required_action: String,
    required_resource: String,
    /// Subject template; defaults to the session subject.
    #[serde(default)]
    subject: Option<String>,
    #[serde(default = "default_flavor")]
    flavor: String,
}

fn default_flavor() -> String {
    "regex".to_string()
}

#[derive(Debug, Serialize)]
struct AccessRequest<'a> {
    action: &'a str,
    resource: &'a str,
    subject: &'a str,
}

#[derive(Debug, Deserialize)]
struct AccessAnswer {
    allowed: bool,
}

#[derive(Debug)]
pub struct KetoAuthorizer {
    remote: RemoteClient,
    engines: Arc<MatchingEngines>,
}

impl KetoAuthorizer {
    pub fn new(remote: RemoteClient, engines: Arc<MatchingEngines>) -> Self {
        Self { remote, engines }
    }

    fn config(&self, config: &Value) -> DecisionResult<KetoConfig> {
        handler_config::decode(HandlerKind::Authorizer, self.id(), config)
    }

    fn endpoint(config: &KetoConfig) -> DecisionResult<Url> {
        let base = config.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/engines/acp/ory/{}/allowed", config.flavor))
            .map_err(|e| DecisionError::Internal(format!("invalid keto endpoint: {e}")))
    }
}

#[async_trait]
impl Authorizer for KetoAuthorizer {
    fn id(&self) -> &str {
        "keto_engine_acp_ory"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let config = self.config(config)?;
        if !FLAVORS.contains(&config.flavor.as_str()) {
            return Err(DecisionError::misconfigured(
                HandlerKind::Authorizer,
                self.id(),
                format!("flavor must be one of {FLAVORS:?} but got \"{}\"", config.flavor),
            ));
        }
        Ok(())
    }

    async fn authorize(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;
        let engine = self.engines.select(session.match_context.strategy);
        let candidate = match_candidate(&request.url);

        let action = rule.replace_all_string(engine, &candidate, &config.required_action)?;
        let resource = rule.replace_all_string(engine, &candidate, &config.required_resource)?;
        let subject = match &config.subject {
            Some(template) => session.render(template),
            None => session.subject.clone(),
        };

        let body = serde_json::to_vec(&AccessRequest {
            action: &action,
            resource: &resource,
            subject: &subject,
        })
        .map_err(|e| DecisionError::Internal(e.to_string()))?;
        let endpoint = Self::endpoint(&config)?;

        let policy = self.remote.retry_policy();
        let response = self
            .remote
            .send_with_retry(self.id(), &policy, |http| {
                http.post(endpoint.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
            .await?;

        let status = response.status().as_u16();
        if status != 200 && status != 403 {
            return Err(DecisionError::UpstreamStatus {
                service: self.id().to_string(),
                status,
            });
        }
        let answer: AccessAnswer = read_json(self.id(), response).await?;
        if !answer.allowed {
            tracing::debug!(rule = %rule.id, %action, %resource, "Policy engine denied access");
            return Err(DecisionError::forbidden(format!(
                "subject may not \"{action}\" on \"{resource}\""
            )));
        }
        Ok(())
    }
}
