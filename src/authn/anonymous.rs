//! Authenticator for requests without credentials.
//!
//! Requests carrying an `Authorization` header are left to other
//! authenticators; everything else becomes the configured guest subject.

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::Value;

use crate::authn::Authenticator;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct AnonymousConfig {
    #[serde(default = "default_subject")]
    subject: String,
}

fn default_subject() -> String {
    "anonymous".to_string()
}

#[derive(Debug, Default)]
pub struct AnonymousAuthenticator;

impl AnonymousAuthenticator {
    fn config(&self, config: &Value) -> DecisionResult<AnonymousConfig> {
        handler_config::decode(HandlerKind::Authenticator, self.id(), config)
    }
}

#[async_trait]
impl Authenticator for AnonymousAuthenticator {
    fn id(&self) -> &str {
        "anonymous"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.config(config).map(|_| ())
    }

    async fn authenticate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        if request.headers.contains_key(AUTHORIZATION) {
            return Err(DecisionError::NotResponsible);
        }
        session.subject = self.config(config)?.subject;
        Ok(())
    }
}
