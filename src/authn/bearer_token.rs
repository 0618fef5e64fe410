//! Authenticator that validates opaque bearer tokens against a session
//! endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::authn::session_check::{check_session, SessionCheckConfig};
use crate::authn::token::TokenFrom;
use crate::authn::Authenticator;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::RemoteClient;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct BearerTokenConfig {
    #[serde(flatten)]
    check: SessionCheckConfig,

    #[serde(default)]
    token_from: TokenFrom,
}

#[derive(Debug)]
pub struct BearerTokenAuthenticator {
    remote: RemoteClient,
}

impl BearerTokenAuthenticator {
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    fn config(&self, config: &Value) -> DecisionResult<BearerTokenConfig> {
        handler_config::decode(HandlerKind::Authenticator, self.id(), config)
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    fn id(&self) -> &str {
        "bearer_token"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let config = self.config(config)?;
        config.token_from.validate(self.id())?;
        config.check.validate(self.id())
    }

    async fn authenticate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;
        if config.token_from.extract(request).is_none() {
            return Err(DecisionError::NotResponsible);
        }
        check_session(&self.remote, self.id(), &config.check, request, session).await
    }
}
