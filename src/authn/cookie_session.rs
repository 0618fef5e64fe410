//! Authenticator that validates session cookies against a session endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::authn::session_check::{check_session, SessionCheckConfig};
use crate::authn::Authenticator;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::RemoteClient;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct CookieSessionConfig {
    #[serde(flatten)]
    check: SessionCheckConfig,

    /// Cookie names this authenticator is responsible for; empty means any.
    #[serde(default)]
    only: Vec<String>,
}

#[derive(Debug)]
pub struct CookieSessionAuthenticator {
    remote: RemoteClient,
}

impl CookieSessionAuthenticator {
    pub fn new(remote: RemoteClient) -> Self {
        Self { remote }
    }

    fn config(&self, config: &Value) -> DecisionResult<CookieSessionConfig> {
        handler_config::decode(HandlerKind::Authenticator, self.id(), config)
    }
}

fn is_responsible(request: &DecisionRequest, only: &[String]) -> bool {
    let cookies = request.cookies();
    if only.is_empty() {
        return !cookies.is_empty();
    }
    cookies.iter().any(|(name, _)| only.contains(name))
}

#[async_trait]
impl Authenticator for CookieSessionAuthenticator {
    fn id(&self) -> &str {
        "cookie_session"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.config(config)?.check.validate(self.id())
    }

    async fn authenticate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;
        if !is_responsible(request, &config.only) {
            return Err(DecisionError::NotResponsible);
        }
        check_session(&self.remote, self.id(), &config.check, request, session).await
    }
}
