//! Mutator that adds templated cookies to the outbound `Cookie` header.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::mutate::Mutator;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct CookieConfig {
    cookies: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct CookieMutator;

impl CookieMutator {
    fn config(&self, config: &Value) -> DecisionResult<CookieConfig> {
        handler_config::decode(HandlerKind::Mutator, self.id(), config)
    }
}

#[async_trait]
impl Mutator for CookieMutator {
    fn id(&self) -> &str {
        "cookie"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let config = self.config(config)?;
        if let Some(name) = config
            .cookies
            .keys()
            .find(|n| n.is_empty() || n.contains(['=', ';', ' ']))
        {
            return Err(DecisionError::misconfigured(
                HandlerKind::Mutator,
                self.id(),
                format!("\"{name}\" is not a valid cookie name"),
            ));
        }
        Ok(())
    }

    async fn mutate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;

        let mut pairs: Vec<String> = request
            .cookies()
            .into_iter()
            .filter(|(name, _)| !config.cookies.contains_key(name))
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        for (name, template) in &config.cookies {
            pairs.push(format!("{name}={}", session.render(template)));
        }

        session.set_header("cookie", pairs.join("; "));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;
    use url::Url;

    #[tokio::test]
    async fn test_cookies_are_merged() {
        let request = DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap())
            .with_header("Cookie", "theme=dark; user=old");
        let mut session = AuthenticationSession::default();
        session.subject = "alice".into();

        CookieMutator
            .mutate(
                &request,
                &mut session,
                &json!({"cookies": {"user": "{{ subject }}"}}),
                &Rule::default(),
            )
            .await
            .unwrap();

        assert_eq!(session.header.get("cookie"), Some("theme=dark; user=alice"));
    }
}
