//! Mutator that sets templated headers, e.g. `X-User: {{ subject }}`.

use async_trait::async_trait;
use axum::http::HeaderName;
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
struct HeaderConfig {
    headers: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct HeaderMutator;

impl HeaderMutator {
    fn config(&self, config: &Value) -> DecisionResult<HeaderConfig> {
        handler_config::decode(HandlerKind::Mutator, self.id(), config)
    }
}

#[async_trait]
impl Mutator for HeaderMutator {
    fn id(&self) -> &str {
        "header"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let config = self.config(config)?;
        if let Some(name) = config
            .headers
            .keys()
            .find(|name| HeaderName::from_bytes(name.as_bytes()).is_err())
        {
            return Err(DecisionError::misconfigured(
                HandlerKind::Mutator,
                self.id(),
                format!("\"{name}\" is not a valid header name"),
            ));
        }
        Ok(())
    }

    async fn mutate(
        &self,
        _request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;
        for (name, template) in &config.headers {
            let value = session.render(template);
            session.set_header(name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::session::MatchContext;
    use axum::http::Method;
    use serde_json::json;
    use url::Url;

    #[tokio::test]
    async fn test_headers_render_session_fields() {
        let mut session = AuthenticationSession::new(MatchContext {
            regexp_capture_groups: vec!["42".into()],
            ..MatchContext::default()
        });
        session.subject = "alice".into();
        session.extra.insert("email".into(), json!("alice@example.com"));

        let config = json!({"headers": {
            "X-User": "{{ subject }}",
            "X-Email": "{{ extra.email }}",
            "X-Id": "{{ match_context.regexp_capture_groups.0 }}"
        }});
        let request = DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap());
        HeaderMutator
            .mutate(&request, &mut session, &config, &Rule::default())
            .await
            .unwrap();

        assert_eq!(session.header.get("x-user"), Some("alice"));
        assert_eq!(session.header.get("x-email"), Some("alice@example.com"));
        assert_eq!(session.header.get("x-id"), Some("42"));
    }

    #[test]
    fn test_invalid_header_name_is_rejected() {
        assert!(HeaderMutator
            .validate(&json!({"headers": {"bad header": "x"}}))
            .is_err());
        assert!(HeaderMutator.validate(&Value::Null).is_err());
    }
}
