//! Mutator that passes the request's own headers through.

use async_trait::async_trait;
use serde_json::Value;

use crate::mutate::Mutator;
use crate::pipeline::error::DecisionResult;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::{AuthenticationSession, Header};
use crate::rule::Rule;

#[derive(Debug, Default)]
pub struct NoopMutator;

#[async_trait]
impl Mutator for NoopMutator {
    fn id(&self) -> &str {
        "noop"
    }

    fn validate(&self, _config: &Value) -> DecisionResult<()> {
        Ok(())
    }

    async fn mutate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        _config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let incoming = Header::from_header_map(&request.headers);
        for (name, values) in incoming.iter() {
            session.header.remove(name);
            for value in values {
                session.header.add(name, value.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use url::Url;

    #[tokio::test]
    async fn test_request_headers_are_preserved() {
        let request = DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap())
            .with_header("Authorization", "bearer token")
            .with_header("Accept", "text/html");
        let mut session = AuthenticationSession::default();
        session.set_header("x-from-authorizer", "1");

        NoopMutator
            .mutate(&request, &mut session, &Value::Null, &Rule::default())
            .await
            .unwrap();

        assert_eq!(session.header.get("Authorization"), Some("bearer token"));
        assert_eq!(session.header.get("accept"), Some("text/html"));
        assert_eq!(session.header.get("x-from-authorizer"), Some("1"));
    }
}
