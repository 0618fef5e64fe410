//! Authenticator for signed JSON Web Tokens.
//!
//! Signature and time-based claims are checked by the [`Verifier`]
//! collaborator; issuer, audience and scopes are checked here.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

use crate::authn::scope::{split_scopes, ScopeStrategy};
use crate::authn::token::TokenFrom;
use crate::authn::Authenticator;
use crate::credentials::{ValidationContext, Verifier};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct JwtConfig {
    jwks_urls: Vec<Url>,
    #[serde(default)]
    required_scope: Vec<String>,
    #[serde(default)]
    scope_strategy: ScopeStrategy,
    #[serde(default)]
    target_audience: Vec<String>,
    #[serde(default)]
    trusted_issuers: Vec<String>,
    #[serde(default)]
    allowed_algorithms: Vec<String>,
    #[serde(default)]
    token_from: TokenFrom,
}

pub struct JwtAuthenticator {
    verifier: Option<Arc<dyn Verifier>>,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("verifier", &self.verifier.is_some())
            .finish()
    }
}

impl JwtAuthenticator {
    pub fn new(verifier: Option<Arc<dyn Verifier>>) -> Self {
        Self { verifier }
    }

    fn config(&self, config: &Value) -> DecisionResult<JwtConfig> {
        handler_config::decode(HandlerKind::Authenticator, self.id(), config)
    }

    fn verifier(&self) -> DecisionResult<&Arc<dyn Verifier>> {
        self.verifier.as_ref().ok_or_else(|| {
            DecisionError::misconfigured(
                HandlerKind::Authenticator,
                self.id(),
                "no token verifier is available",
            )
        })
    }
}

/// Strings of a claim that may be a single string or an array.
fn claim_strings(claims: &Map<String, Value>, name: &str) -> Vec<String> {
    match claims.get(name) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Granted scopes from `scp`, `scope` or `scopes`.
fn granted_scopes(claims: &Map<String, Value>) -> Vec<String> {
    for name in ["scp", "scope", "scopes"] {
        match claims.get(name) {
            Some(Value::String(s)) => return split_scopes(s),
            Some(Value::Array(_)) => return claim_strings(claims, name),
            _ => continue,
        }
    }
    Vec::new()
}

fn check_claims(config: &JwtConfig, claims: &Map<String, Value>) -> DecisionResult<()> {
    if !config.trusted_issuers.is_empty() {
        let issuer = claims.get("iss").and_then(Value::as_str).unwrap_or_default();
        if !config.trusted_issuers.iter().any(|t| t == issuer) {
            return Err(DecisionError::unauthorized(format!(
                "token issuer \"{issuer}\" is not trusted"
            )));
        }
    }

    let audience = claim_strings(claims, "aud");
    if let Some(missing) = config.target_audience.iter().find(|a| !audience.contains(*a)) {
        return Err(DecisionError::unauthorized(format!(
            "token audience does not contain \"{missing}\""
        )));
    }

    let granted = granted_scopes(claims);
    if let Some(scope) = config.scope_strategy.missing(&granted, &config.required_scope) {
        return Err(DecisionError::forbidden(format!(
            "scope \"{scope}\" was not granted"
        )));
    }
    Ok(())
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn id(&self) -> &str {
        "jwt"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.verifier()?;
        let config = self.config(config)?;
        config.token_from.validate(self.id())?;
        if config.jwks_urls.is_empty() {
            return Err(DecisionError::misconfigured(
                HandlerKind::Authenticator,
                self.id(),
                "jwks_urls must not be empty",
            ));
        }
        if config.scope_strategy.is_none() && !config.required_scope.is_empty() {
            return Err(DecisionError::misconfigured(
                HandlerKind::Authenticator,
                self.id(),
                "required_scope is set but scope_strategy is \"none\"",
            ));
        }
        Ok(())
    }

    async fn authenticate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let config = self.config(config)?;
        let Some(token) = config.token_from.extract(request) else {
            return Err(DecisionError::NotResponsible);
        };
        if token.split('.').count() != 3 {
            return Err(DecisionError::NotResponsible);
        }

        let context = ValidationContext {
            algorithms: config.allowed_algorithms.clone(),
            key_urls: config.jwks_urls.clone(),
        };
        let claims = self.verifier()?.verify(&token, &context).await?;
        check_claims(&config, &claims)?;

        session.subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        session.extra = claims;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    struct StaticVerifier(Map<String, Value>);

    #[async_trait]
    impl Verifier for StaticVerifier {
        async fn verify(
            &self,
            token: &str,
            context: &ValidationContext,
        ) -> DecisionResult<Map<String, Value>> {
            assert_eq!(context.key_urls.len(), 1);
            if token == "a.b.c" {
                Ok(self.0.clone())
            } else {
                Err(DecisionError::unauthorized("bad signature"))
            }
        }
    }

    fn claims() -> Map<String, Value> {
        json!({
            "sub": "alice",
            "iss": "https://issuer",
            "aud": ["api"],
            "scp": ["read", "write"]
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn authenticator() -> JwtAuthenticator {
        JwtAuthenticator::new(Some(Arc::new(StaticVerifier(claims()))))
    }

    fn request(token: &str) -> DecisionRequest {
        DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap())
            .with_header("Authorization", &format!("Bearer {token}"))
    }

    fn config() -> Value {
        json!({
            "jwks_urls": ["http://keys/.well-known/jwks.json"],
            "trusted_issuers": ["https://issuer"],
            "target_audience": ["api"],
            "scope_strategy": "exact",
            "required_scope": ["read"]
        })
    }

    #[tokio::test]
    async fn test_valid_token_sets_subject_and_claims() {
        let mut session = AuthenticationSession::default();
        authenticator()
            .authenticate(&request("a.b.c"), &mut session, &config(), &Rule::default())
            .await
            .unwrap();
        assert_eq!(session.subject, "alice");
        assert_eq!(session.extra["iss"], "https://issuer");
    }

    #[tokio::test]
    async fn test_opaque_token_is_not_our_business() {
        let mut session = AuthenticationSession::default();
        let err = authenticator()
            .authenticate(&request("opaque"), &mut session, &config(), &Rule::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::NotResponsible));
    }

    #[tokio::test]
    async fn test_missing_scope_is_forbidden() {
        let mut cfg = config();
        cfg["required_scope"] = json!(["admin"]);
        let mut session = AuthenticationSession::default();
        let err = authenticator()
            .authenticate(&request("a.b.c"), &mut session, &cfg, &Rule::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DecisionError::Forbidden { .. }));
    }

    #[test]
    fn test_validate_requires_verifier_and_strategy() {
        assert!(authenticator().validate(&config()).is_ok());
        assert!(JwtAuthenticator::new(None).validate(&config()).is_err());

        let mut cfg = config();
        cfg["scope_strategy"] = json!("none");
        assert!(authenticator().validate(&cfg).is_err());
    }

    #[test]
    fn test_scope_claim_variants() {
        let mut c = Map::new();
        c.insert("scope".into(), json!("a b"));
        assert_eq!(granted_scopes(&c), vec!["a".to_string(), "b".to_string()]);
    }
}
