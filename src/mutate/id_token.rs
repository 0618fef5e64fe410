//! Mutator that replaces `Authorization` with a freshly signed ID token.
//!
//! # Responsibilities
//! - Render extra claims from a JSON template against the session
//! - Add `iss`, `sub`, `iat`, `nbf`, `exp` and `jti`
//! - Sign through the `Signer` collaborator
//! - Reuse a token while at least half of its lifetime remains

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cache::{cache_key, TtlCache};
use crate::config::duration;
use crate::credentials::{unix_now, Signer};
use crate::mutate::Mutator;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::Rule;

#[derive(Debug, Deserialize)]
struct IdTokenConfig {
    issuer_url: String,
    jwks_url: Url,
    /// JSON object template of additional claims.
    #[serde(default)]
    claims: Option<String>,
    #[serde(default = "default_ttl", with = "duration")]
    ttl: Duration,
}

fn default_ttl() -> Duration {
    Duration::from_secs(15 * 60)
}

pub struct IdTokenMutator {
    signer: Option<Arc<dyn Signer>>,
    cache: TtlCache,
}

impl std::fmt::Debug for IdTokenMutator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdTokenMutator")
            .field("signer", &self.signer.is_some())
            .field("cache", &self.cache.name())
            .finish()
    }
}

impl IdTokenMutator {
    pub fn new(signer: Option<Arc<dyn Signer>>, cache: TtlCache) -> Self {
        Self { signer, cache }
    }

    fn config(&self, config: &Value) -> DecisionResult<IdTokenConfig> {
        handler_config::decode(HandlerKind::Mutator, self.id(), config)
    }

    fn signer(&self) -> DecisionResult<&Arc<dyn Signer>> {
        self.signer.as_ref().ok_or_else(|| {
            DecisionError::misconfigured(HandlerKind::Mutator, self.id(), "no token signer is available")
        })
    }

    fn claims(
        &self,
        config: &IdTokenConfig,
        session: &AuthenticationSession,
    ) -> DecisionResult<Map<String, Value>> {
        let mut claims = match &config.claims {
            Some(template) => match serde_json::from_str::<Value>(&session.render(template)) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    return Err(DecisionError::misconfigured(
                        HandlerKind::Mutator,
                        self.id(),
                        "claims did not render to a JSON object",
                    ))
                }
            },
            None => Map::new(),
        };

        let now = unix_now();
        claims.insert("iss".into(), Value::from(config.issuer_url.clone()));
        claims.insert("sub".into(), Value::from(session.subject.clone()));
        claims.insert("iat".into(), Value::from(now));
        claims.insert("nbf".into(), Value::from(now));
        claims.insert("exp".into(), Value::from(now + config.ttl.as_secs() as i64));
        claims.insert("jti".into(), Value::from(uuid::Uuid::new_v4().to_string()));
        Ok(claims)
    }
}

#[async_trait]
impl Mutator for IdTokenMutator {
    fn id(&self) -> &str {
        "id_token"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.signer()?;
        let config = self.config(config)?;
        if config.ttl.is_zero() {
            return Err(DecisionError::misconfigured(
                HandlerKind::Mutator,
                self.id(),
                "ttl must be greater than zero",
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
        let signer = self.signer()?;
        let parsed = self.config(config)?;

        let template = parsed.claims.as_deref().map(|t| session.render(t)).unwrap_or_default();
        let key = cache_key(&[
            config.to_string().as_str(),
            session.subject.as_str(),
            template.as_str(),
        ]);

        let token = match self.cache.get::<String>(&key) {
            Some(token) => token,
            None => {
                let claims = self.claims(&parsed, session)?;
                let token = signer.sign(&parsed.jwks_url, &claims).await?;
                self.cache.set_with_ttl(&key, &token, parsed.ttl / 2);
                token
            }
        };

        session.set_header("authorization", format!("Bearer {token}"));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSigner(AtomicUsize);

    #[async_trait]
    impl Signer for CountingSigner {
        async fn sign(&self, _jwks_url: &Url, claims: &Map<String, Value>) -> DecisionResult<String> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!(
                "token-for-{}-{}",
                claims["sub"].as_str().unwrap_or_default(),
                claims.get("tenant").and_then(Value::as_str).unwrap_or("none")
            ))
        }
    }

    fn config() -> Value {
        json!({
            "issuer_url": "https://gatekeeper.example.com",
            "jwks_url": "file:///etc/keys/jwks.json",
            "claims": "{\"tenant\": {{ extra.tenant | json }}}"
        })
    }

    #[tokio::test]
    async fn test_signs_and_caches_tokens() {
        let signer = Arc::new(CountingSigner::default());
        let mutator = IdTokenMutator::new(
            Some(signer.clone()),
            TtlCache::new("id_token", Duration::from_secs(60), 100),
        );
        let request = DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap());

        for _ in 0..3 {
            let mut session = AuthenticationSession::default();
            session.subject = "alice".into();
            session.extra.insert("tenant".into(), json!("acme"));
            mutator
                .mutate(&request, &mut session, &config(), &Rule::default())
                .await
                .unwrap();
            assert_eq!(
                session.header.get("authorization"),
                Some("Bearer token-for-alice-acme")
            );
        }
        assert_eq!(signer.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_claims_include_registered_names() {
        let mutator = IdTokenMutator::new(None, TtlCache::new("id_token", Duration::from_secs(1), 1));
        let parsed: IdTokenConfig = serde_json::from_value(config()).unwrap();
        let mut session = AuthenticationSession::default();
        session.subject = "bob".into();
        let claims = mutator.claims(&parsed, &session).unwrap();
        assert_eq!(claims["sub"], "bob");
        assert_eq!(claims["tenant"], Value::Null);
        assert_eq!(
            claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(),
            900
        );
    }

    #[test]
    fn test_validate_requires_signer() {
        let mutator = IdTokenMutator::new(None, TtlCache::new("id_token", Duration::from_secs(1), 1));
        assert!(mutator.validate(&config()).is_err());
    }
}
