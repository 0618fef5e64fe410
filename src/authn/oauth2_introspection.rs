//! OAuth 2.0 token introspection (RFC 7662) authenticator.
//!
//! # Responsibilities
//! - Read the access token from the configured location
//! - Ask the introspection endpoint about it, optionally authenticated
//!   with a client credentials token (`pre_authorization`)
//! - Check activity, token type, issuer, audience and scopes
//! - Memoize introspection answers until the token expires

use async_trait::async_trait;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use crate::authn::scope::{split_scopes, ScopeStrategy};
use crate::authn::token::TokenFrom;
use crate::authn::Authenticator;
use crate::cache::{cache_key, CacheSettings, TtlCache};
use crate::credentials::unix_now;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::{read_json, RemoteClient};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::resilience::retries::RetryOverrides;
use crate::rule::Rule;

const SERVICE: &str = "oauth2_introspection";

#[derive(Debug, Deserialize)]
struct IntrospectionConfig {
    introspection_url: Url,
    #[serde(default)]
    scope_strategy: ScopeStrategy,
    #[serde(default)]
    required_scope: Vec<String>,
    #[serde(default)]
    target_audience: Vec<String>,
    #[serde(default)]
    trusted_issuers: Vec<String>,
    #[serde(default)]
    pre_authorization: Option<PreAuthorization>,
    #[serde(default)]
    token_from: TokenFrom,
    #[serde(default)]
    introspection_request_headers: BTreeMap<String, String>,
    #[serde(default)]
    retry: RetryOverrides,
    #[serde(default)]
    cache: CacheSettings,
}

/// Client credentials used to authenticate against the introspection
/// endpoint.
#[derive(Debug, Clone, Deserialize)]
struct PreAuthorization {
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    client_id: String,
    client_secret: String,
    token_url: Url,
    #[serde(default)]
    scope: Vec<String>,
    #[serde(default)]
    audience: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// Answer of the introspection endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default, deserialize_with = "string_or_seq")]
    pub aud: Vec<String>,
    #[serde(default)]
    pub iss: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub token_use: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub ext: Map<String, Value>,
}

fn string_or_seq<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
pub struct IntrospectionAuthenticator {
    remote: RemoteClient,
    cache: TtlCache,
}

impl IntrospectionAuthenticator {
    pub fn new(remote: RemoteClient, cache: TtlCache) -> Self {
        Self { remote, cache }
    }

    fn config(&self, config: &Value) -> DecisionResult<IntrospectionConfig> {
        handler_config::decode(HandlerKind::Authenticator, self.id(), config)
    }

    async fn introspect(
        &self,
        config: &IntrospectionConfig,
        token: &str,
    ) -> DecisionResult<Introspection> {
        let mut form = vec![("token", token.to_string())];
        if config.scope_strategy.is_none() && !config.required_scope.is_empty() {
            form.push(("scope", config.required_scope.join(" ")));
        }
        let body = form_body(&form);

        let bearer = match &config.pre_authorization {
            Some(pre) if pre.enabled => Some(self.pre_authorize(config, pre).await?),
            _ => None,
        };

        let policy = self.remote.retry_policy().with_overrides(&config.retry);
        let response = self
            .remote
            .send_with_retry(SERVICE, &policy, |http| {
                let mut builder = http
                    .post(config.introspection_url.clone())
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.clone());
                for (name, value) in &config.introspection_request_headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                if let Some(bearer) = &bearer {
                    builder = builder.header(AUTHORIZATION, format!("Bearer {bearer}"));
                }
                builder
            })
            .await?;

        if !response.status().is_success() {
            return Err(DecisionError::UpstreamStatus {
                service: SERVICE.to_string(),
                status: response.status().as_u16(),
            });
        }
        read_json(SERVICE, response).await
    }

    /// Client credentials token for the introspection call, cached until
    /// shortly before it expires.
    async fn pre_authorize(
        &self,
        config: &IntrospectionConfig,
        pre: &PreAuthorization,
    ) -> DecisionResult<String> {
        let key = cache_key(&[
            "pre_authorization",
            pre.token_url.as_str(),
            pre.client_id.as_str(),
            pre.client_secret.as_str(),
            pre.scope.join(" ").as_str(),
        ]);
        if let Some(token) = self.cache.get::<String>(&key) {
            return Ok(token);
        }

        let mut form = vec![("grant_type", "client_credentials".to_string())];
        if !pre.scope.is_empty() {
            form.push(("scope", pre.scope.join(" ")));
        }
        if let Some(audience) = &pre.audience {
            form.push(("audience", audience.clone()));
        }
        let body = form_body(&form);

        let policy = self.remote.retry_policy().with_overrides(&config.retry);
        let response = self
            .remote
            .send_with_retry(SERVICE, &policy, |http| {
                http.post(pre.token_url.clone())
                    .basic_auth(&pre.client_id, Some(&pre.client_secret))
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.clone())
            })
            .await?;
        if !response.status().is_success() {
            return Err(DecisionError::UpstreamStatus {
                service: SERVICE.to_string(),
                status: response.status().as_u16(),
            });
        }
        let token: TokenResponse = read_json(SERVICE, response).await?;
        if let Some(expires_in) = token.expires_in {
            let ttl = Duration::from_secs(expires_in.saturating_sub(expires_in / 10));
            if !ttl.is_zero() {
                self.cache.set_with_ttl(&key, &token.access_token, ttl);
            }
        }
        Ok(token.access_token)
    }

    fn store(&self, key: &str, config: &IntrospectionConfig, introspection: &Introspection) {
        let mut ttl = config.cache.ttl_or_default();
        if ttl.is_zero() {
            ttl = self.cache.default_ttl();
        }
        if let Some(exp) = introspection.exp {
            let remaining = exp - unix_now();
            if remaining <= 0 {
                return;
            }
            ttl = ttl.min(Duration::from_secs(remaining as u64));
        }
        self.cache.set_with_ttl(key, introspection, ttl);
    }
}

/// Checks an introspection answer against the configuration.
fn check(config: &IntrospectionConfig, i: &Introspection) -> DecisionResult<()> {
    if !i.active {
        return Err(DecisionError::unauthorized("access token is not active"));
    }
    if !i.token_use.is_empty() && i.token_use != "access_token" {
        return Err(DecisionError::unauthorized(format!(
            "token is a \"{}\" but expected an access token",
            i.token_use
        )));
    }
    if let Some(exp) = i.exp {
        if exp > 0 && exp <= unix_now() {
            return Err(DecisionError::unauthorized("access token expired"));
        }
    }
    if !config.trusted_issuers.is_empty() && !config.trusted_issuers.contains(&i.iss) {
        return Err(DecisionError::forbidden(format!(
            "token issuer \"{}\" is not trusted",
            i.iss
        )));
    }
    if let Some(aud) = config.target_audience.iter().find(|a| !i.aud.contains(*a)) {
        return Err(DecisionError::forbidden(format!(
            "token audience does not contain \"{aud}\""
        )));
    }
    if !config.scope_strategy.is_none() {
        let granted = split_scopes(&i.scope);
        if let Some(scope) = config.scope_strategy.missing(&granted, &config.required_scope) {
            return Err(DecisionError::forbidden(format!(
                "scope \"{scope}\" was not granted"
            )));
        }
    }
    Ok(())
}

/// Cache key of an introspection answer: the token plus everything the
/// answer was requested and checked with.
fn introspection_key(token: &str, config: &IntrospectionConfig) -> String {
    cache_key(&[
        token,
        config.introspection_url.as_str(),
        config.scope_strategy.as_str(),
        config.required_scope.join(" ").as_str(),
    ])
}

fn form_body(pairs: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        serializer.append_pair(name, value);
    }
    serializer.finish()
}

#[async_trait]
impl Authenticator for IntrospectionAuthenticator {
    fn id(&self) -> &str {
        SERVICE
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.config(config)?.token_from.validate(self.id())
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

        let key = introspection_key(&token, &config);
        let cached = if config.cache.enabled {
            self.cache.get::<Introspection>(&key)
        } else {
            None
        };

        let introspection = match cached {
            Some(hit) => hit,
            None => {
                let fresh = self.introspect(&config, &token).await?;
                if config.cache.enabled && fresh.active {
                    self.store(&key, &config, &fresh);
                }
                fresh
            }
        };

        check(&config, &introspection)?;
        tracing::debug!(client_id = %introspection.client_id, "Token introspected");

        session.subject = introspection.sub;
        session.extra = introspection.ext;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(extra: Value) -> IntrospectionConfig {
        let mut base = json!({"introspection_url": "http://hydra:4445/oauth2/introspect"});
        if let (Some(base), Value::Object(extra)) = (base.as_object_mut(), extra) {
            base.extend(extra);
        }
        serde_json::from_value(base).unwrap()
    }

    fn active() -> Introspection {
        Introspection {
            active: true,
            scope: "read write".into(),
            sub: "alice".into(),
            aud: vec!["api".into()],
            iss: "https://issuer".into(),
            exp: Some(unix_now() + 60),
            ..Introspection::default()
        }
    }

    #[test]
    fn test_audience_accepts_string_or_array() {
        let one: Introspection = serde_json::from_value(json!({"active": true, "aud": "a"})).unwrap();
        let many: Introspection =
            serde_json::from_value(json!({"active": true, "aud": ["a", "b"]})).unwrap();
        assert_eq!(one.aud, vec!["a".to_string()]);
        assert_eq!(many.aud.len(), 2);
    }

    #[test]
    fn test_inactive_is_unauthorized() {
        let i = Introspection::default();
        assert!(matches!(
            check(&config(json!({})), &i),
            Err(DecisionError::Unauthorized { .. })
        ));
    }

    #[test]
    fn test_scope_issuer_audience_checks() {
        let cfg = config(json!({
            "scope_strategy": "exact",
            "required_scope": ["read"],
            "trusted_issuers": ["https://issuer"],
            "target_audience": ["api"]
        }));
        assert!(check(&cfg, &active()).is_ok());

        let cfg = config(json!({"scope_strategy": "exact", "required_scope": ["admin"]}));
        assert!(matches!(check(&cfg, &active()), Err(DecisionError::Forbidden { .. })));

        let cfg = config(json!({"trusted_issuers": ["https://other"]}));
        assert!(matches!(check(&cfg, &active()), Err(DecisionError::Forbidden { .. })));

        let cfg = config(json!({"target_audience": ["billing"]}));
        assert!(matches!(check(&cfg, &active()), Err(DecisionError::Forbidden { .. })));
    }

    #[test]
    fn test_refresh_token_is_rejected() {
        let mut i = active();
        i.token_use = "refresh_token".into();
        assert!(check(&config(json!({})), &i).is_err());
    }

    #[test]
    fn test_cache_key_covers_scope_strategy() {
        let exact = config(json!({"scope_strategy": "exact", "required_scope": ["read"]}));
        let wildcard = config(json!({"scope_strategy": "wildcard", "required_scope": ["read"]}));
        assert_eq!(introspection_key("t", &exact), introspection_key("t", &exact));
        assert_ne!(introspection_key("t", &exact), introspection_key("t", &wildcard));
        assert_ne!(introspection_key("t", &exact), introspection_key("u", &exact));
    }

    #[test]
    fn test_form_body_is_encoded() {
        assert_eq!(
            form_body(&[("token", "a b&c".to_string()), ("scope", "x y".to_string())]),
            "token=a+b%26c&scope=x+y"
        );
    }
}
