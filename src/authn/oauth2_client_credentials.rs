//! Authenticator that treats HTTP Basic credentials as OAuth 2.0 client
//! credentials and checks them by requesting a token.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

use crate::authn::Authenticator;
use crate::cache::{cache_key, CacheSettings, TtlCache};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::{read_json, RemoteClient};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::AuthenticationSession;
use crate::resilience::retries::RetryOverrides;
use crate::rule::Rule;

const SERVICE: &str = "oauth2_client_credentials";

#[derive(Debug, Deserialize)]
struct ClientCredentialsConfig {
    token_url: Url,
    #[serde(default)]
    required_scope: Vec<String>,
    #[serde(default)]
    retry: RetryOverrides,
    #[serde(default)]
    cache: CacheSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuedToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
pub struct ClientCredentialsAuthenticator {
    remote: RemoteClient,
    cache: TtlCache,
}

impl ClientCredentialsAuthenticator {
    pub fn new(remote: RemoteClient, cache: TtlCache) -> Self {
        Self { remote, cache }
    }

    fn config(&self, config: &Value) -> DecisionResult<ClientCredentialsConfig> {
        handler_config::decode(HandlerKind::Authenticator, self.id(), config)
    }

    async fn request_token(
        &self,
        config: &ClientCredentialsConfig,
        client_id: &str,
        client_secret: &str,
    ) -> DecisionResult<IssuedToken> {
        let body = {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            serializer.append_pair("grant_type", "client_credentials");
            if !config.required_scope.is_empty() {
                serializer.append_pair("scope", &config.required_scope.join(" "));
            }
            serializer.finish()
        };

        let policy = self.remote.retry_policy().with_overrides(&config.retry);
        let response = self
            .remote
            .send_with_retry(SERVICE, &policy, |http| {
                http.post(config.token_url.clone())
                    .basic_auth(client_id, Some(client_secret))
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.clone())
            })
            .await?;

        let status = response.status();
        if status.is_client_error() {
            return Err(DecisionError::unauthorized(format!(
                "token endpoint rejected the client credentials with status {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(DecisionError::UpstreamStatus {
                service: SERVICE.to_string(),
                status: status.as_u16(),
            });
        }
        read_json(SERVICE, response).await
    }
}

/// How long an issued token may be cached. `None` when the token is already
/// expired; a zero TTL would otherwise fall back to the cache default.
fn cache_ttl(configured: Duration, expires_in: Option<u64>) -> Option<Duration> {
    let Some(expires_in) = expires_in else {
        return Some(configured);
    };
    let lifetime = Duration::from_secs(expires_in);
    if lifetime.is_zero() {
        return None;
    }
    Some(if configured.is_zero() {
        lifetime
    } else {
        configured.min(lifetime)
    })
}

#[async_trait]
impl Authenticator for ClientCredentialsAuthenticator {
    fn id(&self) -> &str {
        SERVICE
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
        let config = self.config(config)?;
        let Some((client_id, client_secret)) = request.basic_auth() else {
            return Err(DecisionError::NotResponsible);
        };

        let key = cache_key(&[
            config.token_url.as_str(),
            client_id.as_str(),
            client_secret.as_str(),
            config.required_scope.join(" ").as_str(),
        ]);
        let cached = if config.cache.enabled {
            self.cache.get::<IssuedToken>(&key)
        } else {
            None
        };

        if cached.is_none() {
            let token = self.request_token(&config, &client_id, &client_secret).await?;
            if config.cache.enabled {
                if let Some(ttl) = cache_ttl(config.cache.ttl_or_default(), token.expires_in) {
                    self.cache.set_with_ttl(&key, &token, ttl);
                }
            }
        }

        session.subject = client_id;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expired_token_is_not_cached() {
        assert_eq!(cache_ttl(Duration::from_secs(60), Some(0)), None);
        assert_eq!(cache_ttl(Duration::ZERO, Some(0)), None);
    }

    #[test]
    fn test_cache_ttl_bounded_by_token_lifetime() {
        assert_eq!(
            cache_ttl(Duration::from_secs(60), Some(10)),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            cache_ttl(Duration::from_secs(60), Some(3600)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(cache_ttl(Duration::ZERO, Some(30)), Some(Duration::from_secs(30)));
        assert_eq!(
            cache_ttl(Duration::from_secs(60), None),
            Some(Duration::from_secs(60))
        );
    }
}
