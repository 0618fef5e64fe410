//! Mutator that lets a remote service enrich the session.
//!
//! The session is POSTed as JSON; the service answers with the session it
//! wants forwarded. `extra` and `header` are taken over, the subject must
//! stay the same.

use async_trait::async_trait;
use axum::http::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::cache::{cache_key, CacheSettings, TtlCache};
use crate::mutate::Mutator;
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::remote::{read_json, RemoteClient};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::session::{AuthenticationSession, Header};
use crate::resilience::retries::RetryOverrides;
use crate::rule::Rule;

const SERVICE: &str = "hydrator";

#[derive(Debug, Deserialize)]
struct HydratorConfig {
    api: ApiConfig,
    #[serde(default)]
    cache: CacheSettings,
}

#[derive(Debug, Deserialize)]
struct ApiConfig {
    url: Url,
    #[serde(default)]
    auth: Option<ApiAuth>,
    #[serde(default)]
    retry: RetryOverrides,
}

#[derive(Debug, Deserialize)]
struct ApiAuth {
    basic: BasicAuth,
}

#[derive(Debug, Deserialize)]
struct BasicAuth {
    username: String,
    password: String,
}

/// The part of a hydrated session that is taken over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Hydrated {
    #[serde(default)]
    subject: String,
    #[serde(default)]
    extra: Map<String, Value>,
    #[serde(default)]
    header: Header,
}

#[derive(Debug)]
pub struct HydratorMutator {
    remote: RemoteClient,
    cache: TtlCache,
}

impl HydratorMutator {
    pub fn new(remote: RemoteClient, cache: TtlCache) -> Self {
        Self { remote, cache }
    }

    fn config(&self, config: &Value) -> DecisionResult<HydratorConfig> {
        handler_config::decode(HandlerKind::Mutator, self.id(), config)
    }

    async fn hydrate(&self, config: &HydratorConfig, body: &[u8]) -> DecisionResult<Hydrated> {
        let policy = self.remote.retry_policy().with_overrides(&config.api.retry);
        let response = self
            .remote
            .send_with_retry(SERVICE, &policy, |http| {
                let builder = http
                    .post(config.api.url.clone())
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.to_vec());
                match &config.api.auth {
                    Some(auth) => builder.basic_auth(&auth.basic.username, Some(&auth.basic.password)),
                    None => builder,
                }
            })
            .await?;

        match response.status().as_u16() {
            200 => read_json(SERVICE, response).await,
            401 => Err(DecisionError::unauthorized("hydrator rejected the session")),
            403 => Err(DecisionError::forbidden("hydrator rejected the session")),
            status => Err(DecisionError::UpstreamStatus {
                service: SERVICE.to_string(),
                status,
            }),
        }
    }
}

#[async_trait]
impl Mutator for HydratorMutator {
    fn id(&self) -> &str {
        SERVICE
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.config(config).map(|_| ())
    }

    async fn mutate(
        &self,
        _request: &DecisionRequest,
        session: &mut AuthenticationSession,
        config: &Value,
        _rule: &Rule,
    ) -> DecisionResult<()> {
        let parsed = self.config(config)?;
        let body = serde_json::to_vec(&*session)
            .map_err(|e| DecisionError::Internal(format!("cannot encode session: {e}")))?;
        let key = cache_key(&[config.to_string().as_bytes(), body.as_slice()]);

        let cached = if parsed.cache.enabled {
            self.cache.get::<Hydrated>(&key)
        } else {
            None
        };
        let hydrated = match cached {
            Some(hit) => hit,
            None => {
                let fresh = self.hydrate(&parsed, &body).await?;
                if fresh.subject != session.subject {
                    return Err(DecisionError::upstream_internal(
                        SERVICE,
                        "hydrator changed the session subject",
                    ));
                }
                if parsed.cache.enabled {
                    self.cache
                        .set_with_ttl(&key, &fresh, parsed.cache.ttl_or_default());
                }
                fresh
            }
        };

        session.extra = hydrated.extra;
        session.header = hydrated.header;
        Ok(())
    }
}
