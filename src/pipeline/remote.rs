//! Outbound calls made by stages.
//!
//! # Responsibilities
//! - Apply the upstream deadline to every call
//! - Map transport failures and statuses onto `DecisionError`
//! - Record call outcomes as metrics

use reqwest::{RequestBuilder, Response};
use std::time::Duration;

use crate::config::schema::EngineConfig;
use crate::observability::metrics;
use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::resilience::{retry, with_timeout, RetryPolicy};

/// Shared HTTP client with the engine's deadline and retry defaults.
#[derive(Debug, Clone)]
pub struct RemoteClient {
    http: reqwest::Client,
    timeout: Duration,
    retry: RetryPolicy,
}

impl RemoteClient {
    pub fn new(http: reqwest::Client, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            http,
            timeout,
            retry,
        }
    }

    /// Client using the timeouts and retry budget of `config`.
    pub fn from_config(config: &EngineConfig) -> DecisionResult<Self> {
        let timeout = Duration::from_millis(config.timeouts.upstream_ms);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| DecisionError::Internal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::new(
            http,
            timeout,
            RetryPolicy::from_config(&config.retries),
        ))
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Default retry budget; stages may override it per handler.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sends one request within the upstream deadline.
    pub async fn send(&self, service: &str, request: RequestBuilder) -> DecisionResult<Response> {
        let result = with_timeout(self.timeout, service, async {
            request
                .send()
                .await
                .map_err(|e| DecisionError::from_transport(service, &e))
        })
        .await;
        metrics::record_upstream_call(
            service,
            result.as_ref().ok().map(|r| r.status().as_u16()),
        );
        result
    }

    /// Sends the request built by `build` with retries under `policy`.
    ///
    /// A 5xx answer counts as a transient failure and is retried.
    pub async fn send_with_retry<F>(
        &self,
        service: &str,
        policy: &RetryPolicy,
        build: F,
    ) -> DecisionResult<Response>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let build = &build;
        retry(policy, || async move {
            let response = self.send(service, build(&self.http)).await?;
            if response.status().is_server_error() {
                return Err(DecisionError::UpstreamStatus {
                    service: service.to_string(),
                    status: response.status().as_u16(),
                });
            }
            Ok(response)
        })
        .await
    }
}

/// Decodes a JSON response body.
pub async fn read_json<T: serde::de::DeserializeOwned>(
    service: &str,
    response: Response,
) -> DecisionResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| DecisionError::upstream_internal(service, format!("invalid JSON body: {e}")))
}
