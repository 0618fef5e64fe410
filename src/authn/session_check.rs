//! Shared flow of authenticators that ask a session endpoint who the
//! caller is (`cookie_session`, `bearer_token`).
//!
//! # Responsibilities
//! - Build the check request from the incoming request
//! - Map the endpoint's answer onto the session or an error
//! - Turn redirects into terminal responses when asked to

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::remote::RemoteClient;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::pipeline::session::AuthenticationSession;
use crate::pipeline::template;

#[derive(Debug, Clone, Deserialize)]
pub struct SessionCheckConfig {
    pub check_session_url: Url,

    /// Keep the path of `check_session_url` instead of the request path.
    #[serde(default)]
    pub preserve_path: bool,

    /// Keep the query of `check_session_url` instead of the request query.
    #[serde(default = "default_true")]
    pub preserve_query: bool,

    /// Dot path of the subject in the endpoint's JSON answer.
    #[serde(default = "default_subject_from")]
    pub subject_from: String,

    /// Dot path of the extra claims; `@this` takes the whole answer.
    #[serde(default = "default_extra_from")]
    pub extra_from: String,

    #[serde(default = "default_forwarded_headers")]
    pub forward_http_headers: Vec<String>,

    #[serde(default)]
    pub additional_headers: BTreeMap<String, String>,

    /// Method used instead of the request's method.
    #[serde(default)]
    pub force_method: Option<String>,

    /// Answer 3xx responses of the endpoint straight to the client.
    #[serde(default)]
    pub forward_redirects: bool,
}

fn default_true() -> bool {
    true
}

fn default_subject_from() -> String {
    "subject".to_string()
}

fn default_extra_from() -> String {
    "extra".to_string()
}

fn default_forwarded_headers() -> Vec<String> {
    vec!["Authorization".to_string(), "Cookie".to_string()]
}

impl SessionCheckConfig {
    pub fn validate(&self, id: &str) -> DecisionResult<()> {
        if let Some(method) = &self.force_method {
            Method::from_bytes(method.as_bytes()).map_err(|_| {
                DecisionError::misconfigured(
                    HandlerKind::Authenticator,
                    id,
                    format!("force_method \"{method}\" is not an HTTP method"),
                )
            })?;
        }
        for name in self.forward_http_headers.iter().chain(self.additional_headers.keys()) {
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
                DecisionError::misconfigured(
                    HandlerKind::Authenticator,
                    id,
                    format!("\"{name}\" is not a valid header name"),
                )
            })?;
        }
        Ok(())
    }

    /// URL the check request is sent to.
    pub fn target_url(&self, request: &DecisionRequest) -> Url {
        let mut url = self.check_session_url.clone();
        if !self.preserve_path {
            url.set_path(request.url.path());
        }
        if !self.preserve_query {
            url.set_query(request.url.query());
        }
        url
    }

    fn method(&self, request: &DecisionRequest) -> Method {
        self.force_method
            .as_deref()
            .and_then(|m| Method::from_bytes(m.as_bytes()).ok())
            .unwrap_or_else(|| request.method.clone())
    }

    fn headers(&self, request: &DecisionRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for name in &self.forward_http_headers {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in request.headers.get_all(&name) {
                headers.append(name.clone(), value.clone());
            }
        }
        for (name, value) in &self.additional_headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        headers
    }
}

/// Asks the session endpoint about `request` and fills `session`.
pub async fn check_session(
    remote: &RemoteClient,
    service: &str,
    config: &SessionCheckConfig,
    request: &DecisionRequest,
    session: &mut AuthenticationSession,
) -> DecisionResult<()> {
    let url = config.target_url(request);
    let builder = remote
        .http()
        .request(config.method(request), url)
        .headers(config.headers(request));
    let response = remote.send(service, builder).await?;
    let status = response.status();

    if status.is_redirection() && config.forward_redirects {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        tracing::debug!(service, status = status.as_u16(), "Forwarding session endpoint redirect");
        return Err(DecisionError::ForceResponse(Box::new(ErrorResponse::redirect(
            status, location,
        ))));
    }

    if status != StatusCode::OK {
        return Err(DecisionError::unauthorized(format!(
            "session endpoint answered with status {}",
            status.as_u16()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| DecisionError::upstream_internal(service, format!("invalid JSON body: {e}")))?;
    apply_answer(config, &body, session);
    Ok(())
}

fn apply_answer(config: &SessionCheckConfig, body: &Value, session: &mut AuthenticationSession) {
    session.subject = match lookup(body, &config.subject_from) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    session.extra = match lookup(body, &config.extra_from) {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
}

fn lookup<'a>(body: &'a Value, path: &str) -> Option<&'a Value> {
    if path == "@this" {
        Some(body)
    } else {
        template::lookup(body, path)
    }
}
