//! Error handler answering with a redirect, typically to a login page.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error_handler::{when, ErrorHandler};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::rule::Rule;

const ALLOWED_CODES: [u16; 5] = [301, 302, 303, 307, 308];

fn default_code() -> u16 {
    302
}

#[derive(Debug, Deserialize)]
struct RedirectConfig {
    to: Url,
    #[serde(default = "default_code")]
    code: u16,
    /// Query parameter receiving the original request URL.
    #[serde(default)]
    return_to_query_param: Option<String>,
}

#[derive(Debug, Default)]
pub struct RedirectErrorHandler;

impl RedirectErrorHandler {
    fn config(&self, config: &Value) -> DecisionResult<RedirectConfig> {
        handler_config::decode(HandlerKind::ErrorHandler, self.id(), config)
    }
}

impl ErrorHandler for RedirectErrorHandler {
    fn id(&self) -> &str {
        "redirect"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let parsed = self.config(config)?;
        if !ALLOWED_CODES.contains(&parsed.code) {
            return Err(DecisionError::misconfigured(
                HandlerKind::ErrorHandler,
                self.id(),
                format!("code must be one of {ALLOWED_CODES:?} but got {}", parsed.code),
            ));
        }
        when::decode(self.id(), config)?;
        Ok(())
    }

    fn handle(
        &self,
        request: &DecisionRequest,
        config: &Value,
        _rule: Option<&Rule>,
        _error: &DecisionError,
    ) -> DecisionResult<ErrorResponse> {
        let config = self.config(config)?;
        let mut location = config.to;
        if let Some(param) = config.return_to_query_param.as_deref().filter(|p| !p.is_empty()) {
            location
                .query_pairs_mut()
                .append_pair(param, request.url.as_str());
        }

        let status = StatusCode::from_u16(config.code).unwrap_or(StatusCode::FOUND);
        Ok(ErrorResponse::redirect(status, location.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;

    fn request() -> DecisionRequest {
        DecisionRequest::new(Method::GET, Url::parse("https://app.example.com/dashboard?tab=1").unwrap())
    }

    #[test]
    fn test_redirect_with_return_to() {
        let config = json!({
            "to": "https://login.example.com/?flow=web",
            "return_to_query_param": "return_to"
        });
        let response = RedirectErrorHandler
            .handle(&request(), &config, None, &DecisionError::unauthorized("x"))
            .unwrap();
        assert_eq!(response.status, StatusCode::FOUND);

        let location = Url::parse(response.header("location").unwrap()).unwrap();
        let pairs: Vec<(String, String)> = location.query_pairs().into_owned().collect();
        assert_eq!(pairs[0], ("flow".to_string(), "web".to_string()));
        assert_eq!(
            pairs[1],
            ("return_to".to_string(), "https://app.example.com/dashboard?tab=1".to_string())
        );
    }

    #[test]
    fn test_custom_code() {
        let config = json!({"to": "https://login.example.com/", "code": 301});
        let response = RedirectErrorHandler
            .handle(&request(), &config, None, &DecisionError::unauthorized("x"))
            .unwrap();
        assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.header("location"), Some("https://login.example.com/"));
    }

    #[test]
    fn test_validate() {
        assert!(RedirectErrorHandler.validate(&json!({"to": "https://x/"})).is_ok());
        assert!(RedirectErrorHandler.validate(&json!({"to": "https://x/", "code": 200})).is_err());
        assert!(RedirectErrorHandler.validate(&json!({"to": "not a url"})).is_err());
        assert!(RedirectErrorHandler.validate(&Value::Null).is_err());
    }
}
