//! Error handler asking the client for basic credentials.

use axum::http::{header, HeaderValue, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error_handler::{when, ErrorHandler};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::rule::Rule;

fn default_realm() -> String {
    "Please authenticate.".to_string()
}

#[derive(Debug, Deserialize)]
struct WwwAuthenticateConfig {
    #[serde(default = "default_realm")]
    realm: String,
}

#[derive(Debug, Default)]
pub struct WwwAuthenticateErrorHandler;

impl WwwAuthenticateErrorHandler {
    fn config(&self, config: &Value) -> DecisionResult<WwwAuthenticateConfig> {
        handler_config::decode(HandlerKind::ErrorHandler, self.id(), config)
    }
}

impl ErrorHandler for WwwAuthenticateErrorHandler {
    fn id(&self) -> &str {
        "www_authenticate"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        let parsed = self.config(config)?;
        if parsed.realm.contains('"') || HeaderValue::from_str(&parsed.realm).is_err() {
            return Err(DecisionError::misconfigured(
                HandlerKind::ErrorHandler,
                self.id(),
                "realm must be printable and must not contain quotes",
            ));
        }
        when::decode(self.id(), config)?;
        Ok(())
    }

    fn handle(
        &self,
        _request: &DecisionRequest,
        config: &Value,
        _rule: Option<&Rule>,
        _error: &DecisionError,
    ) -> DecisionResult<ErrorResponse> {
        let config = self.config(config)?;
        let mut response = ErrorResponse::new(StatusCode::UNAUTHORIZED);
        response.set_header(
            header::WWW_AUTHENTICATE.as_str(),
            &format!("Basic realm=\"{}\"", config.realm),
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde_json::json;
    use url::Url;

    #[test]
    fn test_challenge_header() {
        let request = DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap());
        let response = WwwAuthenticateErrorHandler
            .handle(&request, &Value::Null, None, &DecisionError::forbidden("x"))
            .unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.header("www-authenticate"),
            Some("Basic realm=\"Please authenticate.\"")
        );

        let response = WwwAuthenticateErrorHandler
            .handle(&request, &json!({"realm": "admin"}), None, &DecisionError::forbidden("x"))
            .unwrap();
        assert_eq!(response.header("www-authenticate"), Some("Basic realm=\"admin\""));
    }

    #[test]
    fn test_quoted_realm_is_rejected() {
        assert!(WwwAuthenticateErrorHandler
            .validate(&json!({"realm": "a\"b"}))
            .is_err());
    }
}
