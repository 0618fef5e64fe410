//! Default error handler: a JSON error document.
//!
//! ```json
//! {"error": {"code": 401, "status": "Unauthorized", "message": "..."}}
//! ```
//!
//! With `verbose` the internal error text is added as `reason`.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error_handler::{when, ErrorHandler};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::handler_config;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::rule::Rule;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonConfig {
    verbose: bool,
}

#[derive(Debug, Default)]
pub struct JsonErrorHandler;

impl JsonErrorHandler {
    fn config(&self, config: &Value) -> DecisionResult<JsonConfig> {
        handler_config::decode(HandlerKind::ErrorHandler, self.id(), config)
    }
}

impl ErrorHandler for JsonErrorHandler {
    fn id(&self) -> &str {
        "json"
    }

    fn validate(&self, config: &Value) -> DecisionResult<()> {
        self.config(config)?;
        when::decode(self.id(), config)?;
        Ok(())
    }

    fn handle(
        &self,
        _request: &DecisionRequest,
        config: &Value,
        _rule: Option<&Rule>,
        error: &DecisionError,
    ) -> DecisionResult<ErrorResponse> {
        let config = self.config(config)?;
        let class = error.class();

        let mut body = json!({
            "code": class.status_code(),
            "status": class.status_text(),
            "message": class.message(),
        });
        if config.verbose {
            body["reason"] = Value::from(error.to_string());
        }

        let status = StatusCode::from_u16(class.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Ok(ErrorResponse::json(status, &json!({ "error": body })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use url::Url;

    fn request() -> DecisionRequest {
        DecisionRequest::new(Method::GET, Url::parse("http://a/").unwrap())
    }

    #[test]
    fn test_terse_body_hides_reason() {
        let response = JsonErrorHandler
            .handle(&request(), &Value::Null, None, &DecisionError::unauthorized("token expired"))
            .unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body["error"]["code"], 401);
        assert_eq!(body["error"]["status"], "Unauthorized");
        assert!(body["error"].get("reason").is_none());
    }

    #[test]
    fn test_verbose_body_includes_reason() {
        let response = JsonErrorHandler
            .handle(
                &request(),
                &json!({"verbose": true}),
                None,
                &DecisionError::forbidden("missing scope"),
            )
            .unwrap();
        assert_eq!(response.status, StatusCode::FORBIDDEN);
        let body: Value = serde_json::from_slice(&response.body).unwrap();
        assert!(body["error"]["reason"].as_str().unwrap().contains("missing scope"));
    }

    #[test]
    fn test_not_responsible_renders_as_unauthorized() {
        let response = JsonErrorHandler
            .handle(&request(), &Value::Null, None, &DecisionError::NotResponsible)
            .unwrap();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_validate_checks_when() {
        assert!(JsonErrorHandler.validate(&json!({"when": [{"error": ["forbidden"]}]})).is_ok());
        assert!(JsonErrorHandler.validate(&json!({"when": [{"error": ["nope"]}]})).is_err());
        assert!(JsonErrorHandler.validate(&json!({"verbose": "yes"})).is_err());
    }
}
