//! Where bearer-style tokens are read from.

use serde::{Deserialize, Serialize};

use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::request::DecisionRequest;

/// Token location. Unset means `Authorization: Bearer <token>`.
///
/// At most one of the fields may be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenFrom {
    pub header: Option<String>,
    pub query_parameter: Option<String>,
    pub cookie: Option<String>,
}

impl TokenFrom {
    pub fn validate(&self, id: &str) -> DecisionResult<()> {
        let set = [&self.header, &self.query_parameter, &self.cookie]
            .iter()
            .filter(|f| f.is_some())
            .count();
        if set > 1 {
            return Err(DecisionError::misconfigured(
                HandlerKind::Authenticator,
                id,
                "token_from accepts only one of header, query_parameter or cookie",
            ));
        }
        Ok(())
    }

    /// Extracts the token, if present and non-empty.
    pub fn extract(&self, request: &DecisionRequest) -> Option<String> {
        let token = if let Some(name) = &self.header {
            let value = request.header(name)?;
            if name.eq_ignore_ascii_case("authorization") {
                strip_bearer(value).unwrap_or(value).to_string()
            } else {
                value.to_string()
            }
        } else if let Some(name) = &self.query_parameter {
            request.query_param(name)?
        } else if let Some(name) = &self.cookie {
            request.cookie(name)?
        } else {
            request.bearer_token()?.to_string()
        };

        let token = token.trim().to_string();
        (!token.is_empty()).then_some(token)
    }
}

fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use url::Url;

    fn request(url: &str) -> DecisionRequest {
        DecisionRequest::new(Method::GET, Url::parse(url).unwrap())
    }

    #[test]
    fn test_default_reads_bearer_header() {
        let req = request("http://a/").with_header("Authorization", "Bearer abc");
        assert_eq!(TokenFrom::default().extract(&req).as_deref(), Some("abc"));
        assert_eq!(TokenFrom::default().extract(&request("http://a/")), None);
    }

    #[test]
    fn test_custom_locations() {
        let req = request("http://a/?access_token=q")
            .with_header("X-Token", "h")
            .with_header("Cookie", "tok=c; other=1");

        let header = TokenFrom {
            header: Some("X-Token".into()),
            ..TokenFrom::default()
        };
        let query = TokenFrom {
            query_parameter: Some("access_token".into()),
            ..TokenFrom::default()
        };
        let cookie = TokenFrom {
            cookie: Some("tok".into()),
            ..TokenFrom::default()
        };
        assert_eq!(header.extract(&req).as_deref(), Some("h"));
        assert_eq!(query.extract(&req).as_deref(), Some("q"));
        assert_eq!(cookie.extract(&req).as_deref(), Some("c"));
    }

    #[test]
    fn test_only_one_location_allowed() {
        let both = TokenFrom {
            header: Some("a".into()),
            cookie: Some("b".into()),
            ..TokenFrom::default()
        };
        assert!(both.validate("jwt").is_err());
        assert!(TokenFrom::default().validate("jwt").is_ok());
    }
}
