//! Access rule definitions.
//!
//! This module defines the rule document decoded from rule sources. Rules
//! are immutable once stored; replacing them requires a new `set` on the
//! repository.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::matcher::{MatchError, MatchingEngine};
use crate::pipeline::request::match_candidate;

/// Wire protocol a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Grpc,
}

/// HTTP match: methods plus a delimited URL pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMatch {
    #[serde(default)]
    pub methods: Vec<String>,
    pub url: String,
}

/// gRPC match: authority and full method patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcMatch {
    pub authority: String,
    pub full_method: String,
}

/// What requests a rule covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Match {
    Http(HttpMatch),
    Grpc(GrpcMatch),
}

impl Match {
    /// The full delimited pattern matched against request candidates.
    pub fn pattern(&self) -> String {
        match self {
            Match::Http(m) => m.url.clone(),
            Match::Grpc(m) => format!("grpc://{}{}", m.authority, m.full_method),
        }
    }

    /// Methods accepted by this match. gRPC calls are always `POST`.
    pub fn methods(&self) -> Vec<String> {
        match self {
            Match::Http(m) => m.methods.clone(),
            Match::Grpc(_) => vec!["POST".to_string()],
        }
    }

    pub fn protocol(&self) -> Protocol {
        match self {
            Match::Http(_) => Protocol::Http,
            Match::Grpc(_) => Protocol::Grpc,
        }
    }

    /// True if the URL (HTTP) or authority (gRPC) pattern is empty.
    pub fn is_empty(&self) -> bool {
        match self {
            Match::Http(m) => m.url.is_empty(),
            Match::Grpc(m) => m.authority.is_empty(),
        }
    }
}

/// Reference to a named stage implementation and its per-rule config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Handler {
    #[serde(default)]
    pub handler: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub config: Value,
}

impl Handler {
    pub fn new(handler: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            config: Value::Null,
        }
    }

    pub fn with_config(handler: impl Into<String>, config: Value) -> Self {
        Self {
            handler: handler.into(),
            config,
        }
    }
}

/// Where an allowed request is forwarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub preserve_host: bool,
    #[serde(default)]
    pub strip_path: String,
}

/// One routable decision unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "match", default)]
    pub matcher: Option<Match>,
    #[serde(default)]
    pub authenticators: Vec<Handler>,
    #[serde(default)]
    pub authorizer: Handler,
    #[serde(default)]
    pub mutators: Vec<Handler>,
    #[serde(default)]
    pub errors: Vec<Handler>,
    #[serde(default)]
    pub upstream: Upstream,
}

impl Rule {
    /// Returns true if this rule covers `method` on `url` for `protocol`.
    pub fn is_matching(
        &self,
        engine: &dyn MatchingEngine,
        method: &str,
        url: &Url,
        protocol: Protocol,
    ) -> Result<bool, MatchError> {
        let Some(matcher) = &self.matcher else {
            return Ok(false);
        };
        if matcher.protocol() != protocol {
            return Ok(false);
        }
        if !matcher
            .methods()
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
        {
            return Ok(false);
        }
        engine.is_matching(&matcher.pattern(), &match_candidate(url))
    }

    /// Capture groups of this rule's pattern against `url`.
    pub fn capture_groups(
        &self,
        engine: &dyn MatchingEngine,
        url: &Url,
    ) -> Result<Vec<String>, MatchError> {
        match &self.matcher {
            Some(matcher) => engine.find_captures(&matcher.pattern(), &match_candidate(url)),
            None => Ok(Vec::new()),
        }
    }

    /// Substitutes this rule's capture groups of `input` into `replacement`.
    pub fn replace_all_string(
        &self,
        engine: &dyn MatchingEngine,
        input: &str,
        replacement: &str,
    ) -> Result<String, MatchError> {
        match &self.matcher {
            Some(matcher) => engine.replace_all_string(&matcher.pattern(), input, replacement),
            None => Ok(replacement.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{GlobEngine, RegexpEngine};
    use serde_json::json;

    fn http_rule(url: &str, methods: &[&str]) -> Rule {
        Rule {
            id: "r1".into(),
            matcher: Some(Match::Http(HttpMatch {
                methods: methods.iter().map(|m| m.to_string()).collect(),
                url: url.into(),
            })),
            ..Rule::default()
        }
    }

    #[test]
    fn test_decode_http_rule_document() {
        let rule: Rule = serde_json::from_value(json!({
            "id": "users",
            "version": "v1",
            "match": {"url": "http://example.com/users/<[0-9]+>", "methods": ["GET"]},
            "authenticators": [{"handler": "noop"}],
            "authorizer": {"handler": "allow"},
            "mutators": [{"handler": "header", "config": {"headers": {"X-User": "{{ subject }}"}}}],
            "upstream": {"url": "http://backend:8080", "preserve_host": true}
        }))
        .unwrap();

        assert_eq!(rule.id, "users");
        assert!(matches!(rule.matcher, Some(Match::Http(_))));
        assert_eq!(rule.authenticators, vec![Handler::new("noop")]);
        assert_eq!(rule.authorizer.handler, "allow");
        assert_eq!(rule.mutators[0].config["headers"]["X-User"], "{{ subject }}");
        assert!(rule.upstream.preserve_host);
    }

    #[test]
    fn test_decode_grpc_rule_document() {
        let rule: Rule = serde_json::from_value(json!({
            "id": "grpc",
            "match": {"authority": "api.example.com", "full_method": "/pkg.Service/<.*>"},
            "authenticators": [{"handler": "noop"}],
            "authorizer": {"handler": "allow"}
        }))
        .unwrap();

        let matcher = rule.matcher.unwrap();
        assert_eq!(matcher.protocol(), Protocol::Grpc);
        assert_eq!(matcher.pattern(), "grpc://api.example.com/pkg.Service/<.*>");
        assert_eq!(matcher.methods(), vec!["POST".to_string()]);
    }

    #[test]
    fn test_missing_match_decodes_as_none() {
        let rule: Rule = serde_json::from_value(json!({"id": "x"})).unwrap();
        assert!(rule.matcher.is_none());
        assert!(rule.authorizer.handler.is_empty());
    }

    #[test]
    fn test_is_matching_methods_case_insensitive() {
        let engine = RegexpEngine::new();
        let rule = http_rule("http://example.com/<.*>", &["get", "POST"]);
        let url = Url::parse("http://example.com/a?x=1").unwrap();

        assert!(rule.is_matching(&engine, "GET", &url, Protocol::Http).unwrap());
        assert!(rule.is_matching(&engine, "post", &url, Protocol::Http).unwrap());
        assert!(!rule.is_matching(&engine, "DELETE", &url, Protocol::Http).unwrap());
        assert!(!rule.is_matching(&engine, "GET", &url, Protocol::Grpc).unwrap());
    }

    #[test]
    fn test_capture_groups_and_replace() {
        let engine = RegexpEngine::new();
        let rule = http_rule("http://example.com/<[a-z]+>/<[0-9]+>", &["GET"]);
        let url = Url::parse("http://example.com/posts/9").unwrap();

        assert_eq!(
            rule.capture_groups(&engine, &url).unwrap(),
            vec!["posts".to_string(), "9".to_string()]
        );
        assert_eq!(
            rule.replace_all_string(&engine, url.as_str(), "blog:$1:$2").unwrap(),
            "blog:posts:9"
        );
    }

    #[test]
    fn test_glob_rule_matching() {
        let engine = GlobEngine::new();
        let rule = http_rule("http://example.com/<*>", &["GET"]);
        let flat = Url::parse("http://example.com/foo").unwrap();
        let nested = Url::parse("http://example.com/foo/bar").unwrap();
        assert!(rule.is_matching(&engine, "GET", &flat, Protocol::Http).unwrap());
        assert!(!rule.is_matching(&engine, "GET", &nested, Protocol::Http).unwrap());
    }
}
