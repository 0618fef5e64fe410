//! Shared utilities for integration tests.

use axum::Router;
use gatekeeper::pipeline::HandlerKind;
use gatekeeper::rule::{Handler, HttpMatch, Match};
use gatekeeper::{DecisionEngine, DecisionRequest, EngineConfig, Rule};
use axum::http::Method;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

/// Serves `router` on an ephemeral local port.
#[allow(dead_code)]
pub async fn spawn_upstream(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Counts calls reaching a mock upstream.
#[allow(dead_code)]
#[derive(Debug, Clone, Default)]
pub struct Hits(Arc<AtomicUsize>);

#[allow(dead_code)]
impl Hits {
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Config enabling the given `(kind, id)` handlers with no global config.
#[allow(dead_code)]
pub fn config_with(handlers: &[(HandlerKind, &str)]) -> EngineConfig {
    handlers
        .iter()
        .fold(EngineConfig::default(), |config, (kind, id)| {
            config.enable(*kind, id, Value::Null)
        })
}

#[allow(dead_code)]
pub fn engine(config: EngineConfig) -> DecisionEngine {
    DecisionEngine::from_config(config).unwrap()
}

/// HTTP rule for `GET` and `POST` on `url`.
#[allow(dead_code)]
pub fn http_rule(
    id: &str,
    url: &str,
    authenticators: Vec<Handler>,
    authorizer: Handler,
    mutators: Vec<Handler>,
) -> Rule {
    Rule {
        id: id.to_string(),
        matcher: Some(Match::Http(HttpMatch {
            methods: vec!["GET".to_string(), "POST".to_string()],
            url: url.to_string(),
        })),
        authenticators,
        authorizer,
        mutators,
        ..Rule::default()
    }
}

#[allow(dead_code)]
pub fn get(url: &str) -> DecisionRequest {
    DecisionRequest::new(Method::GET, Url::parse(url).unwrap())
}
