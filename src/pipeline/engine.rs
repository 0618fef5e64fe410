//! Decision engine: the surface adapters call.
//!
//! # Responsibilities
//! - Own the matching engines, registry, repository and request handler
//! - Resolve the rule of a request and run its pipeline under the
//!   decision deadline
//! - Turn failures into rendered error responses
//!
//! # Design Decisions
//! - Adapters that render errors themselves use `match_rule` + `decide`;
//!   `evaluate` does matching, deciding and rendering in one call
//! - Dropping the future returned by `decide` cancels in-flight remote calls

use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::schema::EngineConfig;
use crate::error_handler::ErrorHandler;
use crate::health::{ReadinessReport, ReadyChecker};
use crate::matcher::MatchingEngines;
use crate::observability::metrics;
use crate::pipeline::error::{DecisionError, DecisionResult};
use crate::pipeline::handler::RequestHandler;
use crate::pipeline::registry::{HandlerRegistry, StageDependencies};
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::pipeline::session::AuthenticationSession;
use crate::resilience::with_timeout;
use crate::rule::fetcher::{FetchError, RuleFetcher};
use crate::rule::{Protocol, Rule, RuleMatch, RuleRepository, RuleValidator};

/// Outcome of [`DecisionEngine::evaluate`].
#[derive(Debug)]
pub enum Decision {
    /// Forward upstream with the session's headers.
    Allow {
        rule: Arc<Rule>,
        session: AuthenticationSession,
    },
    /// Answer the client with `response`.
    Deny {
        rule: Option<Arc<Rule>>,
        error: DecisionError,
        response: ErrorResponse,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

/// Everything needed to decide requests.
#[derive(Debug)]
pub struct DecisionEngine {
    config: Arc<EngineConfig>,
    repository: Arc<RuleRepository>,
    handler: RequestHandler,
    decision_timeout: Duration,
}

impl DecisionEngine {
    /// Engine with the built-in stages and the given collaborators.
    pub fn new(config: EngineConfig, deps: StageDependencies) -> Self {
        let config = Arc::new(config);
        let engines = Arc::clone(&deps.engines);
        let registry = Arc::new(HandlerRegistry::with_defaults(Arc::clone(&config), deps));
        Self::with_registry(config, engines, registry)
    }

    /// Engine without signing or verification collaborators.
    pub fn from_config(config: EngineConfig) -> DecisionResult<Self> {
        let deps = StageDependencies::from_config(&config, Arc::new(MatchingEngines::new()))?;
        Ok(Self::new(config, deps))
    }

    /// Engine using a caller-assembled registry.
    pub fn with_registry(
        config: Arc<EngineConfig>,
        engines: Arc<MatchingEngines>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let repository = Arc::new(RuleRepository::new(
            RuleValidator::new(Arc::clone(&registry)),
            engines,
            config.access_rules.matching_strategy,
        ));
        Self {
            decision_timeout: Duration::from_millis(config.timeouts.decision_ms),
            config,
            repository,
            handler: RequestHandler::new(registry),
        }
    }

    /// Replaces the handler rendering errors no configured handler takes.
    pub fn with_default_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.handler = self.handler.with_default_error_handler(handler);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<RuleRepository> {
        &self.repository
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Fetcher for the configured rule files.
    pub fn rule_fetcher(&self) -> RuleFetcher {
        RuleFetcher::from_config(&self.config.access_rules, Arc::clone(&self.repository))
    }

    /// Loads the configured rule files once.
    pub fn load_rules(&self) -> Result<usize, FetchError> {
        self.rule_fetcher().load_once()
    }

    pub fn readiness(&self) -> ReadinessReport {
        let checkers: Vec<Arc<dyn ReadyChecker>> = vec![self.repository.clone() as Arc<dyn ReadyChecker>];
        ReadinessReport::collect(&checkers)
    }

    /// The one rule covering the request.
    pub fn match_rule(&self, method: &str, url: &Url, protocol: Protocol) -> DecisionResult<RuleMatch> {
        self.repository.match_rule(method, url, protocol)
    }

    /// Runs the pipeline of `rule_match` within the decision deadline.
    pub async fn decide(
        &self,
        request: &DecisionRequest,
        rule_match: &RuleMatch,
    ) -> DecisionResult<AuthenticationSession> {
        with_timeout(
            self.decision_timeout,
            "decision",
            self.handler.handle_request(request, rule_match),
        )
        .await
    }

    /// Matches, decides and renders errors.
    pub async fn evaluate(&self, request: &DecisionRequest) -> Decision {
        let started = Instant::now();
        let rule_match = self.match_rule(request.method.as_str(), &request.url, request.protocol);

        let decision = match rule_match {
            Ok(rule_match) => match self.decide(request, &rule_match).await {
                Ok(session) => Decision::Allow {
                    rule: rule_match.rule,
                    session,
                },
                Err(error) => self.deny(request, Some(rule_match.rule), error),
            },
            Err(error) => self.deny(request, None, error),
        };

        match &decision {
            Decision::Allow { rule, session } => {
                tracing::info!(method = %request.method, url = %request.url, rule_id = %rule.id, subject = %session.subject, "Access request granted");
                metrics::record_decision(Ok(()), started.elapsed());
            }
            Decision::Deny { rule, error, response } => {
                let rule_id = rule.as_ref().map(|r| r.id.as_str()).unwrap_or_default();
                if error.is_configuration_fault() {
                    tracing::error!(method = %request.method, url = %request.url, rule_id, status = response.status.as_u16(), error = %error, "Access request denied because of a configuration error");
                } else {
                    tracing::info!(method = %request.method, url = %request.url, rule_id, status = response.status.as_u16(), error = %error, "Access request denied");
                }
                metrics::record_decision(Err(error.class()), started.elapsed());
            }
        }
        decision
    }

    fn deny(&self, request: &DecisionRequest, rule: Option<Arc<Rule>>, error: DecisionError) -> Decision {
        let response = self.handler.handle_error(request, rule.as_deref(), &error);
        Decision::Deny {
            rule,
            error,
            response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::HandlerKind;
    use crate::rule::{Handler, HttpMatch, Match};
    use axum::http::{Method, StatusCode};
    use serde_json::Value;

    fn engine() -> DecisionEngine {
        let config = EngineConfig::default()
            .enable(HandlerKind::Authenticator, "noop", Value::Null)
            .enable(HandlerKind::Authenticator, "unauthorized", Value::Null)
            .enable(HandlerKind::Authorizer, "allow", Value::Null)
            .enable(HandlerKind::Mutator, "noop", Value::Null);
        DecisionEngine::from_config(config).unwrap()
    }

    fn rule(id: &str, url: &str, authenticator: &str) -> Rule {
        Rule {
            id: id.into(),
            matcher: Some(Match::Http(HttpMatch {
                methods: vec!["GET".into()],
                url: url.into(),
            })),
            authenticators: vec![Handler::new(authenticator)],
            authorizer: Handler::new("allow"),
            mutators: vec![Handler::new("noop")],
            ..Rule::default()
        }
    }

    fn request(url: &str) -> DecisionRequest {
        DecisionRequest::new(Method::GET, Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_evaluate_allow() {
        let engine = engine();
        engine.repository().set(vec![rule("open", "http://example.com/<.*>", "noop")]);

        let decision = engine
            .evaluate(&request("http://example.com/a").with_header("X-Trace", "1"))
            .await;
        match decision {
            Decision::Allow { rule, session } => {
                assert_eq!(rule.id, "open");
                assert_eq!(session.header.get("x-trace"), Some("1"));
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_evaluate_renders_errors() {
        let engine = engine();
        engine.repository().set(vec![rule("closed", "http://example.com/closed", "unauthorized")]);

        let decision = engine.evaluate(&request("http://example.com/closed")).await;
        match decision {
            Decision::Deny { rule, response, .. } => {
                assert_eq!(rule.unwrap().id, "closed");
                assert_eq!(response.status, StatusCode::UNAUTHORIZED);
            }
            other => panic!("unexpected decision: {other:?}"),
        }

        let decision = engine.evaluate(&request("http://example.com/unknown")).await;
        match decision {
            Decision::Deny { rule, error, response } => {
                assert!(rule.is_none());
                assert!(matches!(error, DecisionError::NoRuleMatched));
                assert_eq!(response.status, StatusCode::NOT_FOUND);
            }
            other => panic!("unexpected decision: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_readiness_follows_rules() {
        let engine = engine();
        assert!(!engine.readiness().ready);
        engine.repository().set(vec![rule("open", "http://example.com/", "noop")]);
        assert!(engine.readiness().ready);
    }
}
