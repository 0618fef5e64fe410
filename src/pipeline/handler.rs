//! Chain execution for one matched request.
//!
//! # Data Flow
//! ```text
//! RuleMatch + DecisionRequest
//!     → authenticate: first responsible authenticator wins
//!     → authorize:    the rule's single authorizer
//!     → mutate:       every mutator, in order
//!     → AuthenticationSession for the upstream request
//!
//! DecisionError
//!     → handle_error: ForceResponse as-is, else first error handler
//!       whose `when` matches, else the default handler
//! ```
//!
//! # Design Decisions
//! - Each authenticator works on its own copy of the session; only the
//!   copy of the successful one is kept
//! - A `Forbidden` or `Unauthorized` from an authenticator ends the chain,
//!   later authenticators are not consulted

use std::sync::Arc;

use crate::error_handler::{when, ErrorHandler, JsonErrorHandler};
use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};
use crate::pipeline::registry::HandlerRegistry;
use crate::pipeline::request::DecisionRequest;
use crate::pipeline::response::ErrorResponse;
use crate::pipeline::session::AuthenticationSession;
use crate::rule::{Handler, Rule, RuleMatch};

use axum::http::StatusCode;
use serde_json::Value;

/// Runs the stage chains of matched rules.
pub struct RequestHandler {
    registry: Arc<HandlerRegistry>,
    default_error_handler: Arc<dyn ErrorHandler>,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler")
            .field("registry", &self.registry)
            .field("default_error_handler", &self.default_error_handler.id())
            .finish()
    }
}

impl RequestHandler {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self {
            registry,
            default_error_handler: Arc::new(JsonErrorHandler),
        }
    }

    /// Replaces the handler used when no configured error handler applies.
    pub fn with_default_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.default_error_handler = handler;
        self
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Authenticate → Authorize → Mutate for `request` under `rule_match`.
    pub async fn handle_request(
        &self,
        request: &DecisionRequest,
        rule_match: &RuleMatch,
    ) -> DecisionResult<AuthenticationSession> {
        let rule = rule_match.rule.as_ref();
        let mut session = AuthenticationSession::new(rule_match.context.clone());

        self.authenticate(request, &mut session, rule).await?;
        self.authorize(request, &mut session, rule).await?;
        self.mutate(request, &mut session, rule).await?;

        Ok(session)
    }

    /// Runs the authenticator chain.
    ///
    /// `NotResponsible` moves on to the next authenticator; any other
    /// error stops the chain. If nobody is responsible the request is
    /// `Unauthorized`.
    pub async fn authenticate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        rule: &Rule,
    ) -> DecisionResult<()> {
        for handler in &rule.authenticators {
            let stage = self.registry.authenticator(&handler.handler)?;
            let config = self.config(HandlerKind::Authenticator, handler);

            let mut candidate = session.clone();
            match stage.authenticate(request, &mut candidate, &config, rule).await {
                Ok(()) => {
                    tracing::debug!(rule_id = %rule.id, authenticator = stage.id(), subject = %candidate.subject, "Authenticated request");
                    *session = candidate;
                    return Ok(());
                }
                Err(DecisionError::NotResponsible) => {
                    tracing::debug!(rule_id = %rule.id, authenticator = stage.id(), "Authenticator not responsible, trying next");
                }
                Err(e) => {
                    tracing::info!(rule_id = %rule.id, authenticator = stage.id(), error = %e, "Authentication failed");
                    return Err(e);
                }
            }
        }

        Err(DecisionError::unauthorized(
            "no authentication handler was responsible for handling the request",
        ))
    }

    /// Runs the rule's authorizer.
    pub async fn authorize(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        rule: &Rule,
    ) -> DecisionResult<()> {
        if rule.authorizer.handler.is_empty() {
            return Err(DecisionError::InvalidRule {
                id: rule.id.clone(),
                reason: "value of \"authorizer.handler\" must be set".to_string(),
            });
        }

        let stage = self.registry.authorizer(&rule.authorizer.handler)?;
        let config = self.config(HandlerKind::Authorizer, &rule.authorizer);
        let result = stage.authorize(request, session, &config, rule).await;
        if let Err(e) = &result {
            tracing::info!(rule_id = %rule.id, authorizer = stage.id(), subject = %session.subject, error = %e, "Authorization denied");
        }
        result
    }

    /// Runs every mutator of the rule in order.
    pub async fn mutate(
        &self,
        request: &DecisionRequest,
        session: &mut AuthenticationSession,
        rule: &Rule,
    ) -> DecisionResult<()> {
        for handler in &rule.mutators {
            let stage = self.registry.mutator(&handler.handler)?;
            let config = self.config(HandlerKind::Mutator, handler);
            if let Err(e) = stage.mutate(request, session, &config, rule).await {
                tracing::warn!(rule_id = %rule.id, mutator = stage.id(), error = %e, "Mutation failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Renders `error` for the client.
    ///
    /// Candidates are the rule's error handlers, or the configured fallback
    /// list when the rule has none (or no rule matched). The first
    /// candidate whose `when` matches renders the response.
    pub fn handle_error(
        &self,
        request: &DecisionRequest,
        rule: Option<&Rule>,
        error: &DecisionError,
    ) -> ErrorResponse {
        if let DecisionError::ForceResponse(response) = error {
            return response.as_ref().clone();
        }

        let candidates: Vec<Handler> = match rule {
            Some(rule) if !rule.errors.is_empty() => rule.errors.clone(),
            _ => self
                .registry
                .config()
                .errors
                .fallback
                .iter()
                .map(Handler::new)
                .collect(),
        };

        for handler in &candidates {
            let stage = match self.registry.error_handler(&handler.handler) {
                Ok(stage) => stage,
                Err(e) => {
                    tracing::warn!(handler = %handler.handler, error = %e, "Skipping unusable error handler");
                    continue;
                }
            };
            let config = self.config(HandlerKind::ErrorHandler, handler);
            let conditions = match stage.when(&config) {
                Ok(conditions) => conditions,
                Err(e) => {
                    tracing::warn!(handler = stage.id(), error = %e, "Skipping error handler with invalid conditions");
                    continue;
                }
            };
            if !when::matches(&conditions, request, error) {
                continue;
            }

            return match stage.handle(request, &config, rule, error) {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!(handler = stage.id(), error = %e, "Error handler failed");
                    self.default_response(request, rule, &e)
                }
            };
        }

        self.default_response(request, rule, error)
    }

    fn default_response(
        &self,
        request: &DecisionRequest,
        rule: Option<&Rule>,
        error: &DecisionError,
    ) -> ErrorResponse {
        self.default_error_handler
            .handle(request, &Value::Null, rule, error)
            .unwrap_or_else(|e| {
                tracing::error!(error = %e, "Default error handler failed");
                ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR)
            })
    }

    fn config(&self, kind: HandlerKind, handler: &Handler) -> Value {
        self.registry.merged_config(kind, handler)
    }
}
