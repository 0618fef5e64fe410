//! Decision error taxonomy.
//!
//! Every error carries an [`ErrorClass`] so adapters can map it to an HTTP
//! or gRPC status without the core knowing about either protocol.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::matcher::MatchError;
use crate::pipeline::response::ErrorResponse;

/// Status classification of a decision error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    InternalServerError,
    BadGateway,
    ServiceUnavailable,
    GatewayTimeout,
}

impl ErrorClass {
    pub const ALL: [ErrorClass; 8] = [
        ErrorClass::BadRequest,
        ErrorClass::Unauthorized,
        ErrorClass::Forbidden,
        ErrorClass::NotFound,
        ErrorClass::InternalServerError,
        ErrorClass::BadGateway,
        ErrorClass::ServiceUnavailable,
        ErrorClass::GatewayTimeout,
    ];

    /// Numeric HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorClass::BadRequest => 400,
            ErrorClass::Unauthorized => 401,
            ErrorClass::Forbidden => 403,
            ErrorClass::NotFound => 404,
            ErrorClass::InternalServerError => 500,
            ErrorClass::BadGateway => 502,
            ErrorClass::ServiceUnavailable => 503,
            ErrorClass::GatewayTimeout => 504,
        }
    }

    /// Canonical status text, e.g. "Unauthorized".
    pub fn status_text(&self) -> &'static str {
        match self {
            ErrorClass::BadRequest => "Bad Request",
            ErrorClass::Unauthorized => "Unauthorized",
            ErrorClass::Forbidden => "Forbidden",
            ErrorClass::NotFound => "Not Found",
            ErrorClass::InternalServerError => "Internal Server Error",
            ErrorClass::BadGateway => "Bad Gateway",
            ErrorClass::ServiceUnavailable => "Service Unavailable",
            ErrorClass::GatewayTimeout => "Gateway Timeout",
        }
    }

    /// Snake case name used by error handler `when` conditions.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorClass::BadRequest => "bad_request",
            ErrorClass::Unauthorized => "unauthorized",
            ErrorClass::Forbidden => "forbidden",
            ErrorClass::NotFound => "not_found",
            ErrorClass::InternalServerError => "internal_server_error",
            ErrorClass::BadGateway => "bad_gateway",
            ErrorClass::ServiceUnavailable => "service_unavailable",
            ErrorClass::GatewayTimeout => "gateway_timeout",
        }
    }

    /// Message shown to clients when details are not exposed.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorClass::BadRequest => "The request could not be processed",
            ErrorClass::Unauthorized => "Access credentials are invalid",
            ErrorClass::Forbidden => {
                "Access credentials are not sufficient to access this resource"
            }
            ErrorClass::NotFound => "Requested url does not match any rules",
            ErrorClass::InternalServerError => {
                "An internal server error occurred, please contact the system administrator"
            }
            ErrorClass::BadGateway => "An upstream service returned an invalid response",
            ErrorClass::ServiceUnavailable => "An upstream service is unavailable",
            ErrorClass::GatewayTimeout => "An upstream service did not respond in time",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn from_status(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.status_code() == code)
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The pipeline role of a named handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    Authenticator,
    Authorizer,
    Mutator,
    ErrorHandler,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerKind::Authenticator => write!(f, "authenticator"),
            HandlerKind::Authorizer => write!(f, "authorizer"),
            HandlerKind::Mutator => write!(f, "mutator"),
            HandlerKind::ErrorHandler => write!(f, "error handler"),
        }
    }
}

/// Errors produced while matching, validating or deciding.
#[derive(Debug, Error)]
pub enum DecisionError {
    /// Internal signal: the stage declines this request.
    #[error("the handler is not responsible for this request")]
    NotResponsible,

    /// Credentials are missing or invalid.
    #[error("access credentials are invalid: {reason}")]
    Unauthorized { reason: String },

    /// Credentials are valid but not sufficient.
    #[error("access credentials are not sufficient: {reason}")]
    Forbidden { reason: String },

    /// The request itself is malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A looked-up resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// No rule covers the request.
    #[error("requested url does not match any rules")]
    NoRuleMatched,

    /// Two or more rules (valid or invalid) cover the request.
    #[error("expected exactly one rule to match the request but found {count}")]
    AmbiguousMatch { count: usize },

    /// A handler name does not resolve in its registry.
    #[error("value of \"handler\" must be one of {known:?} but got \"{id}\" ({kind})")]
    UnknownHandler {
        kind: HandlerKind,
        id: String,
        known: Vec<String>,
    },

    /// A known handler is switched off in the engine configuration.
    #[error("{kind} \"{id}\" is disabled per configuration")]
    HandlerDisabled { kind: HandlerKind, id: String },

    /// A handler's configuration failed validation.
    #[error("{kind} \"{id}\" is misconfigured: {reason}")]
    MisconfiguredHandler {
        kind: HandlerKind,
        id: String,
        reason: String,
    },

    /// A rule is structurally invalid.
    #[error("rule \"{id}\" is invalid: {reason}")]
    InvalidRule { id: String, reason: String },

    /// Pattern compilation or evaluation failed.
    #[error(transparent)]
    Matching(#[from] MatchError),

    /// A remote call did not complete in time.
    #[error("upstream {service} timed out")]
    UpstreamTimeout { service: String },

    /// A remote service could not be reached.
    #[error("upstream {service} is unavailable: {reason}")]
    UpstreamUnavailable { service: String, reason: String },

    /// A remote service answered with an unexpected status.
    #[error("upstream {service} responded with unexpected status {status}")]
    UpstreamStatus { service: String, status: u16 },

    /// A remote service answered with an unusable payload.
    #[error("upstream {service} failed: {reason}")]
    UpstreamInternal { service: String, reason: String },

    /// A stage already produced the terminal response.
    #[error("a terminal response with status {} was produced", .0.status)]
    ForceResponse(Box<ErrorResponse>),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for decision operations.
pub type DecisionResult<T> = Result<T, DecisionError>;

impl DecisionError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        DecisionError::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        DecisionError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn misconfigured(kind: HandlerKind, id: &str, reason: impl std::fmt::Display) -> Self {
        DecisionError::MisconfiguredHandler {
            kind,
            id: id.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn upstream_internal(service: &str, reason: impl std::fmt::Display) -> Self {
        DecisionError::UpstreamInternal {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Maps a transport error of a remote call.
    pub fn from_transport(service: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            DecisionError::UpstreamTimeout {
                service: service.to_string(),
            }
        } else if err.is_builder() {
            DecisionError::upstream_internal(service, err)
        } else {
            DecisionError::UpstreamUnavailable {
                service: service.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Status classification of this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            DecisionError::NotResponsible | DecisionError::Unauthorized { .. } => {
                ErrorClass::Unauthorized
            }
            DecisionError::Forbidden { .. } => ErrorClass::Forbidden,
            DecisionError::BadRequest(_) => ErrorClass::BadRequest,
            DecisionError::NotFound(_) | DecisionError::NoRuleMatched => ErrorClass::NotFound,
            DecisionError::UpstreamTimeout { .. } => ErrorClass::GatewayTimeout,
            DecisionError::UpstreamUnavailable { .. } => ErrorClass::ServiceUnavailable,
            DecisionError::UpstreamStatus { status, .. } if *status >= 500 => {
                ErrorClass::BadGateway
            }
            DecisionError::ForceResponse(response) => {
                ErrorClass::from_status(response.status.as_u16())
                    .unwrap_or(ErrorClass::InternalServerError)
            }
            DecisionError::AmbiguousMatch { .. }
            | DecisionError::UnknownHandler { .. }
            | DecisionError::HandlerDisabled { .. }
            | DecisionError::MisconfiguredHandler { .. }
            | DecisionError::InvalidRule { .. }
            | DecisionError::Matching(_)
            | DecisionError::UpstreamStatus { .. }
            | DecisionError::UpstreamInternal { .. }
            | DecisionError::Internal(_) => ErrorClass::InternalServerError,
        }
    }

    /// Numeric status code for adapters.
    pub fn status_code(&self) -> u16 {
        match self {
            DecisionError::ForceResponse(response) => response.status.as_u16(),
            other => other.class().status_code(),
        }
    }

    /// True for upstream failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            DecisionError::UpstreamTimeout { .. } | DecisionError::UpstreamUnavailable { .. } => {
                true
            }
            DecisionError::UpstreamStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// True for errors caused by server-side configuration.
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            DecisionError::AmbiguousMatch { .. }
                | DecisionError::UnknownHandler { .. }
                | DecisionError::HandlerDisabled { .. }
                | DecisionError::MisconfiguredHandler { .. }
                | DecisionError::InvalidRule { .. }
                | DecisionError::Matching(_)
        )
    }
}
