//! Matching strategy and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pattern dialect applied uniformly to every rule of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Bracketed sections are regular expression fragments.
    #[default]
    Regexp,
    /// Bracketed sections are glob fragments.
    Glob,
}

impl std::fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchingStrategy::Regexp => write!(f, "regexp"),
            MatchingStrategy::Glob => write!(f, "glob"),
        }
    }
}

impl std::str::FromStr for MatchingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "regexp" | "regex" => Ok(MatchingStrategy::Regexp),
            "glob" => Ok(MatchingStrategy::Glob),
            other => Err(format!("unknown matching strategy `{other}`")),
        }
    }
}

/// Errors raised while compiling or evaluating a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// `<` and `>` delimiters do not pair up.
    #[error("unbalanced pattern `{pattern}`: delimiters `<` and `>` must be balanced")]
    UnbalancedPattern { pattern: String },

    /// A fragment failed to compile in the engine's dialect.
    #[error("invalid pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// The dialect does not support the requested operation.
    #[error("{operation} is not implemented for the {strategy} matching strategy")]
    NotImplemented {
        operation: &'static str,
        strategy: MatchingStrategy,
    },
}
