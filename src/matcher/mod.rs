//! Pattern matching subsystem.
//!
//! # Data Flow
//! ```text
//! Rule pattern ("https://example.com/users/<[0-9]+>")
//!     → pattern.rs (split into literal text and <...> fragments, checksum)
//!     → regexp.rs | glob.rs (compile fragments in their dialect)
//!     → compiled cache keyed by checksum
//!     → is_matching / find_captures / replace_all_string
//! ```
//!
//! # Design Decisions
//! - One engine per dialect, shared by every rule in the repository
//! - Compiled patterns are cached by checksum; a pattern is compiled once
//! - Unbalanced delimiters are rejected before any compilation happens
//! - The dialect is chosen repository-wide through `MatchingStrategy`

pub mod glob;
pub mod pattern;
pub mod regexp;
pub mod types;

pub use glob::GlobEngine;
pub use regexp::RegexpEngine;
pub use types::{MatchError, MatchingStrategy};

/// Capability set shared by all pattern dialects.
pub trait MatchingEngine: Send + Sync + std::fmt::Debug {
    /// Returns true if `candidate` matches the whole `pattern`.
    fn is_matching(&self, pattern: &str, candidate: &str) -> Result<bool, MatchError>;

    /// Replaces every match of `pattern` in `input` with `replacement`
    /// (`$1`, `$2`, ... refer to capture groups).
    fn replace_all_string(
        &self,
        pattern: &str,
        input: &str,
        replacement: &str,
    ) -> Result<String, MatchError>;

    /// Returns the capture groups of `pattern` matched against `candidate`.
    fn find_captures(&self, pattern: &str, candidate: &str) -> Result<Vec<String>, MatchError>;

    /// Checksum of the raw pattern text, used as compiled cache key.
    fn checksum(&self, pattern: &str) -> u64 {
        pattern::checksum(pattern)
    }

    /// The dialect this engine implements.
    fn strategy(&self) -> MatchingStrategy;
}

/// One engine of each dialect, selected by strategy.
#[derive(Debug, Default)]
pub struct MatchingEngines {
    regexp: RegexpEngine,
    glob: GlobEngine,
}

impl MatchingEngines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine implementing the given strategy.
    pub fn select(&self, strategy: MatchingStrategy) -> &dyn MatchingEngine {
        match strategy {
            MatchingStrategy::Regexp => &self.regexp,
            MatchingStrategy::Glob => &self.glob,
        }
    }

    pub fn regexp(&self) -> &RegexpEngine {
        &self.regexp
    }

    pub fn glob(&self) -> &GlobEngine {
        &self.glob
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_by_strategy() {
        let engines = MatchingEngines::new();
        assert_eq!(
            engines.select(MatchingStrategy::Regexp).strategy(),
            MatchingStrategy::Regexp
        );
        assert_eq!(
            engines.select(MatchingStrategy::Glob).strategy(),
            MatchingStrategy::Glob
        );
    }
}
