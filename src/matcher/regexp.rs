//! Regular expression dialect.
//!
//! Literal text is escaped, every `<...>` fragment becomes a capture group
//! and the expression is anchored on both ends.

use regex::Regex;
use std::sync::Arc;

use crate::matcher::pattern::{self, CompiledPatterns, Segment};
use crate::matcher::types::{MatchError, MatchingStrategy};
use crate::matcher::MatchingEngine;

/// Matching engine for the `regexp` strategy.
#[derive(Debug, Default)]
pub struct RegexpEngine {
    compiled: CompiledPatterns,
}

impl RegexpEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of patterns compiled by this engine.
    pub fn compilations(&self) -> usize {
        self.compiled.compilations()
    }

    fn compiled(&self, pattern: &str) -> Result<Arc<Regex>, MatchError> {
        self.compiled.get_or_compile(pattern, compile)
    }
}

/// Translates a delimited pattern into one anchored regular expression.
fn compile(pattern: &str) -> Result<Regex, MatchError> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push('^');

    for segment in pattern::segments(pattern)? {
        match segment {
            Segment::Literal(text) => expression.push_str(&regex::escape(text)),
            Segment::Fragment(fragment) => {
                // Each fragment must be a valid expression on its own.
                Regex::new(&format!("^{fragment}$")).map_err(|e| invalid(pattern, e))?;
                expression.push('(');
                expression.push_str(fragment);
                expression.push(')');
            }
        }
    }

    expression.push('$');
    Regex::new(&expression).map_err(|e| invalid(pattern, e))
}

fn invalid(pattern: &str, err: regex::Error) -> MatchError {
    MatchError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    }
}

impl MatchingEngine for RegexpEngine {
    fn is_matching(&self, pattern: &str, candidate: &str) -> Result<bool, MatchError> {
        Ok(self.compiled(pattern)?.is_match(candidate))
    }

    fn replace_all_string(
        &self,
        pattern: &str,
        input: &str,
        replacement: &str,
    ) -> Result<String, MatchError> {
        Ok(self
            .compiled(pattern)?
            .replace_all(input, replacement)
            .into_owned())
    }

    fn find_captures(&self, pattern: &str, candidate: &str) -> Result<Vec<String>, MatchError> {
        let regex = self.compiled(pattern)?;
        let captures = match regex.captures(candidate) {
            Some(c) => c,
            None => return Ok(Vec::new()),
        };

        Ok(captures
            .iter()
            .skip(1)
            .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
            .collect())
    }

    fn strategy(&self) -> MatchingStrategy {
        MatchingStrategy::Regexp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching() {
        let engine = RegexpEngine::new();
        let pattern = "http://example.com/users/<[0-9]+>";

        assert!(engine.is_matching(pattern, "http://example.com/users/1234").unwrap());
        assert!(!engine.is_matching(pattern, "http://example.com/users/abc").unwrap());
        assert!(!engine.is_matching(pattern, "http://example.com/users/1234/more").unwrap());
        // Literal dots are escaped.
        assert!(!engine.is_matching(pattern, "http://exampleXcom/users/1").unwrap());
    }

    #[test]
    fn test_literal_only_pattern() {
        let engine = RegexpEngine::new();
        assert!(engine.is_matching("https://example.com/", "https://example.com/").unwrap());
        assert!(!engine.is_matching("https://example.com/", "https://example.com/a").unwrap());
    }

    #[test]
    fn test_find_captures() {
        let engine = RegexpEngine::new();
        let captures = engine
            .find_captures(
                "https://example.com/<[a-z]+>/<[0-9]+>",
                "https://example.com/orders/42",
            )
            .unwrap();
        assert_eq!(captures, vec!["orders".to_string(), "42".to_string()]);

        let none = engine
            .find_captures("https://example.com/<[0-9]+>", "https://other.com/1")
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_optional_group_yields_empty_capture() {
        let engine = RegexpEngine::new();
        let captures = engine
            .find_captures("/a<(x)?>b", "/ab")
            .unwrap();
        assert_eq!(captures, vec![String::new(), String::new()]);
    }

    #[test]
    fn test_replace_all_string() {
        let engine = RegexpEngine::new();
        let replaced = engine
            .replace_all_string(
                "http://example.com/<[a-z]+>/<[0-9]+>",
                "http://example.com/blog/7",
                "resources:$1:$2",
            )
            .unwrap();
        assert_eq!(replaced, "resources:blog:7");
    }

    #[test]
    fn test_unbalanced_pattern_fails() {
        let engine = RegexpEngine::new();
        let err = engine
            .is_matching("http://example.com/<[0-9]+", "http://example.com/1")
            .unwrap_err();
        assert!(matches!(err, MatchError::UnbalancedPattern { .. }));
    }

    #[test]
    fn test_invalid_fragment_fails() {
        let engine = RegexpEngine::new();
        let err = engine.is_matching("/<[0-9>", "/1").unwrap_err();
        assert!(matches!(err, MatchError::InvalidPattern { .. }));
    }

    #[test]
    fn test_compiled_once_per_pattern() {
        let engine = RegexpEngine::new();
        let pattern = "http://example.com/<.*>";
        for _ in 0..5 {
            assert!(engine.is_matching(pattern, "http://example.com/x").unwrap());
        }
        assert_eq!(engine.compilations(), 1);

        engine.is_matching("http://example.com/<.+>", "http://example.com/x").unwrap();
        assert_eq!(engine.compilations(), 2);
    }
}
