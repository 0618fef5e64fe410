//! Delimited pattern parsing and compiled-pattern caching.
//!
//! # Responsibilities
//! - Split a pattern into literal text and `<...>` fragments
//! - Detect unbalanced delimiters
//! - Compute the checksum used to key compiled patterns
//! - Cache compiled expressions so each pattern is compiled once

use dashmap::DashMap;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::matcher::types::MatchError;

/// Opening delimiter of a fragment.
pub const OPEN: char = '<';
/// Closing delimiter of a fragment.
pub const CLOSE: char = '>';

/// Upper bound of cached compiled patterns per engine. Rule reloads with
/// changing patterns would otherwise grow the cache forever.
const MAX_COMPILED_PATTERNS: usize = 4096;

/// One piece of a delimited pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Text outside of delimiters, matched literally.
    Literal(&'a str),
    /// Text between the outermost delimiters, in the engine's dialect.
    Fragment(&'a str),
}

/// Splits `pattern` into literal and fragment segments.
///
/// Delimiters nest: only the outermost pair opens and closes a fragment.
pub fn segments(pattern: &str) -> Result<Vec<Segment<'_>>, MatchError> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;

    for (idx, ch) in pattern.char_indices() {
        if ch == OPEN {
            if depth == 0 {
                if idx > start {
                    segments.push(Segment::Literal(&pattern[start..idx]));
                }
                start = idx + OPEN.len_utf8();
            }
            depth += 1;
        } else if ch == CLOSE {
            if depth == 0 {
                return Err(unbalanced(pattern));
            }
            depth -= 1;
            if depth == 0 {
                segments.push(Segment::Fragment(&pattern[start..idx]));
                start = idx + CLOSE.len_utf8();
            }
        }
    }

    if depth != 0 {
        return Err(unbalanced(pattern));
    }
    if start < pattern.len() {
        segments.push(Segment::Literal(&pattern[start..]));
    }

    Ok(segments)
}

fn unbalanced(pattern: &str) -> MatchError {
    MatchError::UnbalancedPattern {
        pattern: pattern.to_string(),
    }
}

/// Deterministic checksum of the raw pattern text.
pub fn checksum(pattern: &str) -> u64 {
    let digest = Sha256::digest(pattern.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

/// Compiled expressions keyed by pattern checksum.
#[derive(Debug, Default)]
pub struct CompiledPatterns {
    compiled: DashMap<u64, Arc<Regex>>,
    compilations: AtomicUsize,
}

impl CompiledPatterns {
    /// Returns the cached expression for `pattern`, compiling it on first use.
    pub fn get_or_compile<F>(&self, pattern: &str, compile: F) -> Result<Arc<Regex>, MatchError>
    where
        F: FnOnce(&str) -> Result<Regex, MatchError>,
    {
        let key = checksum(pattern);
        if let Some(found) = self.compiled.get(&key) {
            return Ok(found.value().clone());
        }

        let regex = Arc::new(compile(pattern)?);
        self.compilations.fetch_add(1, Ordering::Relaxed);

        if self.compiled.len() >= MAX_COMPILED_PATTERNS {
            tracing::debug!(
                entries = self.compiled.len(),
                "Compiled pattern cache full, clearing"
            );
            self.compiled.clear();
        }
        self.compiled.insert(key, regex.clone());
        Ok(regex)
    }

    /// Number of compilations performed so far.
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Number of cached compiled patterns.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_split() {
        let parsed = segments("https://example.com/<[0-9]+>/items/<.*>").unwrap();
        assert_eq!(
            parsed,
            vec![
                Segment::Literal("https://example.com/"),
                Segment::Fragment("[0-9]+"),
                Segment::Literal("/items/"),
                Segment::Fragment(".*"),
            ]
        );
    }

    #[test]
    fn test_segments_nested_delimiters() {
        let parsed = segments("/<(?P<id>[0-9]+)>").unwrap();
        assert_eq!(
            parsed,
            vec![Segment::Literal("/"), Segment::Fragment("(?P<id>[0-9]+)")]
        );
    }

    #[test]
    fn test_segments_literal_only() {
        let parsed = segments("https://example.com/").unwrap();
        assert_eq!(parsed, vec![Segment::Literal("https://example.com/")]);
        assert!(segments("").unwrap().is_empty());
    }

    #[test]
    fn test_unbalanced_detection() {
        for pattern in ["/<[0-9]+", "/[0-9]+>", "/<<a>", "/>a<"] {
            assert!(
                matches!(segments(pattern), Err(MatchError::UnbalancedPattern { .. })),
                "{pattern} should be unbalanced"
            );
        }
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum("/<.*>"), checksum("/<.*>"));
        assert_ne!(checksum("/<.*>"), checksum("/<.+>"));
    }

    #[test]
    fn test_compiled_cache_reuse() {
        let cache = CompiledPatterns::default();
        let first = cache
            .get_or_compile("^a$", |p| Ok(Regex::new(p).unwrap()))
            .unwrap();
        let second = cache
            .get_or_compile("^a$", |_| panic!("must not recompile"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.compilations(), 1);
        assert_eq!(cache.len(), 1);
    }
}
