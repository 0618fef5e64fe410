//! Glob dialect.
//!
//! `<...>` fragments accept `*`, `**`, `?`, `[...]`, `[!...]` and `{a,b}`.
//! `.` and `/` are separators: `*` and `?` never match across them, `**`
//! does. Fragments are translated into one anchored regular expression.

use regex::Regex;
use std::iter::Peekable;
use std::str::Chars;
use std::sync::Arc;

use crate::matcher::pattern::{self, CompiledPatterns, Segment};
use crate::matcher::types::{MatchError, MatchingStrategy};
use crate::matcher::MatchingEngine;

/// Any run of characters within one separator-delimited segment.
const SEGMENT_ANY: &str = "[^./]*";
/// Any single character that is not a separator.
const SEGMENT_ONE: &str = "[^./]";

/// Matching engine for the `glob` strategy.
#[derive(Debug, Default)]
pub struct GlobEngine {
    compiled: CompiledPatterns,
}

impl GlobEngine {
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

fn compile(pattern: &str) -> Result<Regex, MatchError> {
    let mut expression = String::with_capacity(pattern.len() * 2);
    expression.push('^');

    for segment in pattern::segments(pattern)? {
        match segment {
            Segment::Literal(text) => expression.push_str(&regex::escape(text)),
            Segment::Fragment(fragment) => {
                expression.push_str(&translate_fragment(pattern, fragment)?)
            }
        }
    }

    expression.push('$');
    Regex::new(&expression).map_err(|e| invalid(pattern, e.to_string()))
}

/// Translates one glob fragment into regular expression syntax.
fn translate_fragment(pattern: &str, fragment: &str) -> Result<String, MatchError> {
    let mut out = String::with_capacity(fragment.len() * 2);
    let mut chars = fragment.chars().peekable();
    let mut alternation_depth = 0usize;

    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str(SEGMENT_ANY);
                }
            }
            '?' => out.push_str(SEGMENT_ONE),
            '[' => out.push_str(&translate_class(pattern, &mut chars)?),
            '{' => {
                alternation_depth += 1;
                out.push_str("(?:");
            }
            '}' if alternation_depth > 0 => {
                alternation_depth -= 1;
                out.push(')');
            }
            ',' if alternation_depth > 0 => out.push('|'),
            '\\' => match chars.next() {
                Some(escaped) => out.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4]))),
                None => return Err(invalid(pattern, "dangling escape character")),
            },
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    if alternation_depth != 0 {
        return Err(invalid(pattern, "unterminated `{` alternation"));
    }

    Ok(out)
}

/// Translates a `[...]` or `[!...]` character class, the opening `[`
/// already consumed.
fn translate_class(pattern: &str, chars: &mut Peekable<Chars<'_>>) -> Result<String, MatchError> {
    let mut class = String::from("[");
    if chars.peek() == Some(&'!') {
        chars.next();
        class.push('^');
    }

    let mut members = 0usize;
    loop {
        match chars.next() {
            Some(']') => break,
            Some('-') if members > 0 && chars.peek() != Some(&']') => class.push('-'),
            Some('\\') => match chars.next() {
                Some(escaped) => {
                    members += 1;
                    class.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
                None => return Err(invalid(pattern, "dangling escape character")),
            },
            Some(member) => {
                members += 1;
                class.push_str(&regex::escape(member.encode_utf8(&mut [0; 4])));
            }
            None => return Err(invalid(pattern, "unterminated character class")),
        }
    }

    if members == 0 {
        return Err(invalid(pattern, "empty character class"));
    }

    class.push(']');
    Ok(class)
}

fn invalid(pattern: &str, reason: impl Into<String>) -> MatchError {
    MatchError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: reason.into(),
    }
}

impl MatchingEngine for GlobEngine {
    fn is_matching(&self, pattern: &str, candidate: &str) -> Result<bool, MatchError> {
        Ok(self.compiled(pattern)?.is_match(candidate))
    }

    fn replace_all_string(
        &self,
        _pattern: &str,
        _input: &str,
        _replacement: &str,
    ) -> Result<String, MatchError> {
        Err(MatchError::NotImplemented {
            operation: "replace_all_string",
            strategy: MatchingStrategy::Glob,
        })
    }

    fn find_captures(&self, pattern: &str, _candidate: &str) -> Result<Vec<String>, MatchError> {
        // Validates the pattern; globs have no capture groups.
        self.compiled(pattern)?;
        Ok(Vec::new())
    }

    fn strategy(&self) -> MatchingStrategy {
        MatchingStrategy::Glob
    }
}
