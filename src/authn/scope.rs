//! Scope matching strategies for OAuth2 and JWT authenticators.

use serde::{Deserialize, Serialize};

/// How a required scope is found among granted scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeStrategy {
    /// No local check; the token issuer is trusted to have checked.
    #[default]
    None,
    /// The required scope must be granted verbatim.
    Exact,
    /// Granting `foo` also grants `foo.bar` and `foo.bar.baz`.
    Hierarchic,
    /// `*` matches one non-empty dot separated part; a trailing `*`
    /// matches the rest.
    Wildcard,
}

impl ScopeStrategy {
    /// Returns true if `required` is covered by `granted`.
    pub fn matches(&self, granted: &[String], required: &str) -> bool {
        match self {
            ScopeStrategy::None => true,
            ScopeStrategy::Exact => granted.iter().any(|g| g == required),
            ScopeStrategy::Hierarchic => granted.iter().any(|g| hierarchic(g, required)),
            ScopeStrategy::Wildcard => granted.iter().any(|g| wildcard(g, required)),
        }
    }

    /// Returns the first required scope not covered by `granted`.
    pub fn missing<'a>(&self, granted: &[String], required: &'a [String]) -> Option<&'a str> {
        required
            .iter()
            .map(String::as_str)
            .find(|r| !self.matches(granted, r))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeStrategy::None => "none",
            ScopeStrategy::Exact => "exact",
            ScopeStrategy::Hierarchic => "hierarchic",
            ScopeStrategy::Wildcard => "wildcard",
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, ScopeStrategy::None)
    }
}

fn hierarchic(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    if granted.len() > required.len() {
        return false;
    }
    let granted: Vec<&str> = granted.split('.').collect();
    for (k, part) in required.split('.').enumerate() {
        match granted.get(k) {
            None => return true,
            Some(g) if *g != part => return false,
            Some(_) => {}
        }
    }
    false
}

fn wildcard(granted: &str, required: &str) -> bool {
    if granted == required {
        return true;
    }
    let needle: Vec<&str> = required.split('.').collect();
    let matcher: Vec<&str> = granted.split('.').collect();
    if matcher.len() > needle.len() {
        return false;
    }
    let last = matcher.len() - 1;
    for (k, part) in matcher.iter().enumerate() {
        if k == last && matcher.len() != needle.len() && *part != "*" {
            return false;
        }
        if *part == "*" && !needle[k].is_empty() {
            continue;
        }
        if *part != needle[k] {
            return false;
        }
    }
    true
}

/// Splits a space separated scope claim.
pub fn split_scopes(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}
