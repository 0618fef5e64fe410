//! Authentication session built up across pipeline stages.

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use url::Url;

use crate::matcher::MatchingStrategy;
use crate::pipeline::template;

/// Case-insensitive multi-valued header map. Names are stored lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, Vec<String>>")]
pub struct Header(BTreeMap<String, Vec<String>>);

impl From<BTreeMap<String, Vec<String>>> for Header {
    fn from(raw: BTreeMap<String, Vec<String>>) -> Self {
        let mut header = Header::new();
        for (name, values) in raw {
            for value in values {
                header.add(&name, value);
            }
        }
        header
    }
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// All values of `name`.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.0
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replaces all values of `name`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .insert(name.to_ascii_lowercase(), vec![value.into()]);
    }

    /// Appends a value to `name`.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        self.0
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(&name.to_ascii_lowercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Copies every valid UTF-8 header of `headers`.
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let mut header = Self::new();
        for (name, value) in headers.iter() {
            if let Ok(value) = value.to_str() {
                header.add(name.as_str(), value);
            }
        }
        header
    }

    /// Converts into an HTTP header map, skipping invalid entries.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, values) in &self.0 {
            let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            for value in values {
                if let Ok(value) = HeaderValue::from_str(value) {
                    headers.append(name.clone(), value);
                }
            }
        }
        headers
    }
}

/// Captures produced by a successful rule match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchContext {
    #[serde(default)]
    pub regexp_capture_groups: Vec<String>,
    #[serde(default)]
    pub url: Option<Url>,
    #[serde(default)]
    pub method: String,
    /// Dialect the rule was matched with.
    #[serde(default)]
    pub strategy: MatchingStrategy,
}

/// Identity, claims and outbound headers of one request.
///
/// Owned by the task deciding the request. `Clone` is a deep copy, which is
/// what caches store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthenticationSession {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub extra: Map<String, Value>,
    #[serde(default)]
    pub header: Header,
    #[serde(default)]
    pub match_context: MatchContext,
}

impl AuthenticationSession {
    /// Empty session carrying the captures of the matched rule.
    pub fn new(match_context: MatchContext) -> Self {
        Self {
            match_context,
            ..Self::default()
        }
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.header.set(name, value);
    }

    /// The session as template data.
    pub fn template_data(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Renders `template` against this session.
    pub fn render(&self, template: &str) -> String {
        template::render(template, &self.template_data())
    }
}
