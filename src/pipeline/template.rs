//! Placeholder templates rendered against session data.
//!
//! `{{ subject }}`, `{{ extra.email }}` or
//! `{{ match_context.regexp_capture_groups.0 }}` resolve a dot path in the
//! serialized session. Strings render raw, other values as JSON. A trailing
//! `| json` forces JSON encoding. Missing values render as empty text.

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*(\|\s*json\s*)?\}\}")
        .expect("placeholder expression is valid")
});

/// Renders every placeholder of `template` against `data`.
pub fn render(template: &str, data: &Value) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            let value = lookup(data, &caps[1]);
            let as_json = caps.get(2).is_some();
            match value {
                None if as_json => "null".to_string(),
                None => String::new(),
                Some(Value::String(s)) if !as_json => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// True if `template` contains at least one placeholder.
pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER.is_match(template)
}

/// Resolves a dot separated path; numeric segments index arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data() -> Value {
        json!({
            "subject": "alice",
            "extra": {"email": "alice@example.com", "groups": ["admin", "dev"], "age": 30},
            "match_context": {"regexp_capture_groups": ["users", "42"]}
        })
    }

    #[test]
    fn test_render_strings_and_values() {
        let rendered = render("user={{ subject }} mail={{extra.email}} age={{ extra.age }}", &data());
        assert_eq!(rendered, "user=alice mail=alice@example.com age=30");
    }

    #[test]
    fn test_render_array_index() {
        assert_eq!(
            render("{{ match_context.regexp_capture_groups.1 }}", &data()),
            "42"
        );
        assert_eq!(render("{{ extra.groups }}", &data()), "[\"admin\",\"dev\"]");
    }

    #[test]
    fn test_render_json_filter() {
        assert_eq!(render("{\"sub\": {{ subject | json }}}", &data()), "{\"sub\": \"alice\"}");
        assert_eq!(render("{{ extra.missing | json }}", &data()), "null");
    }

    #[test]
    fn test_missing_values_render_empty() {
        assert_eq!(render("[{{ extra.nope.deeper }}]", &data()), "[]");
        assert_eq!(render("no placeholders", &data()), "no placeholders");
        assert!(!has_placeholders("no placeholders"));
        assert!(has_placeholders("{{ subject }}"));
    }

    #[test]
    fn test_lookup() {
        let data = data();
        assert_eq!(lookup(&data, "extra.groups.0"), Some(&json!("admin")));
        assert_eq!(lookup(&data, "extra.groups.x"), None);
        assert_eq!(lookup(&data, ""), Some(&data));
    }
}
