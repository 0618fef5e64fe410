//! Human readable durations (`"30s"`, `"100ms"`, `"1h 30m"`) in handler
//! configuration.
//!
//! Use with `#[serde(with = "crate::config::duration")]` on `Duration`
//! fields or `duration::option` on `Option<Duration>` fields.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse(&raw).map_err(serde::de::Error::custom)
}

/// Parses a duration, rejecting empty input.
pub fn parse(raw: &str) -> Result<Duration, String> {
    humantime::parse_duration(raw.trim()).map_err(|e| format!("invalid duration \"{raw}\": {e}"))
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => parse(raw).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Settings {
        #[serde(with = "super")]
        ttl: Duration,
        #[serde(default, with = "super::option")]
        grace: Option<Duration>,
    }

    #[test]
    fn test_parse_humantime_strings() {
        let s: Settings = serde_json::from_str(r#"{"ttl": "1m 30s", "grace": "250ms"}"#).unwrap();
        assert_eq!(s.ttl, Duration::from_secs(90));
        assert_eq!(s.grace, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_missing_optional_is_none() {
        let s: Settings = serde_json::from_str(r#"{"ttl": "5s"}"#).unwrap();
        assert_eq!(s.grace, None);
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let err = serde_json::from_str::<Settings>(r#"{"ttl": "soon"}"#).unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn test_serialize_round_trips() {
        let s = Settings {
            ttl: Duration::from_secs(30),
            grace: None,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["ttl"], "30s");
    }
}
