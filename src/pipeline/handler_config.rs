//! Decoding and merging of opaque handler configuration.
//!
//! The engine configuration carries a global config per handler and each
//! rule may carry its own. The two are deep-merged, rule values winning,
//! and the stage decodes the result into its own typed config.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::pipeline::error::{DecisionError, DecisionResult, HandlerKind};

/// Deep-merges `local` over `global`.
///
/// Objects merge key by key; any other non-null `local` value replaces
/// the global one.
pub fn merge(global: &Value, local: &Value) -> Value {
    match (global, local) {
        (Value::Object(g), Value::Object(l)) => {
            let mut merged = g.clone();
            for (key, value) in l {
                let next = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (g, Value::Null) => g.clone(),
        (_, l) => l.clone(),
    }
}

/// Decodes a handler config; `null` decodes like `{}`.
pub fn decode<T: DeserializeOwned>(kind: HandlerKind, id: &str, config: &Value) -> DecisionResult<T> {
    let value = match config {
        Value::Null => Value::Object(Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value).map_err(|e| DecisionError::misconfigured(kind, id, e))
}
