//! Decision engine metrics.
//!
//! # Metrics
//! - `gatekeeper_decisions_total` (counter): decisions by outcome and error class
//! - `gatekeeper_decision_duration_seconds` (histogram): pipeline latency
//! - `gatekeeper_rule_matches_total` (counter): match attempts by result
//! - `gatekeeper_cache_lookups_total` (counter): lookups by cache and result
//! - `gatekeeper_upstream_calls_total` (counter): remote calls by service and status
//! - `gatekeeper_rules_loaded` (gauge): valid and invalid rules held

use std::time::Duration;

use crate::pipeline::error::ErrorClass;

pub fn record_decision(outcome: Result<(), ErrorClass>, duration: Duration) {
    let (result, class) = match outcome {
        Ok(()) => ("allow", "none"),
        Err(class) => ("deny", class.name()),
    };
    metrics::counter!("gatekeeper_decisions_total", "result" => result, "class" => class)
        .increment(1);
    metrics::histogram!("gatekeeper_decision_duration_seconds", "result" => result)
        .record(duration.as_secs_f64());
}

/// `result` is one of `matched`, `no_match`, `invalid`, `ambiguous` or
/// `error`.
pub fn record_rule_match(result: &'static str) {
    metrics::counter!("gatekeeper_rule_matches_total", "result" => result).increment(1);
}

pub fn record_cache_lookup(cache: &str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!(
        "gatekeeper_cache_lookups_total",
        "cache" => cache.to_string(),
        "result" => result
    )
    .increment(1);
}

pub fn record_upstream_call(service: &str, status: Option<u16>) {
    let status = status.map_or_else(|| "error".to_string(), |s| s.to_string());
    metrics::counter!(
        "gatekeeper_upstream_calls_total",
        "service" => service.to_string(),
        "status" => status
    )
    .increment(1);
}

pub fn record_rules_loaded(valid: usize, invalid: usize) {
    metrics::gauge!("gatekeeper_rules_loaded", "state" => "valid").set(valid as f64);
    metrics::gauge!("gatekeeper_rules_loaded", "state" => "invalid").set(invalid as f64);
}
