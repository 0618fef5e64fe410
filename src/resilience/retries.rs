//! Bounded retries for transient upstream failures.
//!
//! # Design Decisions
//! - Only `DecisionError::is_transient` errors are retried
//! - The total time spent, including the next delay, never exceeds `give_up_after`

use serde::Deserialize;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::config::duration;
use crate::config::schema::RetryConfig;
use crate::pipeline::error::DecisionResult;
use crate::resilience::backoff::calculate_backoff;

/// Retry budget of one remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub give_up_after: Duration,
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            give_up_after: Duration::ZERO,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            give_up_after: Duration::from_millis(config.give_up_after_ms),
        }
    }

    /// Applies a per-handler `retry` block over this policy.
    pub fn with_overrides(mut self, overrides: &RetryOverrides) -> Self {
        if let Some(max_delay) = overrides.max_delay {
            self.max_delay = max_delay;
        }
        if let Some(give_up_after) = overrides.give_up_after {
            self.give_up_after = give_up_after;
        }
        self
    }
}

/// `retry` block of a handler configuration, e.g.
/// `{"max_delay": "300ms", "give_up_after": "2s"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryOverrides {
    #[serde(with = "duration::option")]
    pub max_delay: Option<Duration>,
    #[serde(with = "duration::option")]
    pub give_up_after: Option<Duration>,
}

/// Runs `op` until it succeeds, fails permanently or the budget is spent.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> DecisionResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DecisionResult<T>>,
{
    let started = Instant::now();
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                attempt += 1;
                let delay = calculate_backoff(attempt, policy.base_delay, policy.max_delay);
                if started.elapsed() + delay >= policy.give_up_after {
                    tracing::warn!(attempts = attempt, error = %err, "Giving up on upstream call");
                    return Err(err);
                }
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "Retrying upstream call");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::error::DecisionError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            give_up_after: Duration::from_millis(500),
        }
    }

    fn unavailable() -> DecisionError {
        DecisionError::UpstreamUnavailable {
            service: "svc".into(),
            reason: "connection refused".into(),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicUsize::new(0);
        let result = retry(&policy(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(unavailable())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: DecisionResult<()> = retry(&policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(DecisionError::forbidden("nope")) }
        })
        .await;
        assert!(matches!(result, Err(DecisionError::Forbidden { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = AtomicUsize::new(0);
        let started = Instant::now();
        let result: DecisionResult<()> = retry(&policy(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(unavailable()) }
        })
        .await;
        assert!(matches!(result, Err(DecisionError::UpstreamUnavailable { .. })));
        assert!(calls.load(Ordering::SeqCst) > 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_none_policy_never_waits() {
        assert_eq!(RetryPolicy::none().give_up_after, Duration::ZERO);
    }

    #[test]
    fn test_overrides_parse_humantime() {
        let overrides: RetryOverrides =
            serde_json::from_value(serde_json::json!({"max_delay": "300ms", "give_up_after": "2s"}))
                .unwrap();
        let policy = RetryPolicy::none().with_overrides(&overrides);
        assert_eq!(policy.max_delay, Duration::from_millis(300));
        assert_eq!(policy.give_up_after, Duration::from_secs(2));
    }
}
