//! Deadlines for remote calls.

use std::future::Future;
use std::time::Duration;

use crate::pipeline::error::{DecisionError, DecisionResult};

/// Runs `fut` with a deadline; elapsed maps to `UpstreamTimeout { service }`.
pub async fn with_timeout<T, F>(duration: Duration, service: &str, fut: F) -> DecisionResult<T>
where
    F: Future<Output = DecisionResult<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(service, timeout_ms = duration.as_millis() as u64, "Call timed out");
            Err(DecisionError::UpstreamTimeout {
                service: service.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fast_future_completes() {
        let result = with_timeout(Duration::from_secs(1), "svc", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_slow_future_times_out() {
        let result: DecisionResult<()> = with_timeout(Duration::from_millis(20), "svc", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(DecisionError::UpstreamTimeout { service }) if service == "svc"));
    }
}
