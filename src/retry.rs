//! Bounded exponential backoff for upstream calls.
//!
//! Default policy: base delay 1s, two retries (waits of 1s then 2s), so at
//! most three attempts. Each attempt is bounded by `attempt_timeout`; a
//! timeout counts as a failed attempt. After the last attempt the error is
//! returned to the caller, there is no further automatic retry.

use std::future::Future;
use std::time::Duration;

use anyhow::anyhow;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub max_retries: u32,
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: 2,
            attempt_timeout: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }

    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn with_attempt_timeout(mut self, d: Duration) -> Self {
        self.attempt_timeout = d;
        self
    }

    /// Delay before retry number `retry` (0-based): base * 2^retry.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

/// Run `op` until it succeeds or the retry budget is spent.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut retry: u32 = 0;
    loop {
        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(res) => res,
            Err(_) => Err(anyhow!(
                "{label}: timed out after {}ms",
                policy.attempt_timeout.as_millis()
            )),
        };

        match outcome {
            Ok(v) => return Ok(v),
            Err(e) if retry < policy.max_retries => {
                let delay = policy.delay_for(retry);
                warn!(
                    target: "retry",
                    label,
                    attempt = retry + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "upstream call failed, backing off"
                );
                tokio::time::sleep(delay).await;
                retry += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn default_delays_are_one_then_two_seconds() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(0), Duration::from_secs(1));
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.max_retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let started = tokio::time::Instant::now();
        let out = retry_with_backoff(&RetryPolicy::default(), "test", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(anyhow!("flaky"))
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff on the paused clock
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let res: anyhow::Result<()> = retry_with_backoff(&RetryPolicy::default(), "test", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(anyhow!("down"))
            }
        })
        .await;
        assert!(res.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let policy = RetryPolicy::default()
            .with_max_retries(0)
            .with_attempt_timeout(Duration::from_millis(50));
        let res: anyhow::Result<()> = retry_with_backoff(&policy, "slow", || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        })
        .await;
        assert!(res.unwrap_err().to_string().contains("timed out"));
    }
}
