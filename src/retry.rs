//! Retry with jittered backoff.

use log::debug;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// How many times to try an action and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: usize,
    /// Lower bound of the random wait between attempts.
    pub min_wait: Duration,
    /// Upper bound of the random wait between attempts.
    pub max_wait: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: usize, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            attempts,
            min_wait,
            max_wait,
        }
    }

    /// A random wait within `[min_wait, max_wait]`.
    pub fn jitter(&self) -> Duration {
        if self.max_wait <= self.min_wait {
            return self.min_wait;
        }
        rand::rng().random_range(self.min_wait..=self.max_wait)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1), Duration::from_secs(3))
    }
}

/// Run `action` until it succeeds or `policy.attempts` runs out.
///
/// Waits a random jitter between attempts. When every attempt fails the last
/// error is returned unchanged. At least one attempt is always made.
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, mut action: F) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match action(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                let wait = policy.jitter();
                debug!(
                    "attempt {}/{} failed: {}; retrying in {:?}",
                    attempt, attempts, err, wait
                );
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn instant_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<usize, String> = retry(&instant_policy(5), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(format!("boom {attempt}"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn reraises_last_error_after_ceiling() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry(&instant_policy(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Err(format!("boom {attempt}")) }
        })
        .await;
        assert_eq!(result, Err("boom 3".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicUsize::new(0);
        let _: Result<(), &str> = retry(&instant_policy(0), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("nope") }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_within_jitter_bounds() {
        let policy = RetryPolicy::new(2, Duration::from_secs(1), Duration::from_secs(3));
        let start = tokio::time::Instant::now();
        let _: Result<(), &str> = retry(&policy, |_| async { Err("nope") }).await;
        let waited = start.elapsed();
        assert!(waited >= Duration::from_secs(1));
        assert!(waited <= Duration::from_secs(3) + Duration::from_millis(10));
    }

    #[test]
    fn jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let wait = policy.jitter();
            assert!(wait >= policy.min_wait && wait <= policy.max_wait);
        }
    }
}
