//! Retry with configurable backoff, used by orchestrators above the engine.
//! The engine itself never retries a failed action.

use std::future::Future;
use std::time::Duration;

use filler_types::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed {
        #[serde(with = "millis")]
        delay: Duration,
    },
    /// Exponential backoff: base * 2^attempt, capped at max.
    Exponential {
        #[serde(with = "millis")]
        base: Duration,
        #[serde(with = "millis")]
        max: Duration,
    },
    /// Uniformly random delay in `[min, max]`.
    Jittered {
        #[serde(with = "millis")]
        min: Duration,
        #[serde(with = "millis")]
        max: Duration,
    },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed { delay } => *delay,
            BackoffPolicy::Exponential { base, max } => {
                let millis = base.as_millis() as u64 * 2u64.saturating_pow(attempt as u32);
                Duration::from_millis(millis).min(*max)
            }
            BackoffPolicy::Jittered { min, max } => {
                if max <= min {
                    return *min;
                }
                let ms = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
                Duration::from_millis(ms)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            base: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// Durations as integer milliseconds in config files.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Run `f` up to `max_retries + 1` times.
///
/// Only errors satisfying [`filler_types::FillerError::is_retryable`] are
/// retried; permanent ones return immediately. Between attempts the function
/// sleeps for the duration dictated by `policy`.
pub async fn execute_with_retry<T, F, Fut>(
    f: F,
    max_retries: usize,
    policy: &BackoffPolicy,
    label: &str,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    op = %label,
                    attempt,
                    delay_ms = %delay.as_millis(),
                    error = %e,
                    "Retryable error, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filler_types::FillerError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // 1. Success on first try
    #[tokio::test]
    async fn success_on_first_try() {
        let result = execute_with_retry(|| async { Ok(7) }, 3, &BackoffPolicy::None, "op").await;
        assert_eq!(result.unwrap(), 7);
    }

    // 2. Transient error succeeds on the second attempt
    #[tokio::test]
    async fn transient_error_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result = execute_with_retry(
            move || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(FillerError::Driver("socket closed".into()))
                    } else {
                        Ok("ok")
                    }
                }
            },
            1,
            &BackoffPolicy::None,
            "invite",
        )
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    // 3. Permanent error is never retried
    #[tokio::test]
    async fn permanent_error_returns_immediately() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<()> = execute_with_retry(
            move || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(FillerError::Portal("Password or username is incorrect".into()))
                }
            },
            5,
            &BackoffPolicy::None,
            "login",
        )
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    // 4. Exhausted retries return the last error
    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let result: Result<()> = execute_with_retry(
            move || {
                let c = c.clone();
                async move {
                    let n = c.fetch_add(1, Ordering::SeqCst);
                    Err(FillerError::Driver(format!("attempt {n}")))
                }
            },
            2,
            &BackoffPolicy::None,
            "op",
        )
        .await;
        assert_eq!(result.unwrap_err().to_string(), "Browser driver error: attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    // 5. Exponential backoff doubles and caps
    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            base: Duration::from_millis(100),
            max: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    // 6. Jittered delay stays within bounds
    #[test]
    fn jittered_backoff_within_bounds() {
        let policy = BackoffPolicy::Jittered {
            min: Duration::from_millis(1000),
            max: Duration::from_millis(5000),
        };
        for attempt in 0..50 {
            let d = policy.delay_for_attempt(attempt);
            assert!(d >= Duration::from_millis(1000) && d <= Duration::from_millis(5000));
        }
        let degenerate = BackoffPolicy::Jittered {
            min: Duration::from_millis(10),
            max: Duration::from_millis(10),
        };
        assert_eq!(degenerate.delay_for_attempt(0), Duration::from_millis(10));
    }

    // 7. Policies load from config
    #[test]
    fn policy_deserializes_from_millis() {
        let policy: BackoffPolicy =
            serde_json::from_str(r#"{"kind": "jittered", "min": 1000, "max": 5000}"#).unwrap();
        assert_eq!(
            policy,
            BackoffPolicy::Jittered {
                min: Duration::from_secs(1),
                max: Duration::from_secs(5)
            }
        );
        let fixed: BackoffPolicy = serde_json::from_str(r#"{"kind": "fixed", "delay": 250}"#).unwrap();
        assert_eq!(fixed.delay_for_attempt(9), Duration::from_millis(250));
    }
}
