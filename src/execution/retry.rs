//! Bounded Retry
//!
//! A retry combinator parameterized by attempt count and a fixed wait
//! between failed attempts. Used around every step's execute phase, in a
//! blocking form for synchronous flows and an awaiting form for async ones.

use std::future::Future;
use std::thread;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// How many times to attempt an operation and how long to wait in between.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (always at least 1)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between a failed attempt and the next one
    #[serde(
        rename = "wait_ms",
        default,
        serialize_with = "serialize_ms",
        deserialize_with = "deserialize_ms"
    )]
    pub wait: Duration,
}

fn default_max_attempts() -> u32 {
    1
}

fn serialize_ms<S: Serializer>(wait: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(wait.as_millis() as u64)
}

fn deserialize_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` below 1 is raised to 1.
    pub fn new(max_attempts: u32, wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            wait,
        }
    }

    /// A single attempt with no retry.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Effective attempt count, guarding against a zero deserialized value.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::once()
    }
}

/// The last error once every attempt has failed.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Runs `op` until it succeeds or the policy's attempts are used up,
/// sleeping the current thread between failures.
///
/// `op` receives the zero-based attempt index. Returns the value together
/// with the number of attempts it took.
pub fn retry_blocking<T, E, F>(policy: &RetryPolicy, mut op: F) -> Result<(T, u32), RetryExhausted<E>>
where
    F: FnMut(u32) -> Result<T, E>,
    E: std::fmt::Display,
{
    let max = policy.attempts();
    let mut attempt = 0;

    loop {
        match op(attempt) {
            Ok(value) => return Ok((value, attempt + 1)),
            Err(error) if attempt + 1 >= max => {
                return Err(RetryExhausted {
                    attempts: attempt + 1,
                    error,
                })
            }
            Err(error) => {
                debug!("Attempt {}/{} failed: {}", attempt + 1, max, error);
                if !policy.wait.is_zero() {
                    thread::sleep(policy.wait);
                }
                attempt += 1;
            }
        }
    }
}

/// Async counterpart of [`retry_blocking`]; waits with `tokio::time::sleep`.
pub async fn retry_async<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<(T, u32), RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max = policy.attempts();
    let mut attempt = 0;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok((value, attempt + 1)),
            Err(error) if attempt + 1 >= max => {
                return Err(RetryExhausted {
                    attempts: attempt + 1,
                    error,
                })
            }
            Err(error) => {
                debug!("Attempt {}/{} failed: {}", attempt + 1, max, error);
                if !policy.wait.is_zero() {
                    tokio::time::sleep(policy.wait).await;
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_success_first_try() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let result = retry_blocking(&policy, |_| Ok::<_, String>("ok"));
        assert_eq!(result.unwrap(), ("ok", 1));
    }

    #[test]
    fn test_succeeds_after_failures() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let result = retry_blocking(&policy, |attempt| {
            if attempt < 2 {
                Err(format!("fail {}", attempt))
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(result.unwrap(), (2, 3));
    }

    #[test]
    fn test_exhausted_reports_last_error() {
        let policy = RetryPolicy::new(4, Duration::ZERO);
        let mut calls = 0;
        let result: Result<((), u32), _> = retry_blocking(&policy, |attempt| {
            calls += 1;
            Err(format!("fail {}", attempt))
        });

        let exhausted = result.unwrap_err();
        assert_eq!(calls, 4);
        assert_eq!(exhausted.attempts, 4);
        assert_eq!(exhausted.error, "fail 3");
    }

    #[test]
    fn test_waits_between_attempts_only() {
        let policy = RetryPolicy::new(3, Duration::from_millis(30));
        let start = Instant::now();
        let _ = retry_blocking(&policy, |_| Err::<(), _>("nope"));
        let elapsed = start.elapsed();

        // Two waits for three attempts
        assert!(elapsed >= Duration::from_millis(60));
        assert!(elapsed < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_retry_async() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let result = retry_async(&policy, |attempt| async move {
            if attempt == 0 {
                Err("first")
            } else {
                Ok(attempt * 10)
            }
        })
        .await;
        assert_eq!(result.unwrap(), (10, 2));
    }

    #[test]
    fn test_policy_yaml_shape() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 3\nwait_ms: 250").unwrap();
        assert_eq!(policy, RetryPolicy::new(3, Duration::from_millis(250)));

        let defaulted: RetryPolicy = serde_yaml::from_str("{}").unwrap();
        assert_eq!(defaulted, RetryPolicy::once());
    }
}
