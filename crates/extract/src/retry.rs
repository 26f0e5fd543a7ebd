use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// Errors that know whether another attempt could succeed.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// The last error of a retried operation and how many attempts were made.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub attempts: usize,
    pub error: E,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_retries: usize, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
            jitter: true,
        }
    }

    /// No sleeping between attempts. Meant for tests and local stubs.
    pub fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Retry a future with exponential backoff. Only transient errors are
    /// retried; anything else fails on the spot.
    pub async fn retry<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> Result<T, RetryFailure<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display + Transient,
    {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_transient() {
                        return Err(RetryFailure { attempts: attempt, error: e });
                    }
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(RetryFailure { attempts: attempt, error: e });
                    }

                    let delay = self.jittered(backoff);
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = delay.as_millis(),
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(delay).await;

                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }

    fn jittered(&self, backoff: Duration) -> Duration {
        if !self.jitter || backoff.is_zero() {
            return backoff;
        }
        let factor: f64 = rand::thread_rng().gen_range(0.5..1.5);
        backoff.mul_f64(factor).min(self.max_backoff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Flaky(bool);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.0)
        }
    }

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicUsize::new(0);
        let result = RetryPolicy::immediate(3)
            .retry("op", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Flaky(true))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_capped() {
        let calls = AtomicUsize::new(0);
        let failure = RetryPolicy::immediate(2)
            .retry("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Flaky(true))
            })
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let failure = RetryPolicy::immediate(5)
            .retry("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Flaky(false))
            })
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backoff_is_bounded() {
        let policy = RetryPolicy::new(4, 2, 5);
        let started = std::time::Instant::now();
        let failure = policy
            .retry("op", || async { Err::<(), _>(Flaky(true)) })
            .await
            .unwrap_err();

        assert_eq!(failure.attempts, 5);
        // four sleeps, each at most max_backoff, plus scheduling slack
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
