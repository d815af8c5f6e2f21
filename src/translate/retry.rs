use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Constant-backoff retry budget for completion calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// budget is spent.
    ///
    /// A schema violation that survives every attempt becomes
    /// [`Error::ExhaustedRetries`]; a collaborator failure is returned as is.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let attempts = self.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("{}: attempt {}/{} in flight", label, attempt, attempts);
            let err = match op(attempt).await {
                Ok(value) => {
                    debug!("{}: validated on attempt {}", label, attempt);
                    return Ok(value);
                }
                Err(err) => err,
            };
            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= attempts {
                return Err(match err {
                    Error::CollaboratorFailure { .. } => err,
                    other => Error::ExhaustedRetries {
                        attempts,
                        last: Box::new(other),
                    },
                });
            }
            warn!(
                "{}: {} (attempt {}/{}); retrying in {}ms",
                label,
                err,
                attempt,
                attempts,
                self.backoff.as_millis()
            );
            sleep(self.backoff).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quick(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_violations() {
        let calls = AtomicUsize::new(0);
        let value = quick(4)
            .run("test", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(Error::schema("missing id"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .expect("retry");
        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn schema_violations_exhaust_the_budget() {
        let calls = AtomicUsize::new(0);
        let err = quick(4)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::schema("invalid id")) }
            })
            .await
            .expect_err("must fail");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(matches!(err, Error::ExhaustedRetries { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn collaborator_failure_surfaces_as_itself() {
        let err = quick(1)
            .run("test", |_| async {
                Err::<(), _>(Error::collaborator("provider", anyhow!("503")))
            })
            .await
            .expect_err("must fail");
        assert!(matches!(err, Error::CollaboratorFailure { .. }));
    }

    #[tokio::test]
    async fn invalid_input_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let err = quick(4)
            .run("test", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Error::invalid_input("empty")) }
            })
            .await
            .expect_err("must fail");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
