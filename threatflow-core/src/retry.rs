use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{BackendError, PipelineError};

/// Bounded retry used when establishing backend connections at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_retries: u32,
    /// Fixed pause between two attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Policy making `max_retries` attempts, `retry_delay` apart.
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Runs `attempt` until it succeeds or the policy is exhausted.
    ///
    /// Returns [`PipelineError::Cancelled`] if `shutdown` fires while waiting
    /// between attempts.
    pub async fn run<T, F, Fut>(
        &self,
        backend: &'static str,
        shutdown: &CancellationToken,
        mut attempt: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let attempts = self.max_retries.max(1);
        let mut tries = 0;

        loop {
            tries += 1;
            match attempt().await {
                Ok(value) => {
                    info!(backend, attempt = tries, "connected");
                    return Ok(value);
                }
                Err(err) if tries >= attempts => {
                    error!(
                        backend,
                        attempts = tries,
                        error = %err,
                        "giving up on connection"
                    );
                    return Err(PipelineError::Connection {
                        backend,
                        attempts: tries,
                        source: err,
                    });
                }
                Err(err) => {
                    warn!(
                        backend,
                        attempt = tries,
                        retry_in = ?self.retry_delay,
                        error = %err,
                        "connection attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            info!(backend, "shutdown requested while reconnecting");
                            return Err(PipelineError::Cancelled);
                        }
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let started = tokio::time::Instant::now();

        let value = policy
            .run("splunk", &CancellationToken::new(), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BackendError::Other("refused".into()))
                } else {
                    Ok(7)
                }
            })
            .await
            .unwrap();

        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausting_attempts_is_a_connection_error() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(1));

        let err = policy
            .run("thehive", &CancellationToken::new(), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(BackendError::Other("refused".into()))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            PipelineError::Connection {
                backend, attempts, ..
            } => {
                assert_eq!(backend, "thehive");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_the_retry_delay() {
        let calls = &AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(30));
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = policy
            .run("splunk", &shutdown, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(BackendError::Other("refused".into()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(started.elapsed(), Duration::from_secs(10));
    }
}
