use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::DiscoveryError;

/// Upper bound applied to server-provided `Retry-After` values
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Awaitable delay, swappable so backoff sequences can be observed in tests
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How one discovery attempt (all URL variants) ended when it did not succeed
#[derive(Debug, Clone)]
pub enum AttemptFailure {
    /// 429 from plex.tv, with the raw `Retry-After` header if any
    RateLimited {
        retry_after: Option<String>,
        message: String,
    },
    /// Every URL variant failed with a 5xx or a transport error
    Exhausted(DiscoveryError),
    /// Decisive failure (auth, 4xx, unparsable body), surfaced immediately
    Fatal(DiscoveryError),
}

/// Retry bounds for discovery requests
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after a 429 without a usable `Retry-After`
    pub default_delay: Duration,
    /// Delay after an attempt where every URL variant failed
    pub variant_backoff: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            default_delay: Duration::from_millis(2000),
            variant_backoff: Duration::from_millis(500),
        }
    }
}

impl RateLimitPolicy {
    /// Delay before the next attempt after a 429.
    ///
    /// A positive, finite `Retry-After` (in seconds, fractions allowed) wins;
    /// anything else falls back to `default_delay`.
    pub fn retry_after_delay(&self, retry_after: Option<&str>) -> Duration {
        let seconds = retry_after
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs > 0.0);

        match seconds {
            Some(secs) => {
                let millis = (secs * 1000.0).round() as u64;
                Duration::from_millis(millis).min(MAX_RETRY_AFTER)
            }
            None => self.default_delay,
        }
    }
}

/// Retry loop around the discovery fetch: honours 429 backoff and applies a
/// short fixed pause when every URL variant of an attempt failed.
#[derive(Clone)]
pub struct RateLimitController {
    policy: RateLimitPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimitController {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Run `f` (given the 1-based attempt number) until it succeeds, fails
    /// decisively, or the attempt budget is spent.
    pub async fn execute<F, Fut, T>(&self, operation_name: &str, mut f: F) -> Result<T, DiscoveryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, AttemptFailure>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                debug!(
                    "{}: Retry attempt {} of {}",
                    operation_name, attempt, max_attempts
                );
            }

            let delay = match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        debug!("{}: Succeeded on attempt {}", operation_name, attempt);
                    }
                    return Ok(result);
                }
                Err(AttemptFailure::Fatal(err)) => {
                    warn!("{}: Non-retryable error: {}", operation_name, err);
                    return Err(err);
                }
                Err(AttemptFailure::RateLimited {
                    retry_after,
                    message,
                }) => {
                    let delay = self.policy.retry_after_delay(retry_after.as_deref());
                    warn!(
                        "{}: Rate limited by plex.tv (Retry-After: {:?}) on attempt {}",
                        operation_name, retry_after, attempt
                    );
                    last_error = Some(DiscoveryError::RateLimited {
                        status: 429,
                        attempts: attempt,
                        message,
                    });
                    delay
                }
                Err(AttemptFailure::Exhausted(err)) => {
                    warn!(
                        "{}: All URL variants failed on attempt {}: {}",
                        operation_name, attempt, err
                    );
                    last_error = Some(err);
                    self.policy.variant_backoff
                }
            };

            if attempt < max_attempts {
                debug!(
                    "{}: Waiting {:?} before attempt {}",
                    operation_name,
                    delay,
                    attempt + 1
                );
                self.sleeper.sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| DiscoveryError::ServerUnreachable {
            status: None,
            message: format!("{}: all attempts failed", operation_name),
        }))
    }
}
