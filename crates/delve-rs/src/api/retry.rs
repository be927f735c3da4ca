//! Automatic retry with exponential backoff.
//!
//! Every remote call in the crate (model generation and web search) goes
//! through [`Resilient::call`]. Rate limits and transient failures (5xx,
//! network errors, malformed provider responses) are retried on the
//! schedule described by [`RetryConfig`]; fatal failures such as rejected
//! credentials fail immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::CallError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retries (0 = no retries, just fail immediately).
    pub max_retries: u32,
    /// Initial delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 doubles the delay each attempt).
    pub multiplier: f64,
    /// Whether to shorten delays with deterministic jitter.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a config with the given number of retries. Uses the default schedule.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// A config that never retries.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        if self.jitter {
            // Deterministic jitter keyed on the attempt number; avoids pulling
            // in an RNG for a handful of multipliers.
            let jitter_factor = match attempt % 4 {
                0 => 0.75,
                1 => 0.90,
                2 => 0.60,
                _ => 0.85,
            };
            Duration::from_secs_f64(capped * jitter_factor)
        } else {
            Duration::from_secs_f64(capped)
        }
    }
}

/// Executes remote calls under a [`RetryConfig`].
///
/// Cheap to clone; holds no connection state of its own.
#[derive(Debug, Clone, Default)]
pub struct Resilient {
    config: RetryConfig,
}

impl Resilient {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `call` until it succeeds, fails fatally, or retries run out.
    ///
    /// `label` names the call in log output. After the last retry a rate
    /// limit surfaces as [`CallError::RateLimitExhausted`] and any other
    /// retryable failure as [`CallError::Exhausted`].
    pub async fn call<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T, CallError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut attempt = 0;
        loop {
            let err = match call().await {
                Ok(v) => return Ok(v),
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }

            if attempt >= self.config.max_retries {
                let attempts = attempt + 1;
                warn!("{label}: giving up after {attempts} attempt(s): {err}");
                return Err(if err.is_rate_limit() {
                    CallError::RateLimitExhausted { attempts }
                } else {
                    CallError::Exhausted {
                        attempts,
                        last: err.to_string(),
                    }
                });
            }

            let delay = self.config.delay_for_attempt(attempt);
            warn!(
                "{label}: {err} (attempt {}/{}). Retrying in {delay:?}...",
                attempt + 1,
                self.config.max_retries + 1,
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
