//! Retries for model calls that failed for reasons worth waiting out.
//!
//! Rate limits, gateway errors and dropped connections
//! ([`ModelError::is_transient`]) are retried after a growing pause. Any
//! other error goes straight back to the turn loop, which has its own
//! recovery.

use super::model::ModelError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times, and how patiently, a model call is repeated.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first. Zero disables retrying.
    pub max_retries: u32,
    /// Pause before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single pause.
    pub max_delay: Duration,
    /// Growth of the pause from one retry to the next.
    pub backoff_factor: f64,
    /// Shorten each pause by a varying amount so concurrent turns that
    /// failed together do not retry together.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default pacing with `retries` extra attempts.
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Pause before retry number `attempt` (counting from zero).
    ///
    /// `base_delay * backoff_factor^attempt`, capped at `max_delay`. With
    /// jitter the pause is cut by 10% to 40%, cycling with the attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let grown = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let pause = grown.min(self.max_delay.as_secs_f64());
        let scale = if self.jitter {
            1.0 - 0.1 * f64::from(attempt % 4 + 1)
        } else {
            1.0
        };
        Duration::from_secs_f64(pause * scale)
    }
}

/// Run `call`, retrying transient failures according to `config`.
pub async fn retry_model_call<T, F, Fut>(
    config: &RetryConfig,
    mut call: F,
) -> Result<T, ModelError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < config.max_retries && e.is_transient() => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "Transient model error (attempt {}/{}): {e}. Retrying in {delay:?}...",
                    attempt + 1,
                    config.max_retries,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
