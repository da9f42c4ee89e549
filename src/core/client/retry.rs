use std::time::Duration;

use super::constants::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY, DEFAULT_RETRY_STATUS_CODES,
};
use crate::core::config::EffectiveConfig;
use crate::core::error::FetchError;
use crate::core::transport::TransportErrorKind;

/// Configuration for the automatic retry mechanism.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// The maximum number of retries. The total number of transport calls is `attempts + 1`.
    pub attempts: u32,
    /// Delay before the first retry.
    pub delay: Duration,
    /// Ceiling for any single delay. `None` leaves the delay unbounded.
    pub max_delay: Option<Duration>,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_factor: f64,
    /// HTTP status codes that should trigger a retry.
    pub status_codes: Vec<u16>,
    /// Whether a timed-out attempt is retried. Timeouts carry no status, so without
    /// this flag they are terminal.
    pub retry_on_timeout: bool,
    /// Whether connection failures and mid-flight aborts reported by the transport are retried.
    pub retry_on_connect: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            max_delay: None,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            status_codes: DEFAULT_RETRY_STATUS_CODES.to_vec(),
            retry_on_timeout: false,
            retry_on_connect: true,
        }
    }
}

/// Whether `error` may be retried under the retry settings in `config`.
///
/// Attempt counting is the caller's job; this only classifies the failure.
pub fn should_retry(error: &FetchError, config: &EffectiveConfig) -> bool {
    let Some(retry) = config.retry.as_ref() else {
        return false;
    };
    // any failure that kept a response (status validation, response interceptors)
    if let Some(status) = error.status() {
        return retry.status_codes.contains(&status);
    }
    match error {
        FetchError::Timeout { .. } => retry.retry_on_timeout,
        FetchError::Transport { kind, .. } => {
            retry.retry_on_connect
                && matches!(kind, TransportErrorKind::Connect | TransportErrorKind::Aborted)
        }
        _ => false,
    }
}

/// Delay before retry number `attempt` (zero-based): `min(delay * factor^attempt, max_delay)`.
pub fn next_delay(attempt: u32, retry: &RetryConfig) -> Duration {
    let factor = retry.backoff_factor.max(0.0);
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let millis = retry.delay.as_millis() as f64 * factor.powi(exponent);
    // float-to-int casts saturate, so overflow lands on u64::MAX and NaN on zero
    let delay = Duration::from_millis(millis.round() as u64);
    match retry.max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Like [`next_delay`], but reads the retry settings from an effective configuration.
///
/// # Errors
/// Returns `ERETRYCONFIG` if the configuration carries no retry settings.
pub fn retry_delay(config: &EffectiveConfig, attempt: u32) -> Result<Duration, FetchError> {
    match config.retry.as_ref() {
        Some(retry) => Ok(next_delay(attempt, retry)),
        None => Err(FetchError::RetryConfig {
            config: Box::new(config.clone()),
        }),
    }
}
