//! Retry with exponential backoff and jitter.
//!
//! Jitter is always applied (configurable, `jitter_ms(0)` to disable) so
//! that many callers retrying the same dependency do not synchronize into
//! a thundering herd.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{ErrorCode, OpsKitError, Result};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, first call included. Default: 3
    pub max_attempts: u32,

    /// Base delay in milliseconds. Default: 1000
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds. Default: 30000
    pub max_delay_ms: u64,

    /// Backoff multiplier. Default: 2.0
    pub backoff_multiplier: f64,

    /// Maximum jitter in milliseconds (random 0-jitter added). Default: 100
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter_ms: 100,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Reject configurations that would never make progress.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidThreshold,
                "max_attempts must be at least 1",
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err(OpsKitError::config_error(
                ErrorCode::ConfigInvalidMultiplier,
                "backoff_multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Backoff delay for a given attempt number (1-based).
    ///
    /// `min(base_delay * multiplier^(attempt-1), max_delay)` plus uniform
    /// random jitter in `[0, jitter_ms)`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponential =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);
        let capped = exponential.min(self.max_delay_ms as f64);
        let jitter = rand::random::<f64>() * self.jitter_ms as f64;

        Duration::from_millis((capped + jitter) as u64)
    }
}

/// Builder for RetryConfig.
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    max_attempts: Option<u32>,
    base_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    backoff_multiplier: Option<f64>,
    jitter_ms: Option<u64>,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = Some(delay);
        self
    }

    pub fn max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = Some(multiplier);
        self
    }

    pub fn jitter_ms(mut self, jitter: u64) -> Self {
        self.jitter_ms = Some(jitter);
        self
    }

    pub fn build(self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts.unwrap_or(3),
            base_delay_ms: self.base_delay_ms.unwrap_or(1000),
            max_delay_ms: self.max_delay_ms.unwrap_or(30000),
            backoff_multiplier: self.backoff_multiplier.unwrap_or(2.0),
            jitter_ms: self.jitter_ms.unwrap_or(100),
        }
    }
}

/// Default retry classifier: only transient failure codes are retried.
pub fn is_retryable(error: &OpsKitError) -> bool {
    matches!(
        error.code,
        ErrorCode::Timeout
            | ErrorCode::ConnectionFailed
            | ErrorCode::Unavailable
            | ErrorCode::RateLimited
    )
}

/// Execute an async operation, retrying transient failures.
///
/// Exhausting all attempts returns the last observed error unchanged.
pub async fn with_retry<T, F, Fut>(operation: F, config: &RetryConfig) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_predicate(operation, config, is_retryable).await
}

/// Execute an async operation with a caller-supplied retry predicate.
pub async fn with_retry_predicate<T, F, Fut, P>(
    operation: F,
    config: &RetryConfig,
    should_retry: P,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
    P: Fn(&OpsKitError) -> bool,
{
    let mut last_error: Option<OpsKitError> = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !should_retry(&e) {
                    return Err(e);
                }

                last_error = Some(e);

                if attempt < config.max_attempts {
                    let delay = config.calculate_delay(attempt);
                    tracing::debug!(
                        attempt,
                        max_attempts = config.max_attempts,
                        ?delay,
                        "retrying after failure"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        OpsKitError::new(
            ErrorCode::RetryExhausted,
            "Maximum retry attempts exceeded",
        )
    }))
}

/// Outcome of a retried operation, with attempt metadata.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub value: Option<T>,
    pub error: Option<OpsKitError>,
    pub attempts: u32,
    pub success: bool,
}

impl<T> RetryOutcome<T> {
    pub fn ok(value: T, attempts: u32) -> Self {
        Self {
            value: Some(value),
            error: None,
            attempts,
            success: true,
        }
    }

    pub fn err(error: OpsKitError, attempts: u32) -> Self {
        Self {
            value: None,
            error: Some(error),
            attempts,
            success: false,
        }
    }

    pub fn into_result(self) -> Result<T> {
        if self.success {
            Ok(self.value.expect("Success outcome must have a value"))
        } else {
            Err(self.error.expect("Failed outcome must have an error"))
        }
    }
}

/// Like [`with_retry`], but reports how many attempts were made.
pub async fn with_retry_detailed<T, F, Fut>(operation: F, config: &RetryConfig) -> RetryOutcome<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error: Option<OpsKitError> = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(result) => return RetryOutcome::ok(result, attempt),
            Err(e) => {
                if !is_retryable(&e) {
                    return RetryOutcome::err(e, attempt);
                }

                last_error = Some(e);

                if attempt < config.max_attempts {
                    sleep(config.calculate_delay(attempt)).await;
                }
            }
        }
    }

    RetryOutcome::err(
        last_error.unwrap_or_else(|| {
            OpsKitError::new(
                ErrorCode::RetryExhausted,
                "Maximum retry attempts exceeded",
            )
        }),
        config.max_attempts,
    )
}
