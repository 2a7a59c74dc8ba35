//! Retry policy with configurable backoff and jitter strategies.
//!
//! Wraps one collaborator operation: every attempt runs under a deadline,
//! is recorded as an [`AttemptRecord`], and only retryable failures are
//! attempted again. Exhausting the ceiling converts the last failure to
//! terminal.

use crate::core::{AttemptRecord, OutcomeError, StageKind};
use crate::errors::{CollaboratorError, ErrorClass};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy applied to each computed delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter
    None,
    /// Random from 0 to delay
    #[default]
    Full,
    /// Half fixed, half random
    Equal,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempt ceiling, including the first attempt.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff_strategy: BackoffStrategy,
    /// Jitter strategy.
    pub jitter_strategy: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            backoff_strategy: BackoffStrategy::Exponential,
            jitter_strategy: JitterStrategy::Full,
        }
    }
}

impl RetryConfig {
    /// Creates a new retry config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the attempt ceiling.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter_strategy = strategy;
        self
    }

    /// Computes the delay before the retry following failed attempt `retry`
    /// (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.base_delay_ms;
        let max = self.max_delay_ms;

        let delay = match self.backoff_strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(retry)).min(max),
            BackoffStrategy::Linear => base.saturating_mul(u64::from(retry) + 1).min(max),
            BackoffStrategy::Constant => base.min(max),
        };

        let jittered = match self.jitter_strategy {
            JitterStrategy::None => delay,
            JitterStrategy::Full => {
                if delay == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=delay)
                }
            }
            JitterStrategy::Equal => {
                let half = delay / 2;
                if half == 0 {
                    delay
                } else {
                    half + rand::thread_rng().gen_range(0..=half)
                }
            }
        };

        Duration::from_millis(jittered)
    }
}

/// Result of running an operation under the policy.
#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    /// The final result. Failures here are always terminal or the last
    /// retryable error converted to terminal.
    pub result: Result<T, CollaboratorError>,
    /// One entry per attempt made, in order.
    pub attempts: Vec<AttemptRecord>,
}

impl<T> RetryOutcome<T> {
    /// Number of attempts made.
    #[must_use]
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }
}

/// Bounded retry around collaborator calls.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Creates a policy from its configuration.
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Runs `operation` until it succeeds, fails terminally, or the attempt
    /// ceiling is reached.
    ///
    /// Each attempt is bounded by `deadline`; an elapsed deadline counts as a
    /// retryable failure.
    pub async fn run<T, F, Fut>(
        &self,
        stage: StageKind,
        operation: &str,
        deadline: Duration,
        mut attempt_fn: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let ceiling = self.config.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let started = Instant::now();
            let result = match tokio::time::timeout(deadline, attempt_fn()).await {
                Ok(result) => result,
                Err(_) => Err(CollaboratorError::timeout(deadline.as_millis())),
            };

            attempts.push(AttemptRecord {
                stage,
                operation: operation.to_string(),
                attempt,
                succeeded: result.is_ok(),
                error: result.as_ref().err().map(OutcomeError::from),
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                at: Utc::now(),
            });

            let error = match result {
                Ok(value) => {
                    return RetryOutcome {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!(%stage, operation, attempt, error = %error, "Terminal collaborator failure");
                return RetryOutcome {
                    result: Err(error),
                    attempts,
                };
            }

            if attempt >= ceiling {
                warn!(%stage, operation, attempts = attempt, error = %error, "Retry ceiling reached");
                let exhausted = CollaboratorError {
                    class: ErrorClass::Terminal,
                    message: format!("gave up after {attempt} attempts: {}", error.message),
                };
                return RetryOutcome {
                    result: Err(exhausted),
                    attempts,
                };
            }

            let delay = self.config.delay_for(attempt - 1);
            debug!(
                %stage,
                operation,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Retrying after error"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
