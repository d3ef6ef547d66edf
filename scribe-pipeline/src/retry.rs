use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::context::RequestContext;
use crate::error::{PipelineError, PipelineResult, ProviderError};
use crate::result::Stage;

/// Retry configuration for one dependency. Immutable after startup and shared
/// read-only across calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (>= 1)
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Cap on the exponential backoff
    pub max_delay: Duration,
    /// Randomization applied to each delay, in [0, 1]
    pub jitter_fraction: f64,
    /// Classifier separating transient errors from permanent ones
    pub retryable: fn(&ProviderError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter_fraction: 0.2,
            retryable: ProviderError::is_retryable,
        }
    }
}

impl RetryPolicy {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.max_attempts == 0 {
            return Err(PipelineError::Config(
                "retry max_attempts must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(PipelineError::Config(
                "retry jitter_fraction must be within [0, 1]".to_string(),
            ));
        }
        if self.base_delay > self.max_delay {
            return Err(PipelineError::Config(
                "retry base_delay must not exceed max_delay".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff before retry number `attempt` (1-based):
    /// `min(base * 2^(attempt-1), max)` randomized by the jitter fraction.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let unjittered = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay);

        if self.jitter_fraction <= 0.0 {
            return unjittered;
        }

        let mut rng = rand::thread_rng();
        let scale: f64 = rng.gen_range(-self.jitter_fraction..=self.jitter_fraction);
        let adjusted = unjittered.as_secs_f64() * (1.0 + scale);
        Duration::from_secs_f64(adjusted.max(0.0))
    }
}

/// Wraps a single remote call with bounded retries, exponential backoff, a
/// circuit-breaker gate before each attempt, and deadline/cancellation-aware
/// suspension.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    /// Run `operation` until it succeeds, its error is classified permanent,
    /// attempts run out, the circuit opens, the stage deadline passes, or the
    /// request is cancelled.
    ///
    /// Each attempt receives the time left until `deadline` so the provider
    /// can bound its own I/O; the executor additionally enforces that bound.
    /// Attempt outcomes are reported to `breaker` either way.
    pub async fn execute<T, Op, Fut>(
        ctx: &RequestContext,
        policy: &RetryPolicy,
        breaker: &CircuitBreaker,
        stage: Stage,
        deadline: Instant,
        mut operation: Op,
    ) -> PipelineResult<T>
    where
        Op: FnMut(Duration) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt: u32 = 1;

        loop {
            if !breaker.allow() {
                return Err(PipelineError::CircuitOpen { stage });
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(PipelineError::DeadlineExceeded { stage });
            };

            let outcome = tokio::select! {
                _ = ctx.cancellation().cancelled() => {
                    return Err(PipelineError::Cancelled);
                }
                res = tokio::time::timeout(remaining, operation(remaining)) => res,
            };

            let error = match outcome {
                Ok(Ok(value)) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Ok(Err(err)) => err,
                Err(_elapsed) => ProviderError::Timeout,
            };

            breaker.record_failure();

            if !(policy.retryable)(&error) {
                return Err(PipelineError::NonRetryable {
                    stage,
                    cause: error,
                });
            }

            if attempt >= policy.max_attempts {
                warn!(
                    correlation_id = %ctx.correlation_id(),
                    stage = stage.as_str(),
                    attempts = attempt,
                    error = %error,
                    "retries exhausted"
                );
                return Err(PipelineError::RetriesExhausted {
                    stage,
                    cause: error,
                });
            }

            let delay = policy.delay_for(attempt);
            if Instant::now() + delay >= deadline {
                return Err(PipelineError::DeadlineExceeded { stage });
            }

            debug!(
                correlation_id = %ctx.correlation_id(),
                stage = stage.as_str(),
                attempt = attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, backing off"
            );

            tokio::select! {
                _ = ctx.cancellation().cancelled() => {
                    return Err(PipelineError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }
}
