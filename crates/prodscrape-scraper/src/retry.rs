//! Bounded exponential backoff with jitter around single-attempt fetches.
//!
//! Only [`FetchOutcome::Transient`] is retried. Success and permanent
//! failures return after the attempt that produced them.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::fetch::FetchOutcome;
use crate::Cancelled;

/// Ceiling for the exponential part of a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

/// Bookkeeping for one [`RetryPolicy::run`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryState {
    pub attempts: u32,
    /// Total time slept between attempts, jitter included.
    pub backoff: Duration,
    pub last_failure: Option<String>,
}

/// Terminal outcome of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retried {
    pub outcome: FetchOutcome,
    pub state: RetryState,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Deterministic part of the sleep after failed attempt number `attempt`
    /// (1-based): `base_delay * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`].
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }

    /// Uniform in `[0, base_delay)`.
    fn jitter(&self) -> Duration {
        self.base_delay.mul_f64(rand::random::<f64>())
    }

    /// Runs `operation` until it succeeds, fails permanently, or the attempt
    /// budget is spent. An exhausted budget returns the last transient
    /// failure unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if `cancel` fires while an attempt is in flight
    /// or during a backoff sleep. The in-flight attempt is dropped.
    pub async fn run<F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<Retried, Cancelled>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        let mut state = RetryState::default();

        loop {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }

            state.attempts += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Cancelled),
                outcome = operation() => outcome,
            };

            if let Some(reason) = outcome.reason() {
                state.last_failure = Some(reason.to_owned());
            }
            if !outcome.is_transient() {
                return Ok(Retried { outcome, state });
            }

            if state.attempts >= self.max_attempts {
                tracing::warn!(
                    attempts = state.attempts,
                    error = state.last_failure.as_deref().unwrap_or_default(),
                    "transient fetch failure, attempt budget exhausted"
                );
                return Ok(Retried { outcome, state });
            }

            let delay = self.backoff_for(state.attempts) + self.jitter();
            tracing::warn!(
                attempt = state.attempts,
                max_attempts = self.max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = state.last_failure.as_deref().unwrap_or_default(),
                "transient fetch failure, retrying after backoff"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
            state.backoff += delay;
        }
    }
}
