use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

// ============================================================================
// Exponential Backoff for Transient Store Failures
// ============================================================================
//
// Only errors that report themselves as transient (timeouts, lost
// connections) are retried. Business failures such as an illegal transition
// return on the first attempt, since retrying cannot change the outcome.
//
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let scaled = Duration::from_millis((current.as_millis() as f64 * self.multiplier) as u64);
        scaled.min(self.max_delay)
    }
}

/// Whether an error may succeed if the same call is repeated unchanged.
pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    /// Still failing after at least one retry
    Exhausted { error: E, attempts: u32 },
    /// Failed with an error that retrying would not fix
    Permanent(E),
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => *attempts,
            RetryOutcome::Permanent(_) => 1,
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Exhausted { error, .. } | RetryOutcome::Permanent(error) => Err(error),
        }
    }
}

/// Run `operation` until it succeeds, fails permanently, or attempts run out.
pub async fn retry_on_transient<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsTransient,
{
    let max_attempts = config.max_attempts.max(1);
    let mut delay = config.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return RetryOutcome::Succeeded { value, attempts: attempt };
            }
            Err(error) => error,
        };

        if !error.is_transient() {
            if attempt > 1 {
                return RetryOutcome::Exhausted { error, attempts: attempt };
            }
            return RetryOutcome::Permanent(error);
        }

        if attempt >= max_attempts {
            tracing::error!(attempt, error = %error, "Transient failure persisted after all attempts");
            return RetryOutcome::Exhausted { error, attempts: attempt };
        }

        tracing::warn!(
            attempt,
            error = %error,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying after delay"
        );

        sleep(delay).await;
        delay = config.next_delay(delay);
    }
}
