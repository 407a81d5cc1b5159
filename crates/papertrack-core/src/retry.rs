//! Retry with exponential backoff for collaborator calls.
//!
//! The loop is split into a pure state machine ([`RetryState`]) that decides
//! what each attempt's result means, and an executor ([`Retrier`]) that runs
//! attempts and applies the chosen delay through an injected [`Sleeper`].

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{ErrorKind, StageError};
use crate::model::StageResult;
use crate::shutdown::Shutdown;

/// Granularity of interruptible sleeps
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Backoff policy for one collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one (>= 1)
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Growth factor per retry (>= 1.0)
    pub backoff_multiplier: f64,
    pub retryable: Vec<ErrorKind>,
}

impl RetryPolicy {
    pub fn new(
        max_attempts: u32,
        base_delay: Duration,
        backoff_multiplier: f64,
        retryable: impl IntoIterator<Item = ErrorKind>,
    ) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_multiplier,
            retryable: retryable.into_iter().collect(),
        }
    }

    /// Single attempt, nothing retried
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, 1.0, [])
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err(format!("max_attempts must be >= 1, got {}", self.max_attempts));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(format!(
                "backoff_multiplier must be >= 1, got {}",
                self.backoff_multiplier
            ));
        }
        Ok(())
    }

    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        self.retryable.contains(&kind)
    }

    /// Exponential backoff after failed attempt `attempt` (1-based):
    /// `base_delay * backoff_multiplier^(attempt-1)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.powi(exp);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Delay before the next attempt. A server-advised wait on a rate-limit
    /// error wins when it is longer than the computed backoff.
    pub fn delay_for(&self, attempt: u32, error: &StageError) -> Duration {
        let computed = self.backoff_delay(attempt);
        match (error.kind, error.retry_after) {
            (ErrorKind::RateLimited, Some(advised)) => computed.max(advised),
            _ => computed,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(
            3,
            Duration::from_secs(2),
            2.0,
            [
                ErrorKind::NetworkUnreachable,
                ErrorKind::Timeout,
                ErrorKind::RateLimited,
                ErrorKind::ServiceUnavailable,
            ],
        )
    }
}

/// Attempt counter for one retry sequence.
#[derive(Debug)]
pub struct RetryState<'p> {
    policy: &'p RetryPolicy,
    attempt: u32,
}

impl<'p> RetryState<'p> {
    pub fn new(policy: &'p RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Start the next attempt, returning its 1-based number
    pub fn begin(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Classify the current attempt's result.
    ///
    /// Retryable failures with budget left become `RecoverableFailure`;
    /// everything else that failed becomes `FatalFailure` with the attempt count.
    pub fn settle<T>(&self, result: Result<T, StageError>) -> StageResult<T> {
        match result {
            Ok(v) => StageResult::Success(v),
            Err(error)
                if self.policy.is_retryable(error.kind)
                    && self.attempt < self.policy.max_attempts =>
            {
                StageResult::RecoverableFailure {
                    error,
                    attempt: self.attempt,
                }
            }
            Err(error) => StageResult::FatalFailure {
                error,
                attempts: self.attempt,
            },
        }
    }

    /// Delay to apply after a recoverable failure of the current attempt
    pub fn delay_after(&self, error: &StageError) -> Duration {
        self.policy.delay_for(self.attempt, error)
    }
}

/// Sleep capability, injected so backoff is testable without wall-clock waits.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Real sleeper; wakes early when shutdown is requested.
#[derive(Debug, Clone)]
pub struct ThreadSleeper {
    shutdown: Shutdown,
}

impl ThreadSleeper {
    pub fn new(shutdown: Shutdown) -> Self {
        Self { shutdown }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        let mut remaining = duration;
        while !remaining.is_zero() && !self.shutdown.is_requested() {
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
    }
}

/// Sleeper that returns immediately and records requested durations.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slept(&self) -> Vec<Duration> {
        self.slept.lock().expect("sleeper mutex poisoned").clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.slept
            .lock()
            .expect("sleeper mutex poisoned")
            .push(duration);
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct Execution<T> {
    /// `Success` or `FatalFailure`; never `RecoverableFailure`
    pub result: StageResult<T>,
    pub attempts: u32,
}

/// Runs fallible operations under a retry policy.
#[derive(Clone)]
pub struct Retrier {
    sleeper: Arc<dyn Sleeper>,
    shutdown: Shutdown,
}

impl std::fmt::Debug for Retrier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retrier").finish_non_exhaustive()
    }
}

impl Retrier {
    pub fn new(sleeper: Arc<dyn Sleeper>, shutdown: Shutdown) -> Self {
        Self { sleeper, shutdown }
    }

    /// Real-time retrier sharing the given shutdown flag
    pub fn threaded(shutdown: Shutdown) -> Self {
        Self::new(Arc::new(ThreadSleeper::new(shutdown.clone())), shutdown)
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    /// Run `op` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// Shutdown observed before an attempt ends the sequence with an
    /// `interrupted` fatal failure.
    pub fn execute<T>(
        &self,
        label: &str,
        policy: &RetryPolicy,
        mut op: impl FnMut() -> Result<T, StageError>,
    ) -> Execution<T> {
        let mut state = RetryState::new(policy);
        loop {
            if self.shutdown.is_requested() {
                return Execution {
                    result: StageResult::FatalFailure {
                        error: StageError::interrupted(),
                        attempts: state.attempts(),
                    },
                    attempts: state.attempts(),
                };
            }

            let attempt = state.begin();
            match state.settle(op()) {
                StageResult::Success(v) => {
                    if attempt > 1 {
                        log::info!("{label}: succeeded on attempt {attempt}/{}", policy.max_attempts);
                    } else {
                        log::debug!("{label}: attempt {attempt}/{} ok", policy.max_attempts);
                    }
                    return Execution {
                        result: StageResult::Success(v),
                        attempts: attempt,
                    };
                }
                StageResult::RecoverableFailure { error, attempt } => {
                    let delay = state.delay_after(&error);
                    log::warn!(
                        "{label}: attempt {attempt}/{} failed: {error}, retrying in {:.1}s",
                        policy.max_attempts,
                        delay.as_secs_f64()
                    );
                    self.sleeper.sleep(delay);
                }
                StageResult::FatalFailure { error, attempts } => {
                    log::debug!(
                        "{label}: attempt {attempt}/{} failed permanently: {error}",
                        policy.max_attempts
                    );
                    return Execution {
                        result: StageResult::FatalFailure { error, attempts },
                        attempts,
                    };
                }
            }
        }
    }
}
