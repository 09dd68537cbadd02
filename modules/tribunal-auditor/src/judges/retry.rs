//! Bounded retry around reviewer calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;
use tribunal_common::Config;

use crate::traits::{ReviewError, Sleeper};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base · 2^(attempt-1)`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never zero.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Adds up to this fraction of the delay at random. Ignored when a
    /// collaborator supplied its own retry-after.
    pub jitter: f64,
    /// Upper bound on a collaborator's retry-after hint.
    pub max_hint: Duration,
}

const DEFAULT_MAX_HINT: Duration = Duration::from_secs(60);

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                base: Duration::from_secs(2),
                max: Duration::from_secs(30),
            },
            jitter: 0.1,
            max_hint: DEFAULT_MAX_HINT,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        let base = Duration::from_millis(config.review_backoff_ms);
        Self {
            max_attempts: config.review_max_attempts.max(1),
            backoff: Backoff::Exponential {
                base,
                max: base.saturating_mul(16),
            },
            ..Default::default()
        }
    }

    /// No waiting, no jitter. For tests and local runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(Duration::ZERO),
            jitter: 0.0,
            max_hint: DEFAULT_MAX_HINT,
        }
    }

    /// Delay before retrying after failed attempt number `attempt` (1-based).
    /// A hint from the collaborator wins over the computed backoff, up to
    /// `max_hint`.
    pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_hint);
        }
        let delay = match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(max)
            }
        };
        if self.jitter > 0.0 && !delay.is_zero() {
            let extra = rand::rng().random_range(0.0..self.jitter);
            delay.mul_f64(1.0 + extra)
        } else {
            delay
        }
    }

    /// Run `call` until it succeeds or attempts run out. Every error kind is
    /// retried; the last one is returned.
    pub async fn run<T, F, Fut>(&self, sleeper: &dyn Sleeper, label: &str, mut call: F) -> Result<T, ReviewError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ReviewError>>,
    {
        let mut attempt = 1;
        loop {
            match call(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= self.max_attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_for(attempt, err.retry_after());
                    warn!(
                        call = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Reviewer call failed, retrying"
                    );
                    sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
