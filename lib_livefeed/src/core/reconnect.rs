//! # Reconnect Policy
//!
//! A `ReconnectPolicy` is a pure decision function consulted by the
//! `ConnectionManager` every time a session ends unexpectedly. Given the number
//! of reconnect attempts already scheduled since the last successful connection,
//! it answers two questions: should we try again, and how long should we wait.
//!
//! Two policies ship with the crate:
//!
//! - **`FixedIntervalPolicy`**: the default. A constant delay between attempts
//!   and a hard cap on the number of attempts.
//! - **`ExponentialBackoffPolicy`**: the same cap, but the delay grows
//!   geometrically up to a ceiling and is blended with random jitter so that a
//!   fleet of clients does not reconnect in lock-step after a server restart.

use std::time::Duration;

use rand::Rng;

use crate::error::{LiveFeedError, LiveFeedResult};

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// The answer a policy gives for one attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectDecision {
    /// Whether another connection attempt should be made.
    pub should_retry: bool,
    /// How long to wait before that attempt.
    pub delay: Duration,
}

impl ReconnectDecision {
    /// A decision to retry after `delay`.
    pub fn retry(delay: Duration) -> Self {
        Self { should_retry: true, delay }
    }

    /// A decision to stop retrying.
    pub fn give_up() -> Self {
        Self { should_retry: false, delay: Duration::ZERO }
    }
}

/// # Reconnect Policy
///
/// Pluggable retry strategy. Implementations must be pure with respect to the
/// connection: they see only the attempt count and never touch the transport.
pub trait ReconnectPolicy: Send + Sync + 'static {
    /// Decides whether to retry after `attempt` previous reconnect attempts.
    fn decide(&self, attempt: u32) -> ReconnectDecision;
}

/// Constant delay, bounded attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedIntervalPolicy {
    max_attempts: u32,
    interval: Duration,
}

impl FixedIntervalPolicy {
    /// Creates a policy allowing `max_attempts` retries spaced by `interval`.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    /// The attempt cap.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for FixedIntervalPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RECONNECT_INTERVAL)
    }
}

impl ReconnectPolicy for FixedIntervalPolicy {
    fn decide(&self, attempt: u32) -> ReconnectDecision {
        if attempt < self.max_attempts {
            ReconnectDecision::retry(self.interval)
        } else {
            ReconnectDecision::give_up()
        }
    }
}

/// Exponential backoff with jitter, bounded attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialBackoffPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
    jitter: f64,
}

impl ExponentialBackoffPolicy {
    /// Creates a validated backoff policy.
    ///
    /// # Arguments
    /// * `max_attempts` - The attempt cap, same meaning as in `FixedIntervalPolicy`.
    /// * `initial_delay` - Delay before the first retry. Must be non-zero.
    /// * `max_delay` - Ceiling for the computed delay. Must be `>= initial_delay`.
    /// * `factor` - Growth per attempt. Must be finite and `>= 1.0`.
    /// * `jitter` - Share of the delay that is randomised, in `[0.0, 1.0]`.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        factor: f64,
        jitter: f64,
    ) -> LiveFeedResult<Self> {
        if initial_delay.is_zero() {
            return Err(LiveFeedError::Config("initial reconnect delay must be > 0".into()));
        }
        if max_delay < initial_delay {
            return Err(LiveFeedError::Config(
                "max reconnect delay must be >= initial reconnect delay".into(),
            ));
        }
        if !factor.is_finite() || factor < 1.0 {
            return Err(LiveFeedError::Config("backoff factor must be >= 1.0".into()));
        }
        if !jitter.is_finite() || !(0.0..=1.0).contains(&jitter) {
            return Err(LiveFeedError::Config("jitter must be between 0.0 and 1.0".into()));
        }
        Ok(Self { max_attempts, initial_delay, max_delay, factor, jitter })
    }

    /// The un-jittered delay for `attempt`.
    fn base_delay(&self, attempt: u32) -> f64 {
        let initial = self.initial_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        let exponent = attempt.min(i32::MAX as u32) as i32;
        (initial * self.factor.powi(exponent)).min(max)
    }
}

impl ReconnectPolicy for ExponentialBackoffPolicy {
    fn decide(&self, attempt: u32) -> ReconnectDecision {
        if attempt >= self.max_attempts {
            return ReconnectDecision::give_up();
        }

        let base = self.base_delay(attempt);
        if self.jitter == 0.0 || base == 0.0 {
            return ReconnectDecision::retry(Duration::from_secs_f64(base));
        }

        let randomized = rand::rng().random_range(0.0..=base);
        let blended = base * (1.0 - self.jitter) + randomized * self.jitter;
        ReconnectDecision::retry(Duration::from_secs_f64(blended))
    }
}
