//! Violation Backoff
//!
//! Exponential backoff applied after the provider reports a rate-limit
//! violation. The delay doubles with each consecutive violation and is
//! capped at `max_delay`:
//!
//! ```text
//! delay(n) = min(base_delay * 2^(n-1), max_delay)    n >= 1
//! ```
//!
//! A provider-supplied retry hint always takes precedence over the computed
//! delay.

use std::time::Duration;

use super::error::{GovernorError, Result};

/// Default base delay (1 second)
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default delay ceiling (5 minutes)
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(300);

/// Backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first violation
    pub base_delay: Duration,

    /// Upper bound for any computed delay
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl BackoffPolicy {
    /// Create a validated policy
    pub fn new(base_delay: Duration, max_delay: Duration) -> Result<Self> {
        let policy = Self {
            base_delay,
            max_delay,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Set the base delay
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the delay ceiling
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Reject a zero base or a base above the ceiling
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() || self.base_delay > self.max_delay {
            return Err(GovernorError::InvalidBackoff {
                base: self.base_delay,
                max: self.max_delay,
            });
        }
        Ok(())
    }

    /// Delay for the given consecutive violation count
    ///
    /// `violations` is 1 for the first violation. Zero yields no delay.
    pub fn delay_for(&self, violations: u32) -> Duration {
        if violations == 0 {
            return Duration::ZERO;
        }

        // 2^31 seconds already exceeds any sane ceiling
        let exponent = (violations - 1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Wait to apply after a violation, honouring a server hint verbatim
    ///
    /// A zero hint carries no recovery information and falls back to the
    /// exponential delay.
    pub fn wait_for(&self, violations: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) if !hint.is_zero() => hint,
            _ => self.delay_for(violations),
        }
    }
}
