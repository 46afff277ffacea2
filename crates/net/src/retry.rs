//! Retry budget and backoff calculations for the range reader

use sluice_errors::{ConfigError, Error};
use std::time::Duration;

/// Delay between two attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Constant wait
    Fixed(Duration),
    /// `min(max, initial * multiplier^(retry - 1))`
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

/// How many connection attempts one transfer may make and how long the
/// reader waits between them
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if `max_attempts` is zero, the
    /// multiplier is below 1, or the initial delay exceeds the maximum.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Result<Self, Error> {
        if max_attempts == 0 {
            return Err(invalid("retry.max_attempts", max_attempts));
        }
        if let Backoff::Exponential {
            initial,
            max,
            multiplier,
        } = backoff
        {
            if !multiplier.is_finite() || multiplier < 1.0 {
                return Err(invalid("retry.multiplier", multiplier));
            }
            if initial > max {
                return Err(invalid(
                    "retry.initial_delay_ms",
                    format!("{}ms > max {}ms", initial.as_millis(), max.as_millis()),
                ));
            }
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// Constant backoff
    ///
    /// # Errors
    ///
    /// Returns an error if `max_attempts` is zero.
    pub fn fixed(max_attempts: u32, period: Duration) -> Result<Self, Error> {
        Self::new(max_attempts, Backoff::Fixed(period))
    }

    /// Exponential backoff
    ///
    /// # Errors
    ///
    /// See [`RetryPolicy::new`].
    pub fn exponential(
        max_attempts: u32,
        initial: Duration,
        max: Duration,
        multiplier: f64,
    ) -> Result<Self, Error> {
        Self::new(
            max_attempts,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            },
        )
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Wait before the `retry`-th retry (1-based)
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(period) => period,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
                let delay = initial.as_secs_f64() * multiplier.powi(exponent);
                let delay = delay.min(max.as_secs_f64());
                Duration::try_from_secs_f64(delay).unwrap_or(max)
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Backoff::Exponential {
                initial: Duration::from_secs(1),
                max: Duration::from_secs(30),
                multiplier: 2.0,
            },
        }
    }
}

fn invalid(field: &str, value: impl ToString) -> Error {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}
