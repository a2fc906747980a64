use std::time::Duration;

use crate::contract::ValidationError;

pub const TRIGGER_REGISTRATION_ATTEMPTS: u32 = 5;
pub const TRIGGER_REGISTRATION_BACKOFF: Duration = Duration::from_secs(8);
pub const ACTIVATION_POLL_ATTEMPTS: u32 = 30;
pub const ACTIVATION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Bounded retry with a fixed delay between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Result<Self, ValidationError> {
        if max_attempts == 0 {
            return Err(ValidationError::new(
                "max_attempts must be a positive integer",
            ));
        }
        Ok(Self {
            max_attempts,
            backoff,
        })
    }

    /// S3 rejects notification targets until the invoke permission has propagated.
    pub fn trigger_registration() -> Self {
        Self {
            max_attempts: TRIGGER_REGISTRATION_ATTEMPTS,
            backoff: TRIGGER_REGISTRATION_BACKOFF,
        }
    }

    /// A freshly created role is not assumable by Lambda for a few seconds.
    pub fn role_propagation() -> Self {
        Self {
            max_attempts: TRIGGER_REGISTRATION_ATTEMPTS,
            backoff: TRIGGER_REGISTRATION_BACKOFF,
        }
    }

    pub fn activation_poll() -> Self {
        Self {
            max_attempts: ACTIVATION_POLL_ATTEMPTS,
            backoff: ACTIVATION_POLL_INTERVAL,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Delay to wait after the given 1-based attempt failed, or `None` once
    /// the attempt budget is spent.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts).then_some(self.backoff)
    }
}
