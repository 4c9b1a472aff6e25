//! Capped exponential backoff shared by catalog calls and file transfers

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::limits;

/// Retry budget and delay curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the delay added or removed at random (0.0-1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: limits::MAX_RETRIES,
            base_delay: Duration::from_millis(limits::RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(limits::MAX_BACKOFF_MS),
            jitter: limits::BACKOFF_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Policy that never waits, for tests and for callers that handle pacing themselves
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`, capped, jittered
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(20);
        let base_millis = self.base_delay.as_millis() as u64;
        let exponential = base_millis.saturating_mul(1u64 << exponent);
        let capped = exponential.min(self.max_delay.as_millis() as u64);

        let jitter_range = (capped as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        let jittered = if jitter_range > 0 {
            let offset = fastrand::u64(0..=jitter_range * 2);
            (capped + offset).saturating_sub(jitter_range)
        } else {
            capped
        };

        Duration::from_millis(jittered)
    }

    /// Whether another retry is allowed after `retries_done` retries
    pub fn allows(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}
