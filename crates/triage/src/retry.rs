//! Exponential backoff with jitter for external calls

use log::warn;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::TriageError;

/// Retry policy for provider and classifier calls
///
/// Only [`TriageError::is_retryable`] errors are retried. The delay doubles
/// each attempt, capped at `max_delay_ms`, plus 0-100ms of jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries without sleeping (tests)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Backoff before retry number `attempt` (0-based), without jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Sleep before retry number `attempt`: backoff plus jitter
    ///
    /// Zero when the backoff is zero, so immediate policies never sleep.
    pub fn delay(&self, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        if backoff.is_zero() {
            return backoff;
        }
        backoff + Duration::from_millis(rand_jitter())
    }

    /// Run `op`, retrying transient failures
    ///
    /// Returns the last error once attempts are exhausted.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T, TriageError>
    where
        F: FnMut() -> Result<T, TriageError>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.delay(attempt);
                    warn!(
                        "[RETRY] {} failed (attempt {}/{}): {}; retrying in {:?}",
                        what,
                        attempt + 1,
                        attempts,
                        e,
                        delay
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
