// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Retry and backoff policy shared by every network path.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::serde_millis;

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    /// Always wait `base_delay`.
    Fixed,
    /// Wait `base_delay × attempt_number`.
    Linear,
}

/// Policy for retrying a failed request.
///
/// Growth is either fixed or linear and always capped by `max_delay`, so the
/// total time spent on one logical request stays bounded by
/// [`max_total_wait`](Self::max_total_wait).
///
/// # Examples
///
/// ```
/// use hass_sync_lib::transport::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts(), 3);
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
///
/// let fixed = RetryPolicy::fixed(5, Duration::from_millis(200));
/// assert_eq!(fixed.delay_for_attempt(4), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    max_attempts: u32,
    #[serde(with = "serde_millis")]
    base_delay: Duration,
    #[serde(with = "serde_millis")]
    max_delay: Duration,
    backoff: BackoffKind,
}

impl RetryPolicy {
    /// Default number of attempts per logical request.
    pub const DEFAULT_ATTEMPTS: u32 = 3;
    /// Default base delay between attempts.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);
    /// Default cap on a single backoff delay.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(2);

    /// Creates a linear policy: wait `base_delay × attempt` after each failure.
    #[must_use]
    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Self::DEFAULT_MAX_DELAY.max(base_delay),
            backoff: BackoffKind::Linear,
        }
    }

    /// Creates a fixed policy: wait `delay` after each failure.
    #[must_use]
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: delay,
            max_delay: delay,
            backoff: BackoffKind::Fixed,
        }
    }

    /// Creates a policy that performs exactly one attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Sets the cap on a single backoff delay.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Returns the maximum number of attempts.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the base delay.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the backoff growth kind.
    #[must_use]
    pub fn backoff(&self) -> BackoffKind {
        self.backoff
    }

    /// Returns the delay to wait after attempt number `attempt` (1-based) failed.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Linear => self.base_delay.saturating_mul(attempt.max(1)),
        };
        delay.min(self.max_delay)
    }

    /// Returns true if another attempt may follow attempt number `attempt`.
    #[must_use]
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Upper bound on the time one logical request can take.
    ///
    /// Computed as `max_attempts × (per_request_timeout + max_delay)`.
    #[must_use]
    pub fn max_total_wait(&self, per_request_timeout: Duration) -> Duration {
        per_request_timeout
            .saturating_add(self.max_delay)
            .saturating_mul(self.max_attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::linear(Self::DEFAULT_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_delay_grows_with_attempt() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(1500));
    }

    #[test]
    fn linear_delay_is_capped() {
        let policy = RetryPolicy::linear(10, Duration::from_millis(500))
            .with_max_delay(Duration::from_millis(1200));
        assert_eq!(policy.delay_for_attempt(9), Duration::from_millis(1200));
    }

    #[test]
    fn fixed_delay_is_constant() {
        let policy = RetryPolicy::fixed(4, Duration::from_millis(250));
        for attempt in 1..=4 {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy::fixed(0, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.has_attempt_after(1));
    }

    #[test]
    fn max_total_wait_bounds_all_attempts() {
        let policy = RetryPolicy::default();
        let bound = policy.max_total_wait(Duration::from_secs(15));
        assert_eq!(bound, Duration::from_secs(3 * 17));
    }

    #[test]
    fn serde_roundtrip_uses_millis() {
        let policy = RetryPolicy::fixed(2, Duration::from_millis(300));
        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["base_delay"], 300);
        assert_eq!(json["backoff"], "fixed");
    }
}
