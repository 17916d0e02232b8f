// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quadratic retry backoff for recovery tasks.

use std::time::Duration;

use shopkeep_config::model::RecoveryConfig;

/// Delay before retry `n` is `unit * n²`, capped at `max`.
///
/// With the default one-minute unit a task waits 1, 4, 9, 16... minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    unit: Duration,
    max: Duration,
}

impl BackoffPolicy {
    pub fn new(unit: Duration, max: Duration) -> Self {
        Self { unit, max }
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(
            Duration::from_secs(config.backoff_unit_secs),
            Duration::from_secs(config.backoff_max_secs),
        )
    }

    /// Delay after the `retry_count`-th failure.
    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = retry_count.saturating_mul(retry_count);
        self.unit
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}
