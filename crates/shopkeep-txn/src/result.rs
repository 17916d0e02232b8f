// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use shopkeep_core::ShopkeepError;

/// Outcome of one compensation action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompensationReport {
    pub name: String,
    /// `None` if the action succeeded.
    pub error: Option<String>,
}

/// Outcome of one executor call.
#[derive(Debug)]
pub struct TransactionResult {
    pub success: bool,
    /// The last failure. Always `None` on success.
    pub error: Option<ShopkeepError>,
    pub duration: Duration,
    /// Times the work closure was started.
    pub attempts: u32,
    pub compensation_executed: bool,
    /// One entry per registered compensation, in execution order.
    pub compensations: Vec<CompensationReport>,
}

impl TransactionResult {
    pub(crate) fn succeeded(attempts: u32, duration: Duration) -> Self {
        Self {
            success: true,
            error: None,
            duration,
            attempts,
            compensation_executed: false,
            compensations: Vec::new(),
        }
    }

    pub(crate) fn failed(
        error: ShopkeepError,
        attempts: u32,
        duration: Duration,
        compensations: Option<Vec<CompensationReport>>,
    ) -> Self {
        Self {
            success: false,
            error: Some(error),
            duration,
            attempts,
            compensation_executed: compensations.is_some(),
            compensations: compensations.unwrap_or_default(),
        }
    }

    /// `true` if the call failed because its deadline elapsed.
    pub fn timed_out(&self) -> bool {
        self.error.as_ref().is_some_and(ShopkeepError::is_timeout)
    }

    /// Compensations that returned an error or panicked.
    pub fn failed_compensations(&self) -> impl Iterator<Item = &CompensationReport> {
        self.compensations.iter().filter(|c| c.error.is_some())
    }
}
