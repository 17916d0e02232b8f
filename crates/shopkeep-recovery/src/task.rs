// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery task model and its status state machine.
//!
//! ```text
//! pending -> running -> completed
//!               |-----> pending   (rescheduled with backoff)
//!               |-----> failed    (retries exhausted or permanent error)
//! pending | running -> cancelled
//! ```
//!
//! `completed`, `failed` and `cancelled` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString};

use shopkeep_core::ShopkeepError;

use crate::backoff::BackoffPolicy;

/// The kind of business operation a task repairs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    /// Settle an order left `pending` by a failed checkout.
    OrderRecovery,
    /// Reconcile a payment whose outcome was never recorded.
    PaymentRecovery,
    /// Return reserved stock to the product.
    InventoryRecovery,
    /// Finish a refund that was started but not applied.
    RefundRecovery,
}

/// Where a task is in its lifecycle. See the module docs for the allowed
/// transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Running, Completed)
                | (Running, Pending)
                | (Running, Failed)
                | (Pending, Cancelled)
                | (Running, Cancelled)
        )
    }
}

/// What a failed attempt did to the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Back to pending, due again at `next_retry_at`.
    Rescheduled,
    /// Terminal; no further attempts.
    Failed,
}

/// A durable unit of deferred repair work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryTask {
    /// `{type}-{uuid}`, also the suffix of the record key.
    pub id: String,
    /// Stored as `type`.
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    /// Handler input, opaque to the worker.
    pub payload: Value,
    /// Last failure message; empty until an attempt fails.
    #[serde(default)]
    pub error: String,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempts allowed before the task fails.
    pub max_retries: u32,
    /// Earliest time the next attempt may start.
    pub next_retry_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecoveryTask {
    /// A new pending task, due immediately.
    pub fn new(task_type: TaskType, payload: Value, max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("{task_type}-{}", uuid::Uuid::new_v4().simple()),
            task_type,
            status: TaskStatus::Pending,
            payload,
            error: String::new(),
            retry_count: 0,
            max_retries,
            next_retry_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_retry_at
    }

    fn transition(&mut self, next: TaskStatus, now: DateTime<Utc>) -> Result<(), ShopkeepError> {
        if !self.status.can_transition_to(next) {
            return Err(ShopkeepError::InvalidTransition {
                id: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), ShopkeepError> {
        self.transition(TaskStatus::Running, now)
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), ShopkeepError> {
        self.transition(TaskStatus::Completed, now)
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), ShopkeepError> {
        self.transition(TaskStatus::Cancelled, now)
    }

    /// Record a failed attempt of a running task.
    ///
    /// The attempt that brings `retry_count` to `max_retries`, or any
    /// `permanent` failure, finalizes the task as failed. Otherwise the task
    /// goes back to pending with `next_retry_at = now + backoff(retry_count)`.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        permanent: bool,
        backoff: &BackoffPolicy,
        now: DateTime<Utc>,
    ) -> Result<FailureDisposition, ShopkeepError> {
        let exhausted = self.retry_count.saturating_add(1) >= self.max_retries;
        let next = if permanent || exhausted {
            TaskStatus::Failed
        } else {
            TaskStatus::Pending
        };
        self.transition(next, now)?;

        self.retry_count = self.retry_count.saturating_add(1).min(self.max_retries);
        self.error = error.into();
        if next == TaskStatus::Failed {
            return Ok(FailureDisposition::Failed);
        }
        let delay = backoff.delay(self.retry_count);
        self.next_retry_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Ok(FailureDisposition::Rescheduled)
    }
}
