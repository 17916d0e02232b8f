// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sinks notified when a task fails permanently.

use async_trait::async_trait;
use tracing::error;

use crate::task::RecoveryTask;

/// Receives one notification per permanently failed task.
///
/// Delivery is fire-and-forget: sinks handle their own errors.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// `task` has reached `failed`; `error` is its last failure message.
    async fn alert(&self, task: &RecoveryTask, error: &str);

    /// The record stored under `task_id` could not be decoded, so it was
    /// failed without running any handler.
    async fn alert_unreadable(&self, task_id: &str, error: &str) {
        error!(task_id, error, "unreadable recovery task failed permanently");
    }
}

/// Emits each alert as a `tracing` error event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, task: &RecoveryTask, error: &str) {
        error!(
            task_id = %task.id,
            task_type = %task.task_type,
            retry_count = task.retry_count,
            max_retries = task.max_retries,
            error,
            "recovery task failed permanently"
        );
    }
}
