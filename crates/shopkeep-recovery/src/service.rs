// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public entry points for creating, inspecting and cancelling recovery
//! tasks, and for pairing a transaction with a fallback task.

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::{error, info, warn};

use shopkeep_config::model::RecoveryConfig;
use shopkeep_core::{ShopkeepError, StoreTxn};
use shopkeep_txn::{TransactionExecutor, TransactionOptions, TransactionResult};

use crate::queue::RecoveryQueue;
use crate::repository::TaskRepository;
use crate::task::{RecoveryTask, TaskType};

/// The recovery task to create if a transaction fails.
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    /// Selects the repair handler.
    pub task_type: TaskType,
    /// Handed to the handler unchanged.
    pub payload: Value,
    /// `None` uses the configured default.
    pub max_retries: Option<u32>,
}

impl RecoveryPlan {
    pub fn new(task_type: TaskType, payload: Value) -> Self {
        Self {
            task_type,
            payload,
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Result of [`RecoveryService::execute_with_recovery`].
#[derive(Debug)]
pub struct RecoveryOutcome {
    /// What the executor reported for the transaction itself.
    pub result: TransactionResult,
    /// The task created after a failure. `None` on success, or if creating
    /// the task itself failed.
    pub recovery_task: Option<RecoveryTask>,
}

/// Creates, reads and cancels recovery tasks, and runs transactions that
/// fall back to one.
#[derive(Clone)]
pub struct RecoveryService {
    repository: TaskRepository,
    queue: RecoveryQueue,
    default_max_retries: u32,
    max_retries_limit: u32,
}

impl RecoveryService {
    pub fn new(repository: TaskRepository, queue: RecoveryQueue, config: &RecoveryConfig) -> Self {
        Self {
            repository,
            queue,
            default_max_retries: config.default_max_retries,
            max_retries_limit: config.max_retries_limit,
        }
    }

    pub fn repository(&self) -> &TaskRepository {
        &self.repository
    }

    pub fn queue(&self) -> &RecoveryQueue {
        &self.queue
    }

    /// Persist a new pending task and enqueue its id.
    ///
    /// `payload` must be a JSON object. `max_retries` must be between 1 and
    /// the configured limit; `None` uses the configured default.
    pub async fn create_task(
        &self,
        task_type: TaskType,
        payload: Value,
        max_retries: Option<u32>,
    ) -> Result<RecoveryTask, ShopkeepError> {
        if !payload.is_object() {
            return Err(ShopkeepError::InvalidArgument(
                "task payload must be a JSON object".to_string(),
            ));
        }
        let max_retries = max_retries.unwrap_or(self.default_max_retries);
        if max_retries == 0 || max_retries > self.max_retries_limit {
            return Err(ShopkeepError::InvalidArgument(format!(
                "max_retries must be between 1 and {}, got {max_retries}",
                self.max_retries_limit
            )));
        }

        let task = RecoveryTask::new(task_type, payload, max_retries, Utc::now());
        self.repository.save(&task).await?;
        self.queue.enqueue(&task.id).await?;
        info!(task_id = %task.id, %task_type, max_retries, "recovery task created");
        Ok(task)
    }

    /// Fresh read of a task.
    pub async fn get_task(&self, id: &str) -> Result<RecoveryTask, ShopkeepError> {
        self.repository
            .load(id)
            .await?
            .ok_or_else(|| ShopkeepError::TaskNotFound(id.to_string()))
    }

    /// Cancel a pending or running task. A running task's in-flight attempt
    /// finishes, but its outcome is discarded.
    pub async fn cancel_task(&self, id: &str) -> Result<RecoveryTask, ShopkeepError> {
        let mut task = self.get_task(id).await?;
        task.cancel(Utc::now())?;
        self.repository.save(&task).await?;
        info!(task_id = %id, "recovery task cancelled");
        Ok(task)
    }

    /// Ids waiting in the queue.
    pub async fn queue_depth(&self) -> Result<usize, ShopkeepError> {
        self.queue.depth().await
    }

    /// Run `work` through `executor`; if it fails definitively, create a
    /// recovery task from `plan`.
    pub async fn execute_with_recovery<F>(
        &self,
        executor: &TransactionExecutor,
        work: F,
        options: &TransactionOptions,
        plan: RecoveryPlan,
    ) -> RecoveryOutcome
    where
        F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>>
            + Send
            + Sync,
    {
        let result = executor.execute(work, options).await;
        if result.success {
            return RecoveryOutcome {
                result,
                recovery_task: None,
            };
        }

        if let Some(e) = &result.error {
            warn!(task_type = %plan.task_type, error = %e, "transaction failed, scheduling recovery");
        }
        let recovery_task = match self
            .create_task(plan.task_type, plan.payload, plan.max_retries)
            .await
        {
            Ok(task) => Some(task),
            Err(e) => {
                error!(task_type = %plan.task_type, error = %e, "failed to create recovery task");
                None
            }
        };
        RecoveryOutcome {
            result,
            recovery_task,
        }
    }
}
