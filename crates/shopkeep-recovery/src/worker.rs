// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recovery worker loop.
//!
//! A worker repeatedly pops a task id, loads the task fresh, runs the
//! registered repair handler and records the outcome: completed,
//! rescheduled with backoff, or failed with an alert. Several workers may
//! share one queue; the atomic pop is the only coordination between them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use shopkeep_config::model::RecoveryConfig;
use shopkeep_core::{ShopkeepError, panic_message};

use crate::alert::AlertSink;
use crate::backoff::BackoffPolicy;
use crate::handler::{HandlerRegistry, is_permanent};
use crate::queue::RecoveryQueue;
use crate::repository::TaskRepository;
use crate::task::{FailureDisposition, RecoveryTask, TaskStatus};

/// Timing knobs for a worker.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Delay schedule for rescheduled attempts.
    pub backoff: BackoffPolicy,
    /// How long one blocking pop waits for an id.
    pub dequeue_timeout: Duration,
    /// Upper bound on the pause after popping a task that is not yet due.
    pub not_due_delay: Duration,
}

impl WorkerSettings {
    /// Settings from the `[recovery]` section.
    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self {
            backoff: BackoffPolicy::from_config(config),
            dequeue_timeout: config.dequeue_timeout(),
            not_due_delay: config.not_due_delay(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

/// What one iteration of the worker did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The queue stayed empty for the whole dequeue timeout.
    Idle,
    /// The id had no task record; it was dropped.
    Missing,
    /// The task was already terminal or handled elsewhere.
    Skipped,
    /// The task is not due yet; it went back on the queue. Carries the pause
    /// the run loop takes before the next pop.
    Deferred(Duration),
    /// The handler succeeded and the task is `completed`.
    Completed,
    /// The attempt failed with retries left; the task is `pending` again and
    /// back on the queue.
    Rescheduled,
    /// The task is `failed` and the alert sink was notified.
    Failed,
    /// The record did not decode (for example an unknown task type). It was
    /// marked failed, reported to the alert sink and not re-enqueued.
    Unreadable,
    /// The task was cancelled while its handler ran; the outcome was dropped.
    Cancelled,
}

/// Pops task ids from a [`RecoveryQueue`] and drives each task through one
/// repair attempt.
pub struct RecoveryWorker {
    id: usize,
    repository: TaskRepository,
    queue: RecoveryQueue,
    registry: Arc<HandlerRegistry>,
    alerts: Arc<dyn AlertSink>,
    settings: WorkerSettings,
}

impl RecoveryWorker {
    /// A worker with id 0. Workers sharing a queue should get distinct ids
    /// through [`with_id`](Self::with_id).
    pub fn new(
        repository: TaskRepository,
        queue: RecoveryQueue,
        registry: Arc<HandlerRegistry>,
        alerts: Arc<dyn AlertSink>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            id: 0,
            repository,
            queue,
            registry,
            alerts,
            settings,
        }
    }

    /// Worker number used in log events.
    pub fn with_id(mut self, id: usize) -> Self {
        self.id = id;
        self
    }

    /// Process tasks until `shutdown` is cancelled.
    ///
    /// Shutdown is checked between iterations, so a popped id is always
    /// processed or put back before the loop exits. Pauses (task not yet
    /// due, storage errors) end early on shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(worker = self.id, queue = %self.queue.queue_key(), "recovery worker started");

        while !shutdown.is_cancelled() {
            let pause = match self.process_next().await {
                Ok(ProcessOutcome::Deferred(wait)) => Some(wait),
                Ok(_) => None,
                Err(e) => {
                    error!(worker = self.id, error = %e, "recovery iteration failed");
                    Some(self.settings.not_due_delay)
                }
            };
            if let Some(wait) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = shutdown.cancelled() => {}
                }
            }
        }

        info!(worker = self.id, "recovery worker stopped");
    }

    /// One iteration: pop an id (waiting up to the dequeue timeout) and
    /// process it. If processing hits a storage error the id is put back;
    /// an undecodable record is not.
    pub async fn process_next(&self) -> Result<ProcessOutcome, ShopkeepError> {
        let Some(id) = self.queue.dequeue(self.settings.dequeue_timeout).await? else {
            return Ok(ProcessOutcome::Idle);
        };

        match self.process_task(&id).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                if let Err(requeue) = self.queue.enqueue(&id).await {
                    error!(task_id = %id, error = %requeue, "failed to re-enqueue task after error");
                }
                Err(e)
            }
        }
    }

    /// Process one task by id.
    pub async fn process_task(&self, id: &str) -> Result<ProcessOutcome, ShopkeepError> {
        let mut task = match self.repository.try_load(id).await? {
            Some(Ok(task)) => task,
            Some(Err(e)) => return self.fail_unreadable(id, &e).await,
            None => {
                warn!(task_id = %id, "dequeued id has no task record, dropping it");
                return Ok(ProcessOutcome::Missing);
            }
        };
        if task.is_terminal() {
            debug!(task_id = %id, status = %task.status, "task already terminal, skipping");
            return Ok(ProcessOutcome::Skipped);
        }

        let now = Utc::now();
        if !task.is_due(now) {
            self.queue.enqueue(id).await?;
            let until_due = (task.next_retry_at - now).to_std().unwrap_or_default();
            debug!(task_id = %id, next_retry_at = %task.next_retry_at, "task not due, deferred");
            return Ok(ProcessOutcome::Deferred(
                until_due.min(self.settings.not_due_delay),
            ));
        }

        // A task popped while `running` lost its previous attempt (the worker
        // stopped before recording an outcome); run it again.
        if task.status == TaskStatus::Pending {
            task.mark_running(now)?;
            self.repository.save(&task).await?;
        }
        info!(
            worker = self.id,
            task_id = %id,
            task_type = %task.task_type,
            attempt = task.retry_count + 1,
            "processing recovery task"
        );

        let outcome = self.dispatch(&task).await;

        let Some(mut current) = self.repository.load(id).await? else {
            warn!(task_id = %id, "task record disappeared while its handler ran");
            return Ok(ProcessOutcome::Missing);
        };
        match current.status {
            TaskStatus::Running => {}
            TaskStatus::Cancelled => {
                info!(task_id = %id, "task cancelled during repair, outcome discarded");
                return Ok(ProcessOutcome::Cancelled);
            }
            status => {
                debug!(task_id = %id, %status, "task settled elsewhere, outcome discarded");
                return Ok(ProcessOutcome::Skipped);
            }
        }

        let now = Utc::now();
        match outcome {
            Ok(()) => {
                current.mark_completed(now)?;
                self.repository.save(&current).await?;
                info!(task_id = %id, "recovery task completed");
                Ok(ProcessOutcome::Completed)
            }
            Err(e) => {
                let message = e.to_string();
                let disposition =
                    current.record_failure(&message, is_permanent(&e), &self.settings.backoff, now)?;
                self.repository.save(&current).await?;
                match disposition {
                    FailureDisposition::Rescheduled => {
                        self.queue.enqueue(id).await?;
                        warn!(
                            task_id = %id,
                            retry_count = current.retry_count,
                            max_retries = current.max_retries,
                            next_retry_at = %current.next_retry_at,
                            error = %message,
                            "recovery attempt failed, rescheduled"
                        );
                        Ok(ProcessOutcome::Rescheduled)
                    }
                    FailureDisposition::Failed => {
                        self.alert(&current, &message).await;
                        Ok(ProcessOutcome::Failed)
                    }
                }
            }
        }
    }

    async fn dispatch(&self, task: &RecoveryTask) -> Result<(), ShopkeepError> {
        let Some(handler) = self.registry.get(task.task_type) else {
            return Err(ShopkeepError::HandlerNotRegistered(task.task_type.to_string()));
        };
        match AssertUnwindSafe(handler.repair(&task.payload))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => Err(ShopkeepError::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Retire a record that cannot be decoded. Retrying would only decode
    /// the same bytes again, so the id is dropped rather than re-enqueued.
    async fn fail_unreadable(
        &self,
        id: &str,
        decode_error: &serde_json::Error,
    ) -> Result<ProcessOutcome, ShopkeepError> {
        let message = format!("task record cannot be decoded: {decode_error}");
        error!(
            worker = self.id,
            task_id = %id,
            error = %message,
            "dropping unreadable recovery task"
        );

        if !self.repository.fail_unreadable(id, &message).await? {
            debug!(task_id = %id, "unreadable task already failed, not alerting again");
            return Ok(ProcessOutcome::Unreadable);
        }
        let delivered = AssertUnwindSafe(self.alerts.alert_unreadable(id, &message))
            .catch_unwind()
            .await;
        if let Err(payload) = delivered {
            error!(
                task_id = %id,
                panic = %panic_message(payload.as_ref()),
                "alert sink panicked"
            );
        }
        Ok(ProcessOutcome::Unreadable)
    }

    async fn alert(&self, task: &RecoveryTask, message: &str) {
        let delivered = AssertUnwindSafe(self.alerts.alert(task, message))
            .catch_unwind()
            .await;
        if let Err(payload) = delivered {
            error!(
                task_id = %task.id,
                panic = %panic_message(payload.as_ref()),
                "alert sink panicked"
            );
        }
    }
}
