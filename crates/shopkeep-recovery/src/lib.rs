// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable recovery tasks for the Shopkeep consistency engine.
//!
//! When a transaction fails definitively, a [`RecoveryTask`] records the
//! repair that still has to happen. Tasks are stored as JSON records in a
//! [`KvStore`](shopkeep_core::KvStore) and their ids travel through a FIFO
//! [`RecoveryQueue`]. [`RecoveryWorker`]s pop ids, dispatch to the
//! [`RepairHandler`] registered for the task type, and reschedule failures
//! with quadratic backoff until the task completes, fails permanently or is
//! cancelled.
//!
//! Delivery is at-least-once; handlers must be idempotent.

pub mod alert;
pub mod backoff;
pub mod handler;
pub mod queue;
pub mod repair;
pub mod repository;
pub mod service;
pub mod task;
pub mod worker;

pub use alert::{AlertSink, LogAlertSink};
pub use backoff::BackoffPolicy;
pub use handler::{HandlerRegistry, RepairHandler, is_permanent};
pub use queue::RecoveryQueue;
pub use repair::register_builtin_handlers;
pub use repository::TaskRepository;
pub use service::{RecoveryOutcome, RecoveryPlan, RecoveryService};
pub use task::{FailureDisposition, RecoveryTask, TaskStatus, TaskType};
pub use worker::{ProcessOutcome, RecoveryWorker, WorkerSettings};
