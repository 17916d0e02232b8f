// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Repair handler trait and the per-type handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use shopkeep_core::ShopkeepError;

use crate::task::TaskType;

/// Performs the repair for one task type.
///
/// Handlers may run more than once for the same task (at-least-once
/// delivery) and must be idempotent.
#[async_trait]
pub trait RepairHandler: Send + Sync {
    async fn repair(&self, payload: &Value) -> Result<(), ShopkeepError>;
}

/// Whether an error can never succeed on retry.
///
/// Malformed payloads and missing handlers fail the task immediately.
pub fn is_permanent(error: &ShopkeepError) -> bool {
    matches!(
        error,
        ShopkeepError::InvalidArgument(_) | ShopkeepError::HandlerNotRegistered(_)
    )
}

/// Maps each [`TaskType`] to at most one handler.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn RepairHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `task_type`, replacing any previous one.
    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn RepairHandler>) {
        if self.handlers.insert(task_type, handler).is_some() {
            warn!(%task_type, "replaced existing repair handler");
        } else {
            debug!(%task_type, "registered repair handler");
        }
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn RepairHandler>> {
        self.handlers.get(&task_type).cloned()
    }

    pub fn contains(&self, task_type: TaskType) -> bool {
        self.handlers.contains_key(&task_type)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
