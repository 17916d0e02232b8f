// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! FIFO queue of task ids over a key-value list.
//!
//! The queue only carries ids; task state is always read fresh from the
//! [`TaskRepository`](crate::repository::TaskRepository). Delivery is
//! at-least-once, so the same id may be popped more than once.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use shopkeep_config::model::RecoveryConfig;
use shopkeep_core::{KvStore, ShopkeepError};

/// FIFO of task ids in a single KV list. Each id is popped by at most one
/// worker.
#[derive(Clone)]
pub struct RecoveryQueue {
    kv: Arc<dyn KvStore>,
    queue_key: String,
}

impl RecoveryQueue {
    pub fn new(kv: Arc<dyn KvStore>, queue_key: impl Into<String>) -> Self {
        Self {
            kv,
            queue_key: queue_key.into(),
        }
    }

    pub fn from_config(kv: Arc<dyn KvStore>, config: &RecoveryConfig) -> Self {
        Self::new(kv, config.queue_key.clone())
    }

    pub fn queue_key(&self) -> &str {
        &self.queue_key
    }

    /// Append an id to the tail of the queue.
    pub async fn enqueue(&self, id: &str) -> Result<(), ShopkeepError> {
        self.kv.list_push(&self.queue_key, id).await?;
        debug!(task_id = %id, queue = %self.queue_key, "task enqueued");
        Ok(())
    }

    /// Pop the id at the head, waiting up to `timeout`. `None` on timeout.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<String>, ShopkeepError> {
        self.kv.list_blocking_pop(&self.queue_key, timeout).await
    }

    /// Number of ids waiting.
    pub async fn depth(&self) -> Result<usize, ShopkeepError> {
        self.kv.list_len(&self.queue_key).await
    }
}
