// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task records in the key-value store.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use shopkeep_config::model::RecoveryConfig;
use shopkeep_core::{KvStore, ShopkeepError};

use crate::task::RecoveryTask;

/// Reads and writes [`RecoveryTask`] records as JSON under
/// `{key_prefix}{id}`. Every write replaces the whole record and refreshes
/// its TTL.
#[derive(Clone)]
pub struct TaskRepository {
    kv: Arc<dyn KvStore>,
    key_prefix: String,
    ttl: Duration,
}

impl TaskRepository {
    pub fn new(kv: Arc<dyn KvStore>, key_prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            kv,
            key_prefix: key_prefix.into(),
            ttl,
        }
    }

    pub fn from_config(kv: Arc<dyn KvStore>, config: &RecoveryConfig) -> Self {
        Self::new(kv, config.key_prefix.clone(), config.task_ttl())
    }

    pub fn key(&self, id: &str) -> String {
        format!("{}{id}", self.key_prefix)
    }

    /// Load a task. `None` if it never existed or its record expired.
    pub async fn load(&self, id: &str) -> Result<Option<RecoveryTask>, ShopkeepError> {
        Ok(self.try_load(id).await?.transpose()?)
    }

    /// Like [`load`](Self::load), but a record that exists and does not
    /// decode (an unknown `type`, a missing field) comes back as the inner
    /// error instead of failing the call. The outer error is the store's.
    pub async fn try_load(
        &self,
        id: &str,
    ) -> Result<Option<Result<RecoveryTask, serde_json::Error>>, ShopkeepError> {
        let bytes = self.kv.get(&self.key(id)).await?;
        Ok(bytes.map(|bytes| serde_json::from_slice(&bytes)))
    }

    /// Mark a record that no longer decodes as `failed`, editing its raw
    /// JSON in place.
    ///
    /// Returns `false` when there is nothing to finalize: the record is gone
    /// or already says `failed`. Bytes that are not a JSON object are left
    /// untouched and count as finalized.
    pub async fn fail_unreadable(&self, id: &str, error: &str) -> Result<bool, ShopkeepError> {
        let key = self.key(id);
        let Some(bytes) = self.kv.get(&key).await? else {
            return Ok(false);
        };
        let Ok(Value::Object(mut record)) = serde_json::from_slice::<Value>(&bytes) else {
            return Ok(true);
        };
        if record.get("status").and_then(Value::as_str) == Some("failed") {
            return Ok(false);
        }
        record.insert("status".into(), Value::from("failed"));
        record.insert("error".into(), Value::from(error));
        record.insert("updated_at".into(), serde_json::to_value(Utc::now())?);
        let bytes = serde_json::to_vec(&record)?;
        self.kv.set(&key, bytes, Some(self.ttl)).await?;
        debug!(task_id = %id, "unreadable task record marked failed");
        Ok(true)
    }

    pub async fn save(&self, task: &RecoveryTask) -> Result<(), ShopkeepError> {
        let bytes = serde_json::to_vec(task)?;
        self.kv.set(&self.key(&task.id), bytes, Some(self.ttl)).await?;
        debug!(task_id = %task.id, status = %task.status, "task saved");
        Ok(())
    }
}
