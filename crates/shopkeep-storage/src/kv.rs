// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the key-value store backing the recovery queue.
//!
//! Every operation is a single autocommit statement on the adapter's own
//! connection. A list pop is one `DELETE ... RETURNING` statement, so each
//! pushed value is delivered to exactly one consumer, including consumers in
//! other processes sharing the database file.

use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

use shopkeep_config::model::StorageConfig;
use shopkeep_core::{AdapterType, HealthStatus, KvStore, PluginAdapter, ShopkeepError};

use crate::database::{Database, map_tr_err, now_millis};

/// SQLite-backed [`KvStore`].
pub struct SqliteKv {
    db: Database,
    poll_interval: Duration,
    pushed: Notify,
}

impl SqliteKv {
    /// Open the key-value store on the database described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, ShopkeepError> {
        let db = Database::open(config).await?;
        Ok(Self::from_database(db, config.poll_interval()))
    }

    /// Wrap an already opened database.
    ///
    /// `poll_interval` bounds how long a blocking pop waits before re-checking
    /// the table for values pushed by another process.
    pub fn from_database(db: Database, poll_interval: Duration) -> Self {
        Self {
            db,
            poll_interval,
            pushed: Notify::new(),
        }
    }

    /// Delete every expired entry. Returns the number removed.
    pub async fn purge_expired(&self) -> Result<usize, ShopkeepError> {
        let now = now_millis();
        let removed = self
            .db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.execute(
                    "DELETE FROM kv_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )
            })
            .await
            .map_err(map_tr_err)?;
        if removed > 0 {
            debug!(removed, "purged expired entries");
        }
        Ok(removed)
    }

    async fn try_pop(&self, list_key: &str) -> Result<Option<String>, ShopkeepError> {
        let list_key = list_key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "DELETE FROM kv_lists
                     WHERE id = (SELECT id FROM kv_lists WHERE list_key = ?1 ORDER BY id LIMIT 1)
                     RETURNING value",
                    params![list_key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteKv {
    fn name(&self) -> &str {
        "sqlite-kv"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValue
    }

    async fn health_check(&self) -> Result<HealthStatus, ShopkeepError> {
        self.db.ping().await?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShopkeepError> {
        // Wake blocked pops so they return promptly.
        self.pushed.notify_waiters();
        self.db.checkpoint().await
    }
}

#[async_trait]
impl KvStore for SqliteKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ShopkeepError> {
        let key = key.to_string();
        let now = now_millis();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<Vec<u8>>, rusqlite::Error> {
                conn.query_row(
                    "SELECT value FROM kv_entries
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), ShopkeepError> {
        let key = key.to_string();
        let expires_at = ttl.map(|ttl| {
            now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO kv_entries (key, value, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT (key) DO UPDATE SET
                         value = excluded.value,
                         expires_at = excluded.expires_at",
                    params![key, value, expires_at],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn list_push(&self, list_key: &str, value: &str) -> Result<(), ShopkeepError> {
        let list_key = list_key.to_string();
        let value = value.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO kv_lists (list_key, value) VALUES (?1, ?2)",
                    params![list_key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn list_blocking_pop(
        &self,
        list_key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ShopkeepError> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before checking so a push between the
            // check and the wait is not missed.
            let mut notified = std::pin::pin!(self.pushed.notified());
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(list_key).await? {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait = (deadline - now).min(self.poll_interval);
            let _ = tokio::time::timeout(wait, notified).await;
        }
    }

    async fn list_len(&self, list_key: &str) -> Result<usize, ShopkeepError> {
        let list_key = list_key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<usize, rusqlite::Error> {
                conn.query_row(
                    "SELECT COUNT(*) FROM kv_lists WHERE list_key = ?1",
                    params![list_key],
                    |row| row.get(0),
                )
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    async fn open_kv(dir: &tempfile::TempDir) -> SqliteKv {
        let path = dir.path().join("kv.db");
        let db = Database::open_path(path.to_str().unwrap()).await.unwrap();
        SqliteKv::from_database(db, Duration::from_millis(20))
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let dir = tempdir().unwrap();
        let kv = open_kv(&dir).await;

        kv.set("recovery:task:a", b"first".to_vec(), None).await.unwrap();
        kv.set("recovery:task:a", b"second".to_vec(), None).await.unwrap();
        assert_eq!(
            kv.get("recovery:task:a").await.unwrap(),
            Some(b"second".to_vec())
        );
        assert_eq!(kv.get("recovery:task:missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let dir = tempdir().unwrap();
        let kv = open_kv(&dir).await;

        kv.set("short", b"x".to_vec(), Some(Duration::from_millis(1)))
            .await
            .unwrap();
        kv.set("long", b"y".to_vec(), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(kv.get("short").await.unwrap(), None);
        assert_eq!(kv.get("long").await.unwrap(), Some(b"y".to_vec()));
        assert_eq!(kv.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn lists_are_fifo_and_scoped_by_key() {
        let dir = tempdir().unwrap();
        let kv = open_kv(&dir).await;

        kv.list_push("queue", "one").await.unwrap();
        kv.list_push("other", "elsewhere").await.unwrap();
        kv.list_push("queue", "two").await.unwrap();
        assert_eq!(kv.list_len("queue").await.unwrap(), 2);

        let timeout = Duration::from_millis(50);
        assert_eq!(
            kv.list_blocking_pop("queue", timeout).await.unwrap().as_deref(),
            Some("one")
        );
        assert_eq!(
            kv.list_blocking_pop("queue", timeout).await.unwrap().as_deref(),
            Some("two")
        );
        assert_eq!(kv.list_len("queue").await.unwrap(), 0);
        assert_eq!(kv.list_len("other").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn blocking_pop_times_out_on_empty_list() {
        let dir = tempdir().unwrap();
        let kv = open_kv(&dir).await;

        let started = std::time::Instant::now();
        let popped = kv
            .list_blocking_pop("empty", Duration::from_millis(80))
            .await
            .unwrap();
        assert_eq!(popped, None);
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let dir = tempdir().unwrap();
        let kv = Arc::new(open_kv(&dir).await);

        let waiter = {
            let kv = Arc::clone(&kv);
            tokio::spawn(async move {
                kv.list_blocking_pop("queue", Duration::from_secs(5))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        kv.list_push("queue", "late").await.unwrap();

        assert_eq!(waiter.await.unwrap().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn concurrent_pops_deliver_each_value_once() {
        let dir = tempdir().unwrap();
        let kv = Arc::new(open_kv(&dir).await);
        for i in 0..20 {
            kv.list_push("queue", &format!("task-{i}")).await.unwrap();
        }

        let mut handles = Vec::new();
        for _ in 0..4 {
            let kv = Arc::clone(&kv);
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(v) = kv
                    .list_blocking_pop("queue", Duration::from_millis(30))
                    .await
                    .unwrap()
                {
                    got.push(v);
                }
                got
            }));
        }

        let mut seen = HashSet::new();
        let mut total = 0;
        for handle in handles {
            for value in handle.await.unwrap() {
                total += 1;
                seen.insert(value);
            }
        }
        assert_eq!(total, 20);
        assert_eq!(seen.len(), 20);
    }

    #[tokio::test]
    async fn sqlite_kv_reports_key_value_adapter() {
        let dir = tempdir().unwrap();
        let kv = open_kv(&dir).await;
        assert_eq!(kv.name(), "sqlite-kv");
        assert_eq!(kv.adapter_type(), AdapterType::KeyValue);
        assert_eq!(kv.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
