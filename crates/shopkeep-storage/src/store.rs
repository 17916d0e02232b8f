// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the transactional document store.
//!
//! The store owns one dedicated connection. [`SqliteStore::begin`] locks it
//! for the lifetime of the returned transaction, so a transaction handle is
//! never shared between callers; concurrent `begin` calls queue on the lock.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use shopkeep_config::model::StorageConfig;
use shopkeep_core::traits::store::is_valid_savepoint_name;
use shopkeep_core::{
    AdapterType, HealthStatus, IsolationLevel, PluginAdapter, ShopkeepError, StoreTxn,
    TransactionalStore,
};

use crate::database::{Database, map_tr_err};

/// SQLite-backed [`TransactionalStore`].
pub struct SqliteStore {
    db: Arc<Mutex<Database>>,
}

impl SqliteStore {
    /// Open the store on the database described by `config`.
    pub async fn open(config: &StorageConfig) -> Result<Self, ShopkeepError> {
        Ok(Self::from_database(Database::open(config).await?))
    }

    /// Wrap an already opened database. The store takes over the connection.
    pub fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }
}

fn begin_statement(isolation: IsolationLevel) -> &'static str {
    // SQLite transactions are always serializable; IMMEDIATE takes the write
    // lock up front so a serializable caller never fails on lock upgrade.
    match isolation {
        IsolationLevel::Serializable => "BEGIN IMMEDIATE",
        _ => "BEGIN DEFERRED",
    }
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::TransactionalStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ShopkeepError> {
        // try_lock: a long-running transaction is not a health problem.
        match self.db.try_lock() {
            Ok(db) => {
                db.ping().await?;
                Ok(HealthStatus::Healthy)
            }
            Err(_) => Ok(HealthStatus::Degraded(
                "connection busy with an open transaction".to_string(),
            )),
        }
    }

    async fn shutdown(&self) -> Result<(), ShopkeepError> {
        self.db.lock().await.checkpoint().await
    }
}

#[async_trait]
impl TransactionalStore for SqliteStore {
    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn StoreTxn>, ShopkeepError> {
        let db = Arc::clone(&self.db).lock_owned().await;
        let begin = begin_statement(isolation);
        let read_uncommitted = isolation == IsolationLevel::ReadUncommitted;

        let abandoned = db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let abandoned = !conn.is_autocommit();
                if abandoned {
                    conn.execute_batch("ROLLBACK")?;
                }
                conn.pragma_update(None, "read_uncommitted", read_uncommitted)?;
                conn.execute_batch(begin)?;
                Ok(abandoned)
            })
            .await
            .map_err(map_tr_err)?;

        if abandoned {
            warn!("rolled back a transaction that was dropped without commit or rollback");
        }
        debug!(%isolation, "transaction started");
        Ok(Box::new(SqliteTxn { db, open: true }))
    }
}

/// An open SQLite transaction holding exclusive use of the store's connection.
struct SqliteTxn {
    db: OwnedMutexGuard<Database>,
    open: bool,
}

impl SqliteTxn {
    async fn exec(&self, sql: String) -> Result<(), ShopkeepError> {
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch(&sql)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn finish(mut self: Box<Self>, sql: &'static str) -> Result<(), ShopkeepError> {
        self.open = false;
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                match conn.execute_batch(sql) {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        // A failed COMMIT can leave the transaction open.
                        if !conn.is_autocommit() {
                            let _ = conn.execute_batch("ROLLBACK");
                        }
                        Err(e)
                    }
                }
            })
            .await
            .map_err(map_tr_err)
    }
}

fn savepoint_name(name: &str) -> Result<&str, ShopkeepError> {
    if is_valid_savepoint_name(name) {
        Ok(name)
    } else {
        Err(ShopkeepError::InvalidArgument(format!(
            "invalid savepoint name `{name}`"
        )))
    }
}

#[async_trait]
impl StoreTxn for SqliteTxn {
    async fn get(&mut self, collection: &str, key: &str) -> Result<Option<Value>, ShopkeepError> {
        let collection = collection.to_string();
        let key = key.to_string();
        let body = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT body FROM documents WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
    }

    async fn put(
        &mut self,
        collection: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ShopkeepError> {
        let collection = collection.to_string();
        let key = key.to_string();
        let body = serde_json::to_string(&value)?;
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                conn.execute(
                    "INSERT INTO documents (collection, key, body) VALUES (?1, ?2, ?3)
                     ON CONFLICT (collection, key) DO UPDATE SET
                         body = excluded.body,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![collection, key, body],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    async fn delete(&mut self, collection: &str, key: &str) -> Result<bool, ShopkeepError> {
        let collection = collection.to_string();
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<bool, rusqlite::Error> {
                let removed = conn.execute(
                    "DELETE FROM documents WHERE collection = ?1 AND key = ?2",
                    params![collection, key],
                )?;
                Ok(removed > 0)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), ShopkeepError> {
        let name = savepoint_name(name)?;
        self.exec(format!("SAVEPOINT {name}")).await
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), ShopkeepError> {
        let name = savepoint_name(name)?;
        self.exec(format!("ROLLBACK TO SAVEPOINT {name}")).await
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), ShopkeepError> {
        let name = savepoint_name(name)?;
        self.exec(format!("RELEASE SAVEPOINT {name}")).await
    }

    async fn commit(self: Box<Self>) -> Result<(), ShopkeepError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), ShopkeepError> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for SqliteTxn {
    fn drop(&mut self) {
        if self.open {
            warn!("transaction dropped while open; it is rolled back on the next begin");
        }
    }
}
