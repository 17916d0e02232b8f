// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! Each [`Database`] wraps one `tokio-rusqlite` connection whose closures run
//! on a single background thread. Adapters that must not observe each other's
//! open transactions (the document store and the key-value queue) each open
//! their own `Database` on the same file.

use std::path::Path;

use shopkeep_config::model::StorageConfig;
use shopkeep_core::ShopkeepError;
use tracing::debug;

use crate::migrations::run_migrations;

/// A migrated SQLite database behind a single background connection.
pub struct Database {
    conn: tokio_rusqlite::Connection,
    path: String,
}

impl Database {
    /// Open (creating if needed) the database described by `config` and run
    /// pending migrations.
    pub async fn open(config: &StorageConfig) -> Result<Self, ShopkeepError> {
        let path = config.database_path.clone();
        let wal_mode = config.wal_mode;
        let busy_timeout = config.busy_timeout();

        // Schema setup happens on a plain connection before the async one exists.
        let prepare_path = path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), ShopkeepError> {
            if let Some(parent) = Path::new(&prepare_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(ShopkeepError::storage)?;
                }
            }
            let mut conn =
                rusqlite::Connection::open(&prepare_path).map_err(ShopkeepError::storage)?;
            conn.busy_timeout(busy_timeout)
                .map_err(ShopkeepError::storage)?;
            if wal_mode {
                let mode: String = conn
                    .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                    .map_err(ShopkeepError::storage)?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            run_migrations(&mut conn)
        })
        .await
        .map_err(|e| ShopkeepError::Internal(format!("database setup task failed: {e}")))??;

        let conn = tokio_rusqlite::Connection::open(&path)
            .await
            .map_err(ShopkeepError::storage)?;
        conn.call(move |conn| -> Result<(), rusqlite::Error> {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path = %path, "database opened");
        Ok(Self { conn, path })
    }

    /// Open a database at `path` with default storage settings.
    pub async fn open_path(path: &str) -> Result<Self, ShopkeepError> {
        let config = StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        };
        Self::open(&config).await
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Path the database was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run `SELECT 1` to prove the connection is alive.
    pub async fn ping(&self) -> Result<(), ShopkeepError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Fold the WAL back into the main database file.
    pub async fn checkpoint(&self) -> Result<(), ShopkeepError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!(path = %self.path, "WAL checkpoint complete");
        Ok(())
    }

    /// Close the background connection.
    pub async fn close(self) -> Result<(), ShopkeepError> {
        self.conn.close().await.map_err(ShopkeepError::storage)
    }
}

/// Convert a tokio-rusqlite error into [`ShopkeepError::Storage`].
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> ShopkeepError {
    ShopkeepError::Storage {
        source: Box::new(e),
    }
}

/// Current time as unix epoch milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
