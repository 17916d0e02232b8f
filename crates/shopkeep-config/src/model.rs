// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Shopkeep consistency engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use shopkeep_core::IsolationLevel;

/// Top-level Shopkeep configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShopkeepConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// SQLite storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Default transaction executor options.
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Recovery queue and worker settings.
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name used in log lines.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "shopkeep".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Polling interval for blocking list pops when no local push wakes the waiter.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("shopkeep").join("shopkeep.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("shopkeep.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// Default options for the transaction executor.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Deadline for a whole `execute` call, retries included.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retries after the first attempt.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Pause between attempts.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Isolation level requested for each transaction.
    #[serde(default)]
    pub isolation: IsolationLevel,

    /// Emit per-attempt log events.
    #[serde(default = "default_true")]
    pub log_enabled: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            retry_count: default_retry_count(),
            retry_interval_ms: default_retry_interval_ms(),
            isolation: IsolationLevel::default(),
            log_enabled: true,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_interval_ms() -> u64 {
    1_000
}

fn default_true() -> bool {
    true
}

/// Recovery queue and worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RecoveryConfig {
    /// Key of the durable list that carries task ids.
    #[serde(default = "default_queue_key")]
    pub queue_key: String,

    /// Prefix of the keys task records are stored under.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// `max_retries` used when a caller does not pick one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Upper bound accepted for `max_retries` at task creation.
    #[serde(default = "default_max_retries_limit")]
    pub max_retries_limit: u32,

    /// Bounded wait of each blocking dequeue, so workers notice shutdown.
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,

    /// Longest a worker sleeps after re-enqueueing a task that is not yet due.
    #[serde(default = "default_not_due_delay_ms")]
    pub not_due_delay_ms: u64,

    /// Backoff unit: the n-th retry waits `unit * n^2`.
    #[serde(default = "default_backoff_unit_secs")]
    pub backoff_unit_secs: u64,

    /// Cap on a single backoff delay.
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Store-level retention of task records.
    #[serde(default = "default_task_ttl_secs")]
    pub task_ttl_secs: u64,

    /// Number of concurrent worker loops.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            queue_key: default_queue_key(),
            key_prefix: default_key_prefix(),
            default_max_retries: default_max_retries(),
            max_retries_limit: default_max_retries_limit(),
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
            not_due_delay_ms: default_not_due_delay_ms(),
            backoff_unit_secs: default_backoff_unit_secs(),
            backoff_max_secs: default_backoff_max_secs(),
            task_ttl_secs: default_task_ttl_secs(),
            workers: default_workers(),
        }
    }
}

impl RecoveryConfig {
    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn not_due_delay(&self) -> Duration {
        Duration::from_millis(self.not_due_delay_ms)
    }

    pub fn task_ttl(&self) -> Duration {
        Duration::from_secs(self.task_ttl_secs)
    }
}

fn default_queue_key() -> String {
    "recovery:queue".to_string()
}

fn default_key_prefix() -> String {
    "recovery:task:".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_retries_limit() -> u32 {
    50
}

fn default_dequeue_timeout_ms() -> u64 {
    5_000
}

fn default_not_due_delay_ms() -> u64 {
    1_000
}

fn default_backoff_unit_secs() -> u64 {
    60
}

fn default_backoff_max_secs() -> u64 {
    6 * 60 * 60
}

fn default_task_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_workers() -> usize {
    1
}
