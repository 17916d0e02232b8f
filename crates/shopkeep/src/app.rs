// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Application context: every long-lived component, built once from the
//! configuration and passed explicitly to the commands that need it.

use std::sync::Arc;

use tracing::{info, warn};

use shopkeep_config::ShopkeepConfig;
use shopkeep_core::{HealthStatus, PluginAdapter, ShopkeepError};
use shopkeep_recovery::{
    HandlerRegistry, LogAlertSink, RecoveryQueue, RecoveryService, RecoveryWorker, TaskRepository,
    WorkerSettings, register_builtin_handlers,
};
use shopkeep_storage::{SqliteKv, SqliteStore};
use shopkeep_txn::{TransactionExecutor, TransactionOptions};

/// Everything a command needs, opened once from the loaded configuration.
pub struct AppContext {
    /// The validated configuration.
    pub config: ShopkeepConfig,
    /// Transactional document store.
    pub store: Arc<SqliteStore>,
    /// KV store holding task records and the queue.
    pub kv: Arc<SqliteKv>,
    /// Executor over `store`, used by the built-in repair handlers.
    pub executor: TransactionExecutor,
    pub service: RecoveryService,
    /// Built-in handlers for every task type.
    pub registry: Arc<HandlerRegistry>,
}

impl AppContext {
    /// Open both SQLite adapters on the configured database and wire the
    /// executor, recovery service and built-in repair handlers.
    pub async fn open(config: ShopkeepConfig) -> Result<Self, ShopkeepError> {
        // Opened one after the other so only one connection runs migrations.
        let store = Arc::new(SqliteStore::open(&config.storage).await?);
        let kv = Arc::new(SqliteKv::open(&config.storage).await?);

        let executor = TransactionExecutor::new(store.clone());
        let repository = TaskRepository::from_config(kv.clone(), &config.recovery);
        let queue = RecoveryQueue::from_config(kv.clone(), &config.recovery);
        let service = RecoveryService::new(repository, queue, &config.recovery);

        let mut registry = HandlerRegistry::new();
        let options = TransactionOptions::from_config(&config.executor);
        register_builtin_handlers(&mut registry, &executor, &options);

        info!(
            database = %config.storage.database_path,
            handlers = registry.len(),
            "application context ready"
        );
        Ok(Self {
            config,
            store,
            kv,
            executor,
            service,
            registry: Arc::new(registry),
        })
    }

    /// A worker over the shared queue, numbered `id` in logs.
    pub fn worker(&self, id: usize) -> RecoveryWorker {
        RecoveryWorker::new(
            self.service.repository().clone(),
            self.service.queue().clone(),
            Arc::clone(&self.registry),
            Arc::new(LogAlertSink),
            WorkerSettings::from_config(&self.config.recovery),
        )
        .with_id(id)
    }

    /// Health of the store and KV adapters, in that order.
    pub async fn health(&self) -> Vec<(String, HealthStatus)> {
        let adapters: [&dyn PluginAdapter; 2] = [self.store.as_ref(), self.kv.as_ref()];
        let mut report = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            let status = adapter
                .health_check()
                .await
                .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
            report.push((adapter.name().to_string(), status));
        }
        report
    }

    /// Shut both adapters down. Errors are logged, not returned.
    pub async fn close(&self) {
        if let Err(e) = self.store.shutdown().await {
            warn!(error = %e, "store shutdown failed");
        }
        if let Err(e) = self.kv.shutdown().await {
            warn!(error = %e, "kv shutdown failed");
        }
    }
}
