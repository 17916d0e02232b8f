// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests over the SQLite adapters.
//!
//! Each test opens its own temporary database with both the transactional
//! store and the KV queue on it, the same wiring `shopkeep serve` uses.
//! Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use shopkeep_config::ShopkeepConfig;
use shopkeep_core::{IsolationLevel, PluginAdapter, ShopkeepError, TransactionalStore};
use shopkeep_recovery::repair::{INVENTORY_RELEASES, ORDERS, PRODUCTS};
use shopkeep_recovery::{
    HandlerRegistry, LogAlertSink, ProcessOutcome, RecoveryPlan, RecoveryQueue, RecoveryService,
    RecoveryWorker, TaskRepository, TaskStatus, TaskType, WorkerSettings,
    register_builtin_handlers,
};
use shopkeep_storage::{SqliteKv, SqliteStore};
use shopkeep_txn::{Compensation, TransactionExecutor, TransactionOptions};

fn fail(message: &str) -> Result<(), ShopkeepError> {
    Err(ShopkeepError::execution(message))
}

struct Stack {
    _dir: TempDir,
    config: ShopkeepConfig,
    store: Arc<SqliteStore>,
    kv: Arc<SqliteKv>,
    executor: TransactionExecutor,
    service: RecoveryService,
}

impl Stack {
    async fn open() -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = ShopkeepConfig::default();
        config.storage.database_path = dir.path().join("shopkeep.db").display().to_string();
        config.storage.poll_interval_ms = 20;
        config.recovery.dequeue_timeout_ms = 100;
        config.recovery.not_due_delay_ms = 50;
        Self::with_config(dir, config).await
    }

    async fn with_config(dir: TempDir, config: ShopkeepConfig) -> Self {
        let store = Arc::new(SqliteStore::open(&config.storage).await.unwrap());
        let kv = Arc::new(SqliteKv::open(&config.storage).await.unwrap());
        let executor = TransactionExecutor::new(store.clone());
        let service = RecoveryService::new(
            TaskRepository::from_config(kv.clone(), &config.recovery),
            RecoveryQueue::from_config(kv.clone(), &config.recovery),
            &config.recovery,
        );
        Self {
            _dir: dir,
            config,
            store,
            kv,
            executor,
            service,
        }
    }

    fn options(&self) -> TransactionOptions {
        TransactionOptions::from_config(&self.config.executor)
            .with_retry_count(0)
            .with_timeout(Duration::from_secs(5))
    }

    fn worker(&self, id: usize) -> RecoveryWorker {
        let mut registry = HandlerRegistry::new();
        register_builtin_handlers(&mut registry, &self.executor, &self.options());
        RecoveryWorker::new(
            self.service.repository().clone(),
            self.service.queue().clone(),
            Arc::new(registry),
            Arc::new(LogAlertSink),
            WorkerSettings::from_config(&self.config.recovery),
        )
        .with_id(id)
    }

    async fn seed(&self, collection: &str, key: &str, value: Value) {
        let mut txn = self.store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        txn.put(collection, key, value).await.unwrap();
        txn.commit().await.unwrap();
    }

    async fn read(&self, collection: &str, key: &str) -> Option<Value> {
        let mut txn = self.store.begin(IsolationLevel::ReadCommitted).await.unwrap();
        let value = txn.get(collection, key).await.unwrap();
        txn.rollback().await.unwrap();
        value
    }
}

// ---- Transaction executor over SQLite ----

#[tokio::test]
async fn committed_work_is_visible_to_later_transactions() {
    let stack = Stack::open().await;

    let result = stack
        .executor
        .execute(
            |txn| {
                Box::pin(async move {
                    txn.put(ORDERS, "o-1", json!({"status": "pending", "total": 25}))
                        .await?;
                    txn.put(PRODUCTS, "sku-1", json!({"stock": 9})).await
                })
            },
            &stack.options(),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.attempts, 1);
    assert_eq!(
        stack.read(ORDERS, "o-1").await,
        Some(json!({"status": "pending", "total": 25}))
    );
    assert_eq!(stack.read(PRODUCTS, "sku-1").await, Some(json!({"stock": 9})));
}

#[tokio::test]
async fn failed_work_is_rolled_back_and_compensated() {
    let stack = Stack::open().await;
    let compensated = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let flag = Arc::clone(&compensated);
    let options = stack
        .options()
        .with_retry_count(1)
        .with_retry_interval(Duration::from_millis(10))
        .with_compensation(Compensation::new("release-reservation", move || {
            let flag = Arc::clone(&flag);
            async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        }));

    let result = stack
        .executor
        .execute(
            |txn| {
                Box::pin(async move {
                    txn.put(ORDERS, "o-2", json!({"status": "pending"})).await?;
                    fail("card declined")
                })
            },
            &options,
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert!(result.compensation_executed);
    assert!(compensated.load(std::sync::atomic::Ordering::SeqCst));
    assert_eq!(stack.read(ORDERS, "o-2").await, None);
}

#[tokio::test]
async fn failed_savepoint_keeps_rest_of_transaction() {
    let stack = Stack::open().await;
    let options = stack.options();

    let mut txn = stack.store.begin(IsolationLevel::Serializable).await.unwrap();
    txn.put(ORDERS, "o-3", json!({"status": "pending"}))
        .await
        .unwrap();

    let step = stack
        .executor
        .execute_in_savepoint(
            txn.as_mut(),
            |txn| {
                Box::pin(async move {
                    txn.put(PRODUCTS, "sku-3", json!({"stock": 0})).await?;
                    fail("stock check failed")
                })
            },
            "reserve_stock",
            &options,
        )
        .await;
    assert!(!step.success);

    let step = stack
        .executor
        .execute_in_savepoint(
            txn.as_mut(),
            |txn| {
                Box::pin(async move {
                    txn.put(ORDERS, "o-3", json!({"status": "confirmed"})).await
                })
            },
            "confirm",
            &options,
        )
        .await;
    assert!(step.success);
    txn.commit().await.unwrap();

    assert_eq!(
        stack.read(ORDERS, "o-3").await,
        Some(json!({"status": "confirmed"}))
    );
    assert_eq!(stack.read(PRODUCTS, "sku-3").await, None);
}

#[tokio::test]
async fn execute_with_savepoint_commits_on_success() {
    let stack = Stack::open().await;

    let result = stack
        .executor
        .execute_with_savepoint(
            |txn| Box::pin(async move { txn.put(ORDERS, "o-4", json!({"status": "paid"})).await }),
            "pay",
            &stack.options(),
        )
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(stack.read(ORDERS, "o-4").await, Some(json!({"status": "paid"})));
}

// ---- Recovery over SQLite ----

#[tokio::test]
async fn failed_order_is_repaired_by_worker() {
    let stack = Stack::open().await;
    stack
        .seed(ORDERS, "o-5", json!({"status": "processing", "total": 70}))
        .await;

    let outcome = stack
        .service
        .execute_with_recovery(
            &stack.executor,
            |_txn| Box::pin(async move { fail("payment provider unavailable") }),
            &stack.options(),
            RecoveryPlan::new(TaskType::OrderRecovery, json!({"order_id": "o-5"})),
        )
        .await;
    assert!(!outcome.result.success);
    let task = outcome.recovery_task.expect("recovery task created");
    assert_eq!(stack.service.queue_depth().await.unwrap(), 1);

    let worker = stack.worker(0);
    assert_eq!(worker.process_next().await.unwrap(), ProcessOutcome::Completed);

    let order = stack.read(ORDERS, "o-5").await.unwrap();
    assert_eq!(order["status"], "cancelled");
    assert_eq!(
        stack.service.get_task(&task.id).await.unwrap().status,
        TaskStatus::Completed
    );
}

#[tokio::test]
async fn repair_of_missing_record_is_rescheduled() {
    let stack = Stack::open().await;
    let task = stack
        .service
        .create_task(TaskType::RefundRecovery, json!({"refund_id": "r-404"}), Some(3))
        .await
        .unwrap();

    assert_eq!(
        stack.worker(0).process_next().await.unwrap(),
        ProcessOutcome::Rescheduled
    );
    let after = stack.service.get_task(&task.id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Pending);
    assert_eq!(after.retry_count, 1);
    assert!(after.error.contains("refunds/r-404"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_restock_each_reservation_once() {
    let stack = Stack::open().await;
    stack.seed(PRODUCTS, "sku-9", json!({"stock": 10})).await;

    let mut ids = Vec::new();
    for n in 0..6 {
        let task = stack
            .service
            .create_task(
                TaskType::InventoryRecovery,
                json!({"product_id": "sku-9", "quantity": 1, "reservation_id": format!("res-{n}")}),
                None,
            )
            .await
            .unwrap();
        ids.push(task.id);
    }

    let shutdown = CancellationToken::new();
    let mut handles = Vec::new();
    for n in 0..3 {
        let worker = stack.worker(n);
        let token = shutdown.clone();
        handles.push(tokio::spawn(async move { worker.run(token).await }));
    }

    let service = stack.service.clone();
    let drained = async {
        loop {
            let mut completed = 0;
            for id in &ids {
                if service.get_task(id).await.unwrap().status == TaskStatus::Completed {
                    completed += 1;
                }
            }
            if completed == ids.len() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(20), drained)
        .await
        .expect("workers did not complete every task");

    shutdown.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }

    assert_eq!(stack.read(PRODUCTS, "sku-9").await.unwrap()["stock"], 16);
    for n in 0..6 {
        let reservation = format!("res-{n}");
        assert!(stack.read(INVENTORY_RELEASES, &reservation).await.is_some());
    }
    assert_eq!(stack.service.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn tasks_survive_reopening_the_database() {
    let stack = Stack::open().await;
    let task = stack
        .service
        .create_task(TaskType::PaymentRecovery, json!({"payment_id": "p-7"}), Some(4))
        .await
        .unwrap();

    stack.store.shutdown().await.unwrap();
    stack.kv.shutdown().await.unwrap();
    let Stack {
        _dir: dir, config, ..
    } = stack;

    let reopened = Stack::with_config(dir, config).await;
    let loaded = reopened.service.get_task(&task.id).await.unwrap();
    assert_eq!(loaded, task);
    assert_eq!(
        reopened
            .service
            .queue()
            .dequeue(Duration::from_millis(100))
            .await
            .unwrap(),
        Some(task.id)
    );
}

// ---- Configuration ----

#[test]
#[serial_test::serial]
fn env_overrides_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shopkeep.toml");
    std::fs::write(
        &path,
        "[recovery]\nworkers = 2\nqueue_key = \"recovery:test\"\n",
    )
    .unwrap();

    // SAFETY: serialized with every other test that touches the environment.
    unsafe { std::env::set_var("SHOPKEEP_RECOVERY_WORKERS", "5") };
    let loaded = shopkeep_config::load_and_validate_path(&path);
    unsafe { std::env::remove_var("SHOPKEEP_RECOVERY_WORKERS") };

    let config = loaded.expect("config should load");
    assert_eq!(config.recovery.workers, 5);
    assert_eq!(config.recovery.queue_key, "recovery:test");
}

#[test]
#[serial_test::serial]
fn invalid_config_file_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shopkeep.toml");
    std::fs::write(&path, "[recovery]\nbackoff_unit_secs = 0\n").unwrap();

    let errors = shopkeep_config::load_and_validate_path(&path).unwrap_err();
    assert!(!errors.is_empty());
}
