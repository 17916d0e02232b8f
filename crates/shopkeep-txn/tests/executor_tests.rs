// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the transaction and savepoint executors.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use shopkeep_core::{IsolationLevel, ShopkeepError, TransactionalStore};
use shopkeep_test_utils::MockStore;
use shopkeep_txn::{Compensation, TransactionExecutor, TransactionOptions};

fn ok() -> Result<(), ShopkeepError> {
    Ok(())
}

fn fail(message: &str) -> Result<(), ShopkeepError> {
    Err(ShopkeepError::execution(message))
}

fn setup() -> (MockStore, TransactionExecutor) {
    let store = MockStore::new();
    let executor = TransactionExecutor::new(Arc::new(store.clone()));
    (store, executor)
}

fn quick_options() -> TransactionOptions {
    TransactionOptions::default().with_retry_interval(Duration::from_millis(100))
}

fn recording(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Compensation {
    let log = Arc::clone(log);
    Compensation::new(name, move || {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(name);
            Ok(())
        }
    })
}

#[tokio::test(start_paused = true)]
async fn succeeding_work_commits_on_first_attempt() {
    let (store, executor) = setup();

    let result = executor
        .execute(
            |txn| {
                Box::pin(async move {
                    txn.put("orders", "o-1", json!({"status": "pending"})).await
                })
            },
            &TransactionOptions::default(),
        )
        .await;

    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.attempts, 1);
    assert!(!result.compensation_executed);
    assert_eq!(store.commits(), 1);
    assert_eq!(store.rollbacks(), 0);
    assert_eq!(
        store.document("orders", "o-1"),
        Some(json!({"status": "pending"}))
    );
}

#[tokio::test(start_paused = true)]
async fn work_failing_twice_succeeds_on_third_attempt() {
    let (store, executor) = setup();
    let calls = AtomicU32::new(0);

    let result = executor
        .execute(
            |txn| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    txn.put("payments", "p-1", json!({"attempt": n})).await?;
                    if n < 3 { fail("gateway busy") } else { ok() }
                })
            },
            &TransactionOptions::default(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(store.begins(), 3);
    assert_eq!(store.rollbacks(), 2);
    assert_eq!(store.commits(), 1);
    assert_eq!(store.document("payments", "p-1"), Some(json!({"attempt": 3})));
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_run_compensations_in_order() {
    let (store, executor) = setup();
    let calls = AtomicU32::new(0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let options = quick_options()
        .with_retry_count(2)
        .with_compensation(recording("release_inventory", &log))
        .with_compensation(recording("void_payment", &log));

    let result = executor
        .execute(
            |txn| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    txn.put("orders", "o-2", json!({"status": "paid"})).await?;
                    fail("card declined")
                })
            },
            &options,
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(result.compensation_executed);
    assert_eq!(*log.lock().unwrap(), ["release_inventory", "void_payment"]);
    assert_eq!(result.compensations.len(), 2);
    assert_eq!(result.failed_compensations().count(), 0);
    assert!(matches!(result.error, Some(ShopkeepError::Execution(ref m)) if m == "card declined"));
    assert_eq!(store.commits(), 0);
    assert_eq!(store.rollbacks(), 3);
    assert_eq!(store.document("orders", "o-2"), None);
}

#[tokio::test(start_paused = true)]
async fn timeout_stops_work_and_compensates_without_commit() {
    let (store, executor) = setup();
    let calls = AtomicU32::new(0);
    let log = Arc::new(Mutex::new(Vec::new()));
    let options = TransactionOptions::default()
        .with_timeout(Duration::from_millis(10))
        .with_compensation(recording("cancel_shipment", &log));

    let result = executor
        .execute(
            |txn| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    txn.put("orders", "o-3", json!({"status": "shipped"})).await
                })
            },
            &options,
        )
        .await;

    assert!(!result.success);
    assert!(result.timed_out());
    assert!(result.compensation_executed);
    assert_eq!(result.attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(*log.lock().unwrap(), ["cancel_shipment"]);
    assert_eq!(store.commits(), 0);
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.open_transactions(), 0);
    assert!(result.duration < Duration::from_millis(50));
}

#[tokio::test(start_paused = true)]
async fn deadline_during_retry_wait_ends_with_timeout() {
    let (store, executor) = setup();
    let calls = AtomicU32::new(0);
    let options = TransactionOptions::default()
        .with_timeout(Duration::from_millis(1500))
        .with_retry_interval(Duration::from_secs(1))
        .with_retry_count(5);

    let result = executor
        .execute(
            |_txn| {
                calls.fetch_add(1, Ordering::SeqCst);
                Box::pin(async move { fail("still locked") })
            },
            &options,
        )
        .await;

    assert!(!result.success);
    assert!(result.timed_out());
    assert_eq!(result.attempts, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(store.commits(), 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_work_is_contained_and_retried() {
    let (store, executor) = setup();
    let calls = AtomicU32::new(0);

    let result = executor
        .execute(
            |txn| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    if n == 1 {
                        panic!("index out of range");
                    }
                    txn.put("refunds", "r-1", json!({"status": "requested"})).await
                })
            },
            &quick_options(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.commits(), 1);
}

#[tokio::test(start_paused = true)]
async fn panic_on_every_attempt_reports_panicked() {
    let (store, executor) = setup();

    let result = executor
        .execute(
            |_txn| {
                let explode = true;
                if explode {
                    panic!("constructor blew up");
                }
                Box::pin(async move { ok() })
            },
            &quick_options().with_retry_count(1),
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 2);
    assert!(
        matches!(result.error, Some(ShopkeepError::Panicked(ref m)) if m.contains("constructor blew up"))
    );
    assert_eq!(store.rollbacks(), 2);
    assert_eq!(store.open_transactions(), 0);
}

#[tokio::test(start_paused = true)]
async fn commit_and_begin_failures_count_as_attempts() {
    let (store, executor) = setup();
    store.fail_next_begins(1);
    store.fail_next_commits(1);

    let result = executor
        .execute(
            |txn| Box::pin(async move { txn.put("orders", "o-4", json!({})).await }),
            &quick_options(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 3);
    assert_eq!(store.begins(), 2);
    assert_eq!(store.commits(), 1);
}

#[tokio::test(start_paused = true)]
async fn isolation_level_is_passed_to_store() {
    let (store, executor) = setup();
    let options = quick_options().with_isolation(IsolationLevel::Serializable);

    let result = executor
        .execute(|_txn| Box::pin(async move { ok() }), &options)
        .await;

    assert!(result.success);
    assert_eq!(store.isolation_levels(), vec![IsolationLevel::Serializable]);
}

#[tokio::test(start_paused = true)]
async fn failed_savepoint_keeps_prior_work_and_sibling_succeeds() {
    let (store, executor) = setup();
    let options = quick_options().with_retry_count(1);

    let mut txn = store.begin(IsolationLevel::ReadCommitted).await.unwrap();
    txn.put("orders", "o-5", json!({"status": "pending"}))
        .await
        .unwrap();

    let charge = executor
        .execute_in_savepoint(
            txn.as_mut(),
            |txn| {
                Box::pin(async move {
                    txn.put("payments", "p-5", json!({"status": "charged"}))
                        .await?;
                    fail("insufficient funds")
                })
            },
            "charge_payment",
            &options,
        )
        .await;
    assert!(!charge.success);
    assert_eq!(charge.attempts, 2);
    assert!(charge.compensation_executed);

    let reserve = executor
        .execute_in_savepoint(
            txn.as_mut(),
            |txn| {
                Box::pin(async move {
                    txn.put("products", "sku-1", json!({"stock": 4})).await
                })
            },
            "reserve_inventory",
            &options,
        )
        .await;
    assert!(reserve.success);
    assert_eq!(reserve.attempts, 1);

    txn.commit().await.unwrap();

    assert_eq!(
        store.document("orders", "o-5"),
        Some(json!({"status": "pending"}))
    );
    assert_eq!(store.document("payments", "p-5"), None);
    assert_eq!(store.document("products", "sku-1"), Some(json!({"stock": 4})));
    assert_eq!(store.begins(), 1);
    assert_eq!(store.commits(), 1);
}

#[tokio::test(start_paused = true)]
async fn execute_with_savepoint_retries_within_one_transaction() {
    let (store, executor) = setup();
    let calls = AtomicU32::new(0);

    let result = executor
        .execute_with_savepoint(
            |txn| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                Box::pin(async move {
                    txn.put("inventory_holds", &format!("h-{n}"), json!({"qty": 1}))
                        .await?;
                    if n < 2 { fail("lock contention") } else { ok() }
                })
            },
            "hold_stock",
            &quick_options(),
        )
        .await;

    assert!(result.success);
    assert_eq!(result.attempts, 2);
    assert_eq!(store.begins(), 1);
    assert_eq!(store.commits(), 1);
    assert_eq!(store.savepoint_rollbacks(), 1);
    assert_eq!(store.document("inventory_holds", "h-1"), None);
    assert!(store.document("inventory_holds", "h-2").is_some());
}

#[tokio::test(start_paused = true)]
async fn execute_with_savepoint_failure_rolls_back_and_compensates() {
    let (store, executor) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    let options = quick_options()
        .with_retry_count(0)
        .with_compensation(recording("notify_customer", &log));

    let result = executor
        .execute_with_savepoint(
            |txn| {
                Box::pin(async move {
                    txn.put("refunds", "r-9", json!({"status": "processing"}))
                        .await?;
                    fail("processor offline")
                })
            },
            "issue_refund",
            &options,
        )
        .await;

    assert!(!result.success);
    assert!(result.compensation_executed);
    assert_eq!(*log.lock().unwrap(), ["notify_customer"]);
    assert_eq!(store.commits(), 0);
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.document("refunds", "r-9"), None);
}

#[tokio::test]
async fn invalid_savepoint_name_fails_before_touching_store() {
    let (store, executor) = setup();
    let log = Arc::new(Mutex::new(Vec::new()));
    let options = quick_options().with_compensation(recording("never", &log));

    let result = executor
        .execute_with_savepoint(
            |_txn| Box::pin(async move { ok() }),
            "bad name; --",
            &options,
        )
        .await;

    assert!(!result.success);
    assert_eq!(result.attempts, 0);
    assert!(!result.compensation_executed);
    assert!(matches!(result.error, Some(ShopkeepError::InvalidArgument(_))));
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(store.begins(), 0);
}
