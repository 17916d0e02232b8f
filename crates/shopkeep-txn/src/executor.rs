// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction executor: runs caller work inside a store transaction with a
//! deadline, bounded retries and compensation on definitive failure.
//!
//! Work is a closure producing a boxed future that borrows the open
//! transaction, so it can be invoked once per attempt:
//!
//! ```ignore
//! let result = executor
//!     .execute(
//!         |txn| Box::pin(async move {
//!             txn.put("orders", "o-1", json!({"status": "pending"})).await
//!         }),
//!         &TransactionOptions::default(),
//!     )
//!     .await;
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use shopkeep_core::traits::store::is_valid_savepoint_name;
use shopkeep_core::{ShopkeepError, StoreTxn, TransactionalStore, panic_message};

use crate::compensation::run_compensations;
use crate::options::TransactionOptions;
use crate::result::TransactionResult;

/// Runs work closures against a [`TransactionalStore`].
///
/// Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct TransactionExecutor {
    store: Arc<dyn TransactionalStore>,
}

impl TransactionExecutor {
    pub fn new(store: Arc<dyn TransactionalStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TransactionalStore> {
        &self.store
    }

    /// Run `work` in a fresh transaction per attempt.
    ///
    /// Each attempt begins a transaction, runs `work` and commits. A failed
    /// attempt (error, panic or failed commit) is rolled back and retried
    /// after `retry_interval`, up to `retry_count` more times. A timeout is
    /// never retried. Once no attempt is left, every compensation runs.
    pub async fn execute<F>(&self, work: F, options: &TransactionOptions) -> TransactionResult
    where
        F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>>
            + Send
            + Sync,
    {
        let started = Instant::now();
        let deadline = started + options.timeout;
        let mut attempts = 0;

        let error = loop {
            attempts += 1;
            let error = match self.attempt(&work, options, deadline).await {
                Ok(()) => {
                    if options.log_enabled {
                        debug!(attempts, "transaction committed");
                    }
                    return TransactionResult::succeeded(attempts, started.elapsed());
                }
                Err(e) => e,
            };
            if options.log_enabled {
                warn!(attempt = attempts, error = %error, "transaction attempt failed");
            }
            if error.is_timeout() || attempts > options.retry_count {
                break error;
            }
            if let Err(timeout) = wait_before_retry(options, deadline).await {
                break timeout;
            }
        };

        self.fail(error, attempts, started.elapsed(), options).await
    }

    /// Run `work` inside savepoint `name` of a transaction opened for this
    /// call. Retries roll back to the savepoint instead of reopening the
    /// transaction. On success the transaction is committed.
    pub async fn execute_with_savepoint<F>(
        &self,
        work: F,
        name: &str,
        options: &TransactionOptions,
    ) -> TransactionResult
    where
        F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>>
            + Send
            + Sync,
    {
        let started = Instant::now();
        if let Err(e) = check_savepoint_name(name) {
            return TransactionResult::failed(e, 0, started.elapsed(), None);
        }
        let deadline = started + options.timeout;

        let mut txn = match self.begin(options, deadline).await {
            Ok(txn) => txn,
            Err(e) => {
                if options.log_enabled {
                    warn!(savepoint = name, error = %e, "could not open transaction");
                }
                return self.fail(e, 0, started.elapsed(), options).await;
            }
        };

        let (outcome, attempts) =
            run_in_savepoint(txn.as_mut(), &work, name, options, deadline).await;
        let outcome = match outcome {
            Ok(()) => txn.commit().await,
            Err(e) => {
                rollback_logged(txn).await;
                Err(e)
            }
        };

        match outcome {
            Ok(()) => {
                if options.log_enabled {
                    debug!(savepoint = name, attempts, "savepoint work committed");
                }
                TransactionResult::succeeded(attempts, started.elapsed())
            }
            Err(e) => self.fail(e, attempts, started.elapsed(), options).await,
        }
    }

    /// Run `work` inside savepoint `name` of a transaction the caller owns.
    ///
    /// On failure only the savepoint's work is undone; everything the caller
    /// did in `txn` before stays and the caller may continue and commit. On
    /// success the savepoint is released. Committing is left to the caller.
    pub async fn execute_in_savepoint<F>(
        &self,
        txn: &mut dyn StoreTxn,
        work: F,
        name: &str,
        options: &TransactionOptions,
    ) -> TransactionResult
    where
        F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>>
            + Send
            + Sync,
    {
        let started = Instant::now();
        if let Err(e) = check_savepoint_name(name) {
            return TransactionResult::failed(e, 0, started.elapsed(), None);
        }
        let deadline = started + options.timeout;

        match run_in_savepoint(txn, &work, name, options, deadline).await {
            (Ok(()), attempts) => TransactionResult::succeeded(attempts, started.elapsed()),
            (Err(e), attempts) => self.fail(e, attempts, started.elapsed(), options).await,
        }
    }

    async fn begin(
        &self,
        options: &TransactionOptions,
        deadline: Instant,
    ) -> Result<Box<dyn StoreTxn>, ShopkeepError> {
        timeout_at(deadline, self.store.begin(options.isolation))
            .await
            .map_err(|_| ShopkeepError::Timeout {
                duration: options.timeout,
            })?
    }

    async fn attempt<F>(
        &self,
        work: &F,
        options: &TransactionOptions,
        deadline: Instant,
    ) -> Result<(), ShopkeepError>
    where
        F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>>
            + Send
            + Sync,
    {
        let mut txn = self.begin(options, deadline).await?;
        match run_work(work, txn.as_mut(), options.timeout, deadline).await {
            Ok(()) => txn.commit().await,
            Err(e) => {
                rollback_logged(txn).await;
                Err(e)
            }
        }
    }

    async fn fail(
        &self,
        error: ShopkeepError,
        attempts: u32,
        elapsed: Duration,
        options: &TransactionOptions,
    ) -> TransactionResult {
        if options.log_enabled {
            info!(
                attempts,
                error = %error,
                compensations = options.compensations.len(),
                "transaction failed, running compensations"
            );
        }
        let reports = run_compensations(&options.compensations, options.log_enabled).await;
        TransactionResult::failed(error, attempts, elapsed, Some(reports))
    }
}

/// Savepoint body shared by both savepoint entry points. Returns the outcome
/// and the number of times `work` was started. On failure the savepoint's
/// work has been undone and the savepoint released.
async fn run_in_savepoint<F>(
    txn: &mut dyn StoreTxn,
    work: &F,
    name: &str,
    options: &TransactionOptions,
    deadline: Instant,
) -> (Result<(), ShopkeepError>, u32)
where
    F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>> + Send + Sync,
{
    if let Err(e) = txn.savepoint(name).await {
        return (Err(e), 0);
    }

    let mut attempts = 0;
    let error = loop {
        attempts += 1;
        let error = match run_work(work, &mut *txn, options.timeout, deadline).await {
            Ok(()) => match txn.release_savepoint(name).await {
                Ok(()) => return (Ok(()), attempts),
                Err(e) => e,
            },
            Err(e) => e,
        };
        if options.log_enabled {
            warn!(savepoint = name, attempt = attempts, error = %error, "savepoint attempt failed");
        }
        if error.is_timeout() || attempts > options.retry_count {
            break error;
        }
        if let Err(e) = txn.rollback_to_savepoint(name).await {
            break e;
        }
        if let Err(timeout) = wait_before_retry(options, deadline).await {
            break timeout;
        }
    };

    // ROLLBACK TO keeps the savepoint open; RELEASE then discards it.
    let undone = match txn.rollback_to_savepoint(name).await {
        Ok(()) => txn.release_savepoint(name).await,
        Err(e) => Err(e),
    };
    if let Err(e) = undone {
        warn!(savepoint = name, error = %e, "failed to roll back savepoint");
    }
    (Err(error), attempts)
}

/// Run one invocation of `work`, bounded by `deadline`, with panics turned
/// into [`ShopkeepError::Panicked`].
async fn run_work<F>(
    work: &F,
    txn: &mut dyn StoreTxn,
    timeout: Duration,
    deadline: Instant,
) -> Result<(), ShopkeepError>
where
    F: for<'a> Fn(&'a mut dyn StoreTxn) -> BoxFuture<'a, Result<(), ShopkeepError>> + Send + Sync,
{
    let guarded = AssertUnwindSafe(async move { work(txn).await }).catch_unwind();
    match timeout_at(deadline, guarded).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(payload)) => Err(ShopkeepError::Panicked(panic_message(payload.as_ref()))),
        Err(_) => Err(ShopkeepError::Timeout { duration: timeout }),
    }
}

/// Sleep `retry_interval`, or fail with a timeout if the deadline comes first.
async fn wait_before_retry(
    options: &TransactionOptions,
    deadline: Instant,
) -> Result<(), ShopkeepError> {
    timeout_at(deadline, tokio::time::sleep(options.retry_interval))
        .await
        .map_err(|_| ShopkeepError::Timeout {
            duration: options.timeout,
        })
}

async fn rollback_logged(txn: Box<dyn StoreTxn>) {
    if let Err(e) = txn.rollback().await {
        warn!(error = %e, "transaction rollback failed");
    }
}

fn check_savepoint_name(name: &str) -> Result<(), ShopkeepError> {
    if is_valid_savepoint_name(name) {
        Ok(())
    } else {
        Err(ShopkeepError::InvalidArgument(format!(
            "invalid savepoint name `{name}`"
        )))
    }
}
