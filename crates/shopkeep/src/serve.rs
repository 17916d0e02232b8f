// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `shopkeep serve` command implementation.
//!
//! Runs the configured number of recovery workers over the shared queue,
//! plus a housekeeping loop that purges expired KV entries, until SIGINT or
//! SIGTERM. Workers finish the task they hold before the process exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use shopkeep_core::ShopkeepError;

use crate::app::AppContext;
use crate::shutdown;

const PURGE_INTERVAL: Duration = Duration::from_secs(600);

/// Runs the `shopkeep serve` command.
pub async fn run_serve(ctx: Arc<AppContext>, workers: Option<usize>) -> Result<(), ShopkeepError> {
    let workers = workers.unwrap_or(ctx.config.recovery.workers);
    if workers == 0 {
        return Err(ShopkeepError::InvalidArgument(
            "at least one worker is required".to_string(),
        ));
    }

    let token = shutdown::install_signal_handler()?;
    info!(
        service = %ctx.config.service.name,
        workers,
        queue = %ctx.config.recovery.queue_key,
        "starting shopkeep serve"
    );

    run_workers(Arc::clone(&ctx), workers, token).await;

    ctx.close().await;
    info!("shopkeep serve stopped");
    Ok(())
}

/// Runs `workers` recovery workers and the purge loop until `shutdown` is
/// cancelled, then waits for all of them to finish.
pub async fn run_workers(ctx: Arc<AppContext>, workers: usize, shutdown: CancellationToken) {
    let mut tasks = JoinSet::new();
    for id in 0..workers {
        let worker = ctx.worker(id);
        let token = shutdown.clone();
        tasks.spawn(async move { worker.run(token).await });
    }
    tasks.spawn(purge_loop(Arc::clone(&ctx), shutdown.clone()));

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "background task ended abnormally");
            // A dead worker must not leave the rest running unsupervised.
            shutdown.cancel();
        }
    }
}

async fn purge_loop(ctx: Arc<AppContext>, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.cancelled() => break,
        }
        match ctx.kv.purge_expired().await {
            Ok(removed) => debug!(removed, "expired entries purged"),
            Err(e) => warn!(error = %e, "purging expired entries failed"),
        }
    }
}
