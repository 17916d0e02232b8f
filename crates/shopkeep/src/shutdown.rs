// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown on SIGTERM and SIGINT (Ctrl+C).

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shopkeep_core::ShopkeepError;

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal
/// arrives. Workers check it between iterations and finish the task they
/// hold before exiting.
pub fn install_signal_handler() -> Result<CancellationToken, ShopkeepError> {
    let token = CancellationToken::new();
    let trigger = token.clone();

    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate()).map_err(|e| {
            ShopkeepError::Internal(format!("failed to install SIGTERM handler: {e}"))
        })?
    };

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating shutdown"),
            _ = sigterm.recv() => info!("received SIGTERM, initiating shutdown"),
            _ = trigger.cancelled() => {}
        }

        #[cfg(not(unix))]
        tokio::select! {
            _ = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
            _ = trigger.cancelled() => {}
        }

        trigger.cancel();
        debug!("shutdown signal handler completed");
    });

    Ok(token)
}
