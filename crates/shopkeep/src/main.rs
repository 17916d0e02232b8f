// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shopkeep - transactional execution and asynchronous recovery engine.
//!
//! This is the binary entry point: it runs recovery workers and offers
//! commands to create, inspect and cancel recovery tasks.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod commands;
mod serve;
mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use shopkeep_config::ShopkeepConfig;
use shopkeep_core::ShopkeepError;
use shopkeep_recovery::TaskType;

use crate::app::AppContext;

/// Shopkeep - transactional execution and asynchronous recovery engine.
#[derive(Parser, Debug)]
#[command(name = "shopkeep", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run recovery workers until SIGINT/SIGTERM.
    Serve {
        /// Number of workers (overrides `recovery.workers`).
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Create, inspect or cancel recovery tasks.
    Task {
        #[command(subcommand)]
        action: TaskCommands,
    },
    /// Show adapter health and queue depth.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand, Debug)]
enum TaskCommands {
    /// Create a recovery task and enqueue it.
    Create {
        /// order-recovery, payment-recovery, inventory-recovery or refund-recovery.
        task_type: TaskType,
        /// JSON object handed to the repair handler.
        #[arg(long)]
        payload: String,
        /// Attempts before the task fails (default `recovery.default_max_retries`).
        #[arg(long)]
        max_retries: Option<u32>,
        #[arg(long)]
        json: bool,
    },
    /// Show one task.
    Status {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// Cancel a pending or running task.
    Cancel {
        id: String,
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => shopkeep_config::load_and_validate_path(path),
        None => shopkeep_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            shopkeep_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.service.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: ShopkeepConfig) -> Result<(), ShopkeepError> {
    let Some(command) = command else {
        println!("shopkeep: use --help for available commands");
        return Ok(());
    };
    if let Commands::Config = command {
        return commands::show_config(&config);
    }

    let ctx = Arc::new(AppContext::open(config).await?);
    let outcome = match command {
        Commands::Serve { workers } => return serve::run_serve(ctx, workers).await,
        Commands::Task { action } => match action {
            TaskCommands::Create {
                task_type,
                payload,
                max_retries,
                json,
            } => commands::task_create(&ctx, task_type, &payload, max_retries, json)
                .await
                .map(drop),
            TaskCommands::Status { id, json } => {
                commands::task_status(&ctx, &id, json).await.map(drop)
            }
            TaskCommands::Cancel { id, json } => {
                commands::task_cancel(&ctx, &id, json).await.map(drop)
            }
        },
        Commands::Status { json, plain } => commands::status(&ctx, json, plain).await,
        Commands::Config => Ok(()),
    };
    ctx.close().await;
    outcome
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` takes precedence over the configured level. Logs go to stderr
/// so command output on stdout stays machine-readable.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "shopkeep={log_level},shopkeep_txn={log_level},shopkeep_recovery={log_level},shopkeep_storage={log_level},warn"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
