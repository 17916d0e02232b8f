// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `task`, `status` and `config` command implementations.

use std::io::IsTerminal;

use colored::Colorize;
use serde::Serialize;
use serde_json::Value;

use shopkeep_config::ShopkeepConfig;
use shopkeep_core::{HealthStatus, ShopkeepError};
use shopkeep_recovery::{RecoveryTask, TaskStatus, TaskType};

use crate::app::AppContext;

/// Parse a payload given on the command line.
pub fn parse_payload(raw: &str) -> Result<Value, ShopkeepError> {
    serde_json::from_str(raw)
        .map_err(|e| ShopkeepError::InvalidArgument(format!("payload is not valid JSON: {e}")))
}

/// `shopkeep task create`
pub async fn task_create(
    ctx: &AppContext,
    task_type: TaskType,
    payload: &str,
    max_retries: Option<u32>,
    json: bool,
) -> Result<RecoveryTask, ShopkeepError> {
    let payload = parse_payload(payload)?;
    let task = ctx
        .service
        .create_task(task_type, payload, max_retries)
        .await?;
    print_task(&task, json)?;
    Ok(task)
}

/// `shopkeep task status`
pub async fn task_status(
    ctx: &AppContext,
    id: &str,
    json: bool,
) -> Result<RecoveryTask, ShopkeepError> {
    let task = ctx.service.get_task(id).await?;
    print_task(&task, json)?;
    Ok(task)
}

/// `shopkeep task cancel`
pub async fn task_cancel(
    ctx: &AppContext,
    id: &str,
    json: bool,
) -> Result<RecoveryTask, ShopkeepError> {
    let task = ctx.service.cancel_task(id).await?;
    print_task(&task, json)?;
    Ok(task)
}

/// Structured output of `shopkeep status --json`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    /// Path of the SQLite database.
    pub database: String,
    /// One entry per storage adapter.
    pub adapters: Vec<AdapterReport>,
    /// KV list holding queued task ids.
    pub queue_key: String,
    /// Ids waiting in that list.
    pub queue_depth: usize,
}

/// Health of one adapter.
#[derive(Debug, Serialize)]
pub struct AdapterReport {
    /// Adapter name, e.g. `sqlite-store`.
    pub name: String,
    /// `healthy`, `degraded` or `unhealthy`.
    pub status: String,
    /// Reason given for a degraded or unhealthy adapter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AdapterReport {
    fn new(name: String, health: HealthStatus) -> Self {
        let (status, detail) = match health {
            HealthStatus::Healthy => ("healthy", None),
            HealthStatus::Degraded(why) => ("degraded", Some(why)),
            HealthStatus::Unhealthy(why) => ("unhealthy", Some(why)),
        };
        Self {
            name,
            status: status.to_string(),
            detail,
        }
    }
}

/// Collect adapter health and queue depth.
pub async fn status_report(ctx: &AppContext) -> Result<StatusReport, ShopkeepError> {
    let adapters = ctx
        .health()
        .await
        .into_iter()
        .map(|(name, health)| AdapterReport::new(name, health))
        .collect();
    Ok(StatusReport {
        database: ctx.config.storage.database_path.clone(),
        adapters,
        queue_key: ctx.config.recovery.queue_key.clone(),
        queue_depth: ctx.service.queue_depth().await?,
    })
}

/// `shopkeep status`
pub async fn status(ctx: &AppContext, json: bool, plain: bool) -> Result<(), ShopkeepError> {
    let report = status_report(ctx).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let use_color = !plain && std::io::stdout().is_terminal();
    println!();
    println!("  shopkeep status");
    println!("  {}", "-".repeat(35));
    println!("    Database: {}", report.database);
    for adapter in &report.adapters {
        let label = match (adapter.status.as_str(), use_color) {
            ("healthy", true) => format!("{} {}", "✓".green(), adapter.status.green()),
            ("degraded", true) => format!("{} {}", "!".yellow(), adapter.status.yellow()),
            (_, true) => format!("{} {}", "✗".red(), adapter.status.red()),
            ("healthy", false) => format!("[OK] {}", adapter.status),
            ("degraded", false) => format!("[WARN] {}", adapter.status),
            (_, false) => format!("[FAIL] {}", adapter.status),
        };
        match &adapter.detail {
            Some(detail) => println!("    {:<14}{label} ({detail})", adapter.name),
            None => println!("    {:<14}{label}", adapter.name),
        }
    }
    println!("    Queue:    {} ({} waiting)", report.queue_key, report.queue_depth);
    println!();
    Ok(())
}

/// `shopkeep config`: print the effective configuration as TOML.
pub fn show_config(config: &ShopkeepConfig) -> Result<(), ShopkeepError> {
    let rendered = toml::to_string_pretty(config)
        .map_err(|e| ShopkeepError::Config(format!("failed to render configuration: {e}")))?;
    print!("{rendered}");
    Ok(())
}

fn print_task(task: &RecoveryTask, json: bool) -> Result<(), ShopkeepError> {
    if json {
        println!("{}", serde_json::to_string_pretty(task)?);
        return Ok(());
    }

    println!("  {}  {}", task.id, status_label(task.status));
    println!("    type:        {}", task.task_type);
    println!("    retries:     {}/{}", task.retry_count, task.max_retries);
    if task.status == TaskStatus::Pending {
        println!("    next retry:  {}", task.next_retry_at.to_rfc3339());
    }
    if !task.error.is_empty() {
        println!("    last error:  {}", task.error);
    }
    println!("    payload:     {}", task.payload);
    println!("    updated:     {}", task.updated_at.to_rfc3339());
    Ok(())
}

fn status_label(status: TaskStatus) -> String {
    let label = status.to_string();
    if !std::io::stdout().is_terminal() {
        return label;
    }
    match status {
        TaskStatus::Completed => label.green().to_string(),
        TaskStatus::Failed => label.red().to_string(),
        TaskStatus::Cancelled => label.dimmed().to_string(),
        TaskStatus::Pending | TaskStatus::Running => label.yellow().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_must_be_json() {
        assert!(parse_payload(r#"{"order_id": "o-1"}"#).is_ok());
        let err = parse_payload("order_id=o-1").unwrap_err();
        assert!(matches!(err, ShopkeepError::InvalidArgument(_)));
    }

    #[test]
    fn adapter_report_carries_degradation_detail() {
        let report = AdapterReport::new(
            "sqlite-store".to_string(),
            HealthStatus::Degraded("busy".to_string()),
        );
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"degraded\""));
        assert!(json.contains("\"detail\":\"busy\""));

        let healthy = AdapterReport::new("sqlite-kv".to_string(), HealthStatus::Healthy);
        let json = serde_json::to_string(&healthy).unwrap();
        assert!(!json.contains("detail"));
    }
}
