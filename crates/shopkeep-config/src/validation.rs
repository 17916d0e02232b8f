// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty paths, known log levels, and consistent retry bounds.

use crate::diagnostic::ConfigError;
use crate::model::ShopkeepConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ShopkeepConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.storage.poll_interval_ms == 0 {
        fail("storage.poll_interval_ms must be at least 1".to_string());
    }

    if config.executor.timeout_ms == 0 {
        fail("executor.timeout_ms must be at least 1".to_string());
    }

    let recovery = &config.recovery;

    if recovery.queue_key.trim().is_empty() {
        fail("recovery.queue_key must not be empty".to_string());
    }

    if recovery.key_prefix.trim().is_empty() {
        fail("recovery.key_prefix must not be empty".to_string());
    } else if recovery.key_prefix == recovery.queue_key {
        fail("recovery.key_prefix must differ from recovery.queue_key".to_string());
    }

    if recovery.max_retries_limit == 0 {
        fail("recovery.max_retries_limit must be at least 1".to_string());
    }

    if recovery.default_max_retries == 0 || recovery.default_max_retries > recovery.max_retries_limit
    {
        fail(format!(
            "recovery.default_max_retries must be between 1 and {}, got {}",
            recovery.max_retries_limit, recovery.default_max_retries
        ));
    }

    if recovery.dequeue_timeout_ms == 0 {
        fail("recovery.dequeue_timeout_ms must be at least 1".to_string());
    }

    if recovery.backoff_unit_secs == 0 {
        fail("recovery.backoff_unit_secs must be at least 1".to_string());
    }

    if recovery.backoff_max_secs < recovery.backoff_unit_secs {
        fail(format!(
            "recovery.backoff_max_secs ({}) must not be below recovery.backoff_unit_secs ({})",
            recovery.backoff_max_secs, recovery.backoff_unit_secs
        ));
    }

    if recovery.task_ttl_secs < recovery.backoff_max_secs {
        fail(format!(
            "recovery.task_ttl_secs ({}) must cover at least one maximal backoff ({}s), \
             otherwise a scheduled task can expire before it is retried",
            recovery.task_ttl_secs, recovery.backoff_max_secs
        ));
    }

    if recovery.workers == 0 {
        fail("recovery.workers must be at least 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
