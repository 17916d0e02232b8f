// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Shopkeep consistency engine.

use std::any::Any;

use thiserror::Error;

/// The primary error type used across all Shopkeep adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ShopkeepError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (connection, begin/commit/rollback, savepoints, queries).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A persisted record could not be encoded or decoded.
    #[error("serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// The caller-supplied deadline elapsed.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// A unit of work or repair handler reported a failure.
    #[error("execution failed: {0}")]
    Execution(String),

    /// A unit of work or repair handler panicked; the panic was contained.
    #[error("panicked: {0}")]
    Panicked(String),

    /// No recovery task exists under the given id.
    #[error("recovery task not found: {0}")]
    TaskNotFound(String),

    /// A status change that the task lifecycle does not allow.
    #[error("task {id}: cannot transition from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    /// A caller passed an argument outside the accepted range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No repair handler is registered for a task type.
    #[error("no repair handler registered for task type {0}")]
    HandlerNotRegistered(String),

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShopkeepError {
    /// Shorthand for [`ShopkeepError::Execution`].
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Wraps any error as a storage failure.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }

    /// Returns `true` for deadline violations.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Extracts a readable message from a caught panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
