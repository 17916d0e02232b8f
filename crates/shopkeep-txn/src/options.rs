// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-invocation executor options and compensation actions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;

use shopkeep_config::model::ExecutorConfig;
use shopkeep_core::{IsolationLevel, ShopkeepError};

type CompensationFn = dyn Fn() -> BoxFuture<'static, Result<(), ShopkeepError>> + Send + Sync;

/// A named action that undoes an external side effect after a transaction
/// has definitively failed. Actions must be idempotent.
#[derive(Clone)]
pub struct Compensation {
    name: String,
    action: Arc<CompensationFn>,
}

impl Compensation {
    pub fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ShopkeepError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            action: Arc::new(move || action().boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(&self) -> BoxFuture<'static, Result<(), ShopkeepError>> {
        (self.action)()
    }
}

impl fmt::Debug for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compensation")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Options governing one executor call.
///
/// `timeout` bounds the whole call including retries and the waits between
/// them. `retry_count` is the number of attempts after the first.
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub timeout: Duration,
    pub retry_count: u32,
    pub retry_interval: Duration,
    pub compensations: Vec<Compensation>,
    pub isolation: IsolationLevel,
    pub log_enabled: bool,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl TransactionOptions {
    /// Options seeded from the `[executor]` configuration section.
    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self {
            timeout: config.timeout(),
            retry_count: config.retry_count,
            retry_interval: config.retry_interval(),
            compensations: Vec::new(),
            isolation: config.isolation,
            log_enabled: config.log_enabled,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.log_enabled = enabled;
        self
    }

    /// Register a compensation. Compensations run in registration order.
    pub fn with_compensation(mut self, compensation: Compensation) -> Self {
        self.compensations.push(compensation);
        self
    }
}
