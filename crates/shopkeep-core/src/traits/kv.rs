// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable key-value store with list primitives, used as the recovery
//! queue's backing store.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ShopkeepError;
use crate::traits::adapter::PluginAdapter;

/// Key-value store with expiring entries and FIFO lists.
#[async_trait]
pub trait KvStore: PluginAdapter {
    /// Reads a value. Expired entries read as `None`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ShopkeepError>;

    /// Writes a value, replacing any previous one. `ttl = None` never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), ShopkeepError>;

    /// Appends a value to the tail of a list.
    async fn list_push(&self, list_key: &str, value: &str) -> Result<(), ShopkeepError>;

    /// Pops the head of a list, waiting up to `timeout` for one to arrive.
    ///
    /// The pop is atomic: a value is handed to exactly one caller.
    async fn list_blocking_pop(
        &self,
        list_key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ShopkeepError>;

    /// Number of values currently in a list.
    async fn list_len(&self, list_key: &str) -> Result<usize, ShopkeepError>;
}
