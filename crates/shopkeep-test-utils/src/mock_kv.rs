// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory key-value store for deterministic testing.
//!
//! Expiry and blocking pops use `tokio::time`, so tests running with a
//! paused clock can advance past TTLs and dequeue timeouts instantly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use shopkeep_core::{AdapterType, HealthStatus, KvStore, PluginAdapter, ShopkeepError};

use crate::lock;

struct Entry {
    value: Vec<u8>,
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    lists: HashMap<String, VecDeque<String>>,
    fail_pushes: bool,
}

/// An in-memory [`KvStore`].
#[derive(Clone, Default)]
pub struct MockKv {
    state: Arc<Mutex<State>>,
    pushed: Arc<Notify>,
}

impl MockKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents of a list, head first.
    pub fn list(&self, list_key: &str) -> Vec<String> {
        lock(&self.state)
            .lists
            .get(list_key)
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The TTL an entry was last written with, if it is still live.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let state = lock(&self.state);
        state
            .entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .and_then(|e| e.ttl)
    }

    /// Make every `list_push` fail until turned off again.
    pub fn fail_pushes(&self, fail: bool) {
        lock(&self.state).fail_pushes = fail;
    }

    fn try_pop(&self, list_key: &str) -> Option<String> {
        lock(&self.state)
            .lists
            .get_mut(list_key)
            .and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl PluginAdapter for MockKv {
    fn name(&self) -> &str {
        "mock-kv"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::KeyValue
    }

    async fn health_check(&self) -> Result<HealthStatus, ShopkeepError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShopkeepError> {
        Ok(())
    }
}

#[async_trait]
impl KvStore for MockKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, ShopkeepError> {
        let state = lock(&self.state);
        Ok(state
            .entries
            .get(key)
            .filter(|e| e.is_live(Instant::now()))
            .map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), ShopkeepError> {
        let entry = Entry {
            value,
            ttl,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        lock(&self.state).entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn list_push(&self, list_key: &str, value: &str) -> Result<(), ShopkeepError> {
        {
            let mut state = lock(&self.state);
            if state.fail_pushes {
                return Err(ShopkeepError::storage(std::io::Error::other(
                    "injected push failure",
                )));
            }
            state
                .lists
                .entry(list_key.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn list_blocking_pop(
        &self,
        list_key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, ShopkeepError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut notified = std::pin::pin!(self.pushed.notified());
            notified.as_mut().enable();

            if let Some(value) = self.try_pop(list_key) {
                return Ok(Some(value));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_pop(list_key));
            }
        }
    }

    async fn list_len(&self, list_key: &str) -> Result<usize, ShopkeepError> {
        Ok(lock(&self.state).lists.get(list_key).map_or(0, VecDeque::len))
    }
}
