// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory transactional store for deterministic testing.
//!
//! Each [`MockTxn`] buffers its writes and applies them to the shared
//! committed state on commit. Savepoints snapshot the write buffer. Counters
//! record every begin, commit and rollback so tests can assert that each
//! transaction ended exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use shopkeep_core::traits::store::is_valid_savepoint_name;
use shopkeep_core::{
    AdapterType, HealthStatus, IsolationLevel, PluginAdapter, ShopkeepError, StoreTxn,
    TransactionalStore,
};

use crate::lock;

type DocKey = (String, String);
type WriteSet = HashMap<DocKey, Option<Value>>;

#[derive(Default)]
struct State {
    committed: HashMap<DocKey, Value>,
    begins: usize,
    commits: usize,
    rollbacks: usize,
    savepoint_rollbacks: usize,
    abandoned: usize,
    open: usize,
    fail_begins: usize,
    fail_commits: usize,
    isolation_levels: Vec<IsolationLevel>,
}

/// An in-memory [`TransactionalStore`].
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<State>>,
}

impl MockStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a committed document directly, bypassing transactions.
    pub fn seed(&self, collection: &str, key: &str, value: Value) {
        lock(&self.state)
            .committed
            .insert((collection.to_string(), key.to_string()), value);
    }

    /// Read a committed document.
    pub fn document(&self, collection: &str, key: &str) -> Option<Value> {
        lock(&self.state)
            .committed
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
    }

    /// Make the next `n` calls to `begin` fail.
    pub fn fail_next_begins(&self, n: usize) {
        lock(&self.state).fail_begins = n;
    }

    /// Make the next `n` commits fail (and roll back).
    pub fn fail_next_commits(&self, n: usize) {
        lock(&self.state).fail_commits = n;
    }

    pub fn begins(&self) -> usize {
        lock(&self.state).begins
    }

    pub fn commits(&self) -> usize {
        lock(&self.state).commits
    }

    pub fn rollbacks(&self) -> usize {
        lock(&self.state).rollbacks
    }

    pub fn savepoint_rollbacks(&self) -> usize {
        lock(&self.state).savepoint_rollbacks
    }

    /// Transactions dropped without commit or rollback.
    pub fn abandoned(&self) -> usize {
        lock(&self.state).abandoned
    }

    /// Transactions currently open.
    pub fn open_transactions(&self) -> usize {
        lock(&self.state).open
    }

    /// Isolation level of every successful `begin`, in order.
    pub fn isolation_levels(&self) -> Vec<IsolationLevel> {
        lock(&self.state).isolation_levels.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockStore {
    fn name(&self) -> &str {
        "mock-store"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::TransactionalStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ShopkeepError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ShopkeepError> {
        Ok(())
    }
}

#[async_trait]
impl TransactionalStore for MockStore {
    async fn begin(
        &self,
        isolation: IsolationLevel,
    ) -> Result<Box<dyn StoreTxn>, ShopkeepError> {
        let mut state = lock(&self.state);
        if state.fail_begins > 0 {
            state.fail_begins -= 1;
            return Err(ShopkeepError::storage(std::io::Error::other(
                "injected begin failure",
            )));
        }
        state.begins += 1;
        state.open += 1;
        state.isolation_levels.push(isolation);
        Ok(Box::new(MockTxn {
            state: Arc::clone(&self.state),
            writes: WriteSet::new(),
            savepoints: Vec::new(),
            open: true,
        }))
    }
}

/// A transaction on a [`MockStore`].
pub struct MockTxn {
    state: Arc<Mutex<State>>,
    writes: WriteSet,
    savepoints: Vec<(String, WriteSet)>,
    open: bool,
}

impl MockTxn {
    fn position(&self, name: &str) -> Result<usize, ShopkeepError> {
        if !is_valid_savepoint_name(name) {
            return Err(ShopkeepError::InvalidArgument(format!(
                "invalid savepoint name `{name}`"
            )));
        }
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| ShopkeepError::execution(format!("no such savepoint: {name}")))
    }

    fn close(&mut self) {
        self.open = false;
        lock(&self.state).open -= 1;
    }
}

#[async_trait]
impl StoreTxn for MockTxn {
    async fn get(&mut self, collection: &str, key: &str) -> Result<Option<Value>, ShopkeepError> {
        let doc_key = (collection.to_string(), key.to_string());
        if let Some(pending) = self.writes.get(&doc_key) {
            return Ok(pending.clone());
        }
        Ok(lock(&self.state).committed.get(&doc_key).cloned())
    }

    async fn put(
        &mut self,
        collection: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ShopkeepError> {
        self.writes
            .insert((collection.to_string(), key.to_string()), Some(value));
        Ok(())
    }

    async fn delete(&mut self, collection: &str, key: &str) -> Result<bool, ShopkeepError> {
        let existed = self.get(collection, key).await?.is_some();
        self.writes
            .insert((collection.to_string(), key.to_string()), None);
        Ok(existed)
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), ShopkeepError> {
        if !is_valid_savepoint_name(name) {
            return Err(ShopkeepError::InvalidArgument(format!(
                "invalid savepoint name `{name}`"
            )));
        }
        self.savepoints.push((name.to_string(), self.writes.clone()));
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), ShopkeepError> {
        let pos = self.position(name)?;
        self.savepoints.truncate(pos + 1);
        self.writes = self.savepoints[pos].1.clone();
        lock(&self.state).savepoint_rollbacks += 1;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), ShopkeepError> {
        let pos = self.position(name)?;
        self.savepoints.truncate(pos);
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), ShopkeepError> {
        self.close();
        let writes = std::mem::take(&mut self.writes);
        let mut state = lock(&self.state);
        if state.fail_commits > 0 {
            state.fail_commits -= 1;
            state.rollbacks += 1;
            return Err(ShopkeepError::storage(std::io::Error::other(
                "injected commit failure",
            )));
        }
        for (key, value) in writes {
            match value {
                Some(value) => state.committed.insert(key, value),
                None => state.committed.remove(&key),
            };
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), ShopkeepError> {
        self.close();
        lock(&self.state).rollbacks += 1;
        Ok(())
    }
}

impl Drop for MockTxn {
    fn drop(&mut self) {
        if self.open {
            let mut state = lock(&self.state);
            state.open -= 1;
            state.abandoned += 1;
        }
    }
}
