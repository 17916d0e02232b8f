// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transactional document store consumed by the transaction executor.
//!
//! Business records live in named collections of JSON documents. A
//! [`StoreTxn`] is owned by exactly one caller at a time and must end in
//! exactly one [`StoreTxn::commit`] or [`StoreTxn::rollback`].

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ShopkeepError;
use crate::traits::adapter::PluginAdapter;
use crate::types::IsolationLevel;

/// A relational-style store that can open transactions.
#[async_trait]
pub trait TransactionalStore: PluginAdapter {
    /// Opens a new transaction at the requested isolation level.
    ///
    /// Implementations hand out exclusive ownership: no two open
    /// transactions share an underlying connection.
    async fn begin(&self, isolation: IsolationLevel)
    -> Result<Box<dyn StoreTxn>, ShopkeepError>;
}

/// An open transaction handle.
#[async_trait]
pub trait StoreTxn: Send {
    /// Reads a document, seeing this transaction's own uncommitted writes.
    async fn get(&mut self, collection: &str, key: &str) -> Result<Option<Value>, ShopkeepError>;

    /// Inserts or fully replaces a document.
    async fn put(&mut self, collection: &str, key: &str, value: Value)
    -> Result<(), ShopkeepError>;

    /// Deletes a document. Returns `true` if it existed.
    async fn delete(&mut self, collection: &str, key: &str) -> Result<bool, ShopkeepError>;

    /// Creates a named savepoint.
    async fn savepoint(&mut self, name: &str) -> Result<(), ShopkeepError>;

    /// Undoes all work since the named savepoint. The savepoint itself stays
    /// active and can be rolled back to again.
    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), ShopkeepError>;

    /// Forgets the named savepoint (and any created after it), keeping its work.
    async fn release_savepoint(&mut self, name: &str) -> Result<(), ShopkeepError>;

    /// Commits the transaction. If the commit fails the implementation rolls
    /// the transaction back before returning the error.
    async fn commit(self: Box<Self>) -> Result<(), ShopkeepError>;

    /// Rolls the whole transaction back.
    async fn rollback(self: Box<Self>) -> Result<(), ShopkeepError>;
}

/// Returns `true` if `name` can be used verbatim as a savepoint identifier.
pub fn is_valid_savepoint_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    name.len() <= 64 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
