// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Shopkeep consistency engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and two
//! adapters over it: a transactional JSON document store with savepoints,
//! and a key-value store with expiring entries and FIFO lists that backs
//! the recovery queue.

pub mod database;
pub mod kv;
pub mod migrations;
pub mod store;

pub use database::Database;
pub use kv::SqliteKv;
pub use store::SqliteStore;
