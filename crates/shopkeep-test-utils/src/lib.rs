// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Shopkeep integration tests.
//!
//! Provides in-memory adapters for fast, deterministic, CI-runnable tests
//! without a database file.
//!
//! # Components
//!
//! - [`MockStore`] - Transactional document store with savepoints, call
//!   counters and fault injection
//! - [`MockKv`] - Key-value store with expiring entries and blocking lists

pub mod mock_kv;
pub mod mock_store;

pub use mock_kv::MockKv;
pub use mock_store::MockStore;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, ignoring poisoning from a panicking test thread.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
