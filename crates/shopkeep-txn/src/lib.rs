// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction executors for the Shopkeep consistency engine.
//!
//! [`TransactionExecutor::execute`] runs caller work in a store transaction
//! with a deadline, bounded retries and compensation actions. The savepoint
//! variants scope the same guarantees to a savepoint so that a failing step
//! does not discard the rest of its transaction.

pub mod compensation;
pub mod executor;
pub mod options;
pub mod result;

pub use executor::TransactionExecutor;
pub use options::{Compensation, TransactionOptions};
pub use result::{CompensationReport, TransactionResult};
