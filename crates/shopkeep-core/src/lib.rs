// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Shopkeep consistency engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Shopkeep workspace. Store adapters
//! implement the traits defined here; the transaction executor and the
//! recovery queue consume them.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{ShopkeepError, panic_message};
pub use types::{AdapterType, HealthStatus, IsolationLevel};

// Re-export all adapter traits at crate root.
pub use traits::{KvStore, PluginAdapter, StoreTxn, TransactionalStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shopkeep_error_has_all_variants() {
        let _config = ShopkeepError::Config("test".into());
        let _storage = ShopkeepError::storage(std::io::Error::other("test"));
        let _serialization = ShopkeepError::from(
            serde_json::from_str::<serde_json::Value>("{").unwrap_err(),
        );
        let _execution = ShopkeepError::execution("test");
        let _panicked = ShopkeepError::Panicked("boom".into());
        let _not_found = ShopkeepError::TaskNotFound("t-1".into());
        let _transition = ShopkeepError::InvalidTransition {
            id: "t-1".into(),
            from: "completed".into(),
            to: "cancelled".into(),
        };
        let _argument = ShopkeepError::InvalidArgument("test".into());
        let _handler = ShopkeepError::HandlerNotRegistered("refund-recovery".into());
        let _internal = ShopkeepError::Internal("test".into());
    }

    #[test]
    fn timeout_is_distinguishable() {
        let timeout = ShopkeepError::Timeout {
            duration: std::time::Duration::from_millis(10),
        };
        assert!(timeout.is_timeout());
        assert!(!ShopkeepError::execution("nope").is_timeout());
        assert_eq!(timeout.to_string(), "operation timed out after 10ms");
    }

    #[test]
    fn isolation_level_round_trips_as_kebab_case() {
        use std::str::FromStr;

        assert_eq!(IsolationLevel::default(), IsolationLevel::ReadCommitted);
        assert_eq!(IsolationLevel::Serializable.to_string(), "serializable");
        assert_eq!(
            IsolationLevel::from_str("repeatable-read").unwrap(),
            IsolationLevel::RepeatableRead
        );
        let json = serde_json::to_string(&IsolationLevel::ReadUncommitted).unwrap();
        assert_eq!(json, "\"read-uncommitted\"");
    }

    #[test]
    fn panic_message_reads_str_and_string_payloads() {
        let caught = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static message");

        let caught = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "formatted 42");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_plugin_adapter<T: PluginAdapter>() {}
        fn _assert_transactional_store<T: TransactionalStore>() {}
        fn _assert_kv_store<T: KvStore>() {}
        fn _assert_object_safe(_: &dyn StoreTxn, _: &dyn KvStore, _: &dyn TransactionalStore) {}
    }
}
