// SPDX-FileCopyrightText: 2026 Shopkeep Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./shopkeep.toml` > `~/.config/shopkeep/shopkeep.toml` >
//! `/etc/shopkeep/shopkeep.toml` with environment variable overrides via `SHOPKEEP_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ShopkeepConfig;

/// Sections whose env vars map `SHOPKEEP_<SECTION>_<KEY>` to `<section>.<key>`.
const SECTIONS: &[&str] = &["service", "storage", "executor", "recovery"];

/// Config files in merge order (later overrides earlier).
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/shopkeep/shopkeep.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("shopkeep/shopkeep.toml"));
    }
    paths.push(PathBuf::from("shopkeep.toml"));
    paths
}

/// Build the layered Figment: defaults, config files, then `SHOPKEEP_*` env vars.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(ShopkeepConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
pub fn load_config() -> Result<ShopkeepConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env vars).
pub fn load_config_from_str(toml_content: &str) -> Result<ShopkeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ShopkeepConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ShopkeepConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ShopkeepConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Env provider with explicit section mapping.
///
/// `Env::split("_")` would turn `SHOPKEEP_RECOVERY_QUEUE_KEY` into
/// `recovery.queue.key`; only the first segment names the section.
fn env_provider() -> Env {
    Env::prefixed("SHOPKEEP_").map(|key| {
        let key = key.as_str();
        SECTIONS
            .iter()
            .find_map(|section| {
                key.strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key.to_string())
            .into()
    })
}
