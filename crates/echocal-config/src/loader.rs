// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./echocal.toml` > `~/.config/echocal/echocal.toml`
//! > `/etc/echocal/echocal.toml` with environment variable overrides via the
//! `ECHOCAL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::EchocalConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/echocal/echocal.toml` (system-wide)
/// 3. `~/.config/echocal/echocal.toml` (user XDG config)
/// 4. `./echocal.toml` (local directory)
/// 5. `ECHOCAL_*` environment variables
pub fn load_config() -> Result<EchocalConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EchocalConfig::default()))
        .merge(Toml::file("/etc/echocal/echocal.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("echocal/echocal.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("echocal.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and embeddings that supply config directly.
pub fn load_config_from_str(toml_content: &str) -> Result<EchocalConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EchocalConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<EchocalConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(EchocalConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `ECHOCAL_STORAGE_DATABASE_PATH` must map
/// to `storage.database_path`, not `storage.database.path`.
fn env_provider() -> Env {
    Env::prefixed("ECHOCAL_").map(|key| {
        let key = key.as_str().to_lowercase();
        for section in ["agent", "storage", "queue", "clarify"] {
            if let Some(rest) = key.strip_prefix(&format!("{section}_")) {
                return format!("{section}.{rest}").into();
            }
        }
        key.into()
    })
}
