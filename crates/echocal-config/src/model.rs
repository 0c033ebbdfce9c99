// SPDX-FileCopyrightText: 2026 Echocal Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Echocal pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Echocal configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EchocalConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Stage queue retry and polling settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Clarification expiry and sweep settings.
    #[serde(default)]
    pub clarify: ClarifyConfig,
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "echocal".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory for spooled audio awaiting transcription.
    #[serde(default = "default_spool_dir")]
    pub spool_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            spool_dir: default_spool_dir(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|d| d.join("echocal/echocal.db"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "echocal.db".to_string())
}

fn default_spool_dir() -> String {
    dirs::cache_dir()
        .map(|d| d.join("echocal/spool"))
        .and_then(|p| p.to_str().map(str::to_string))
        .unwrap_or_else(|| "spool".to_string())
}

/// Stage queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum delivery attempts per stage entry before it is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,

    /// Base for the exponential retry backoff, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,

    /// Worker poll interval when the queue is idle, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Completed entries older than this are pruned, in seconds.
    #[serde(default = "default_prune_completed_after_secs")]
    pub prune_completed_after_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            prune_completed_after_secs: default_prune_completed_after_secs(),
        }
    }
}

fn default_max_attempts() -> i32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_prune_completed_after_secs() -> u64 {
    24 * 60 * 60
}

/// Clarification engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClarifyConfig {
    /// Minutes before a pending intent and its prompts expire.
    #[serde(default = "default_expiry_minutes")]
    pub expiry_minutes: i64,

    /// Interval between expiry sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Fixed reschedule delay when a stage is paused for testing, in seconds.
    #[serde(default = "default_pause_retry_delay_secs")]
    pub pause_retry_delay_secs: u64,
}

impl Default for ClarifyConfig {
    fn default() -> Self {
        Self {
            expiry_minutes: default_expiry_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            pause_retry_delay_secs: default_pause_retry_delay_secs(),
        }
    }
}

fn default_expiry_minutes() -> i64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_pause_retry_delay_secs() -> u64 {
    5
}
