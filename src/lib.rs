//! Checklist Sync
//!
//! Keeps structured task records in step with the checkbox items of
//! free-form notes:
//! - Checklist extraction from markdown-ish note bodies
//! - Content-fingerprint identity so tasks survive edits, reorders, and moves
//! - Per-note coordination that serializes, debounces, and coalesces runs
//! - Atomic batch application against a pluggable task store

pub mod error;
pub mod events;
pub mod notes;
pub mod sync;
pub mod tasks;
pub mod watcher;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{StoreError, SyncError};

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub sync: SyncYamlConfig,
    pub store: StoreYamlConfig,
    pub watch: WatchYamlConfig,
}

/// Coordinator configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncYamlConfig {
    /// Quiet period before a requested sync runs
    pub debounce_ms: u64,
    /// Longest a pending sync may be held back by a stream of edits
    pub max_wait_ms: u64,
    /// Idle time after which a note's worker is retired
    pub idle_timeout_ms: u64,
}

impl Default for SyncYamlConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_wait_ms: 2_000,
            idle_timeout_ms: 60_000,
        }
    }
}

/// Task store configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreYamlConfig {
    pub path: PathBuf,
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tasks.json"),
        }
    }
}

/// Directory watcher configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchYamlConfig {
    /// File extensions treated as notes
    pub extensions: Vec<String>,
}

impl Default for WatchYamlConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["md".into(), "txt".into()],
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub debounce_ms: u64,
    pub max_wait_ms: u64,
    pub idle_timeout_ms: u64,
    pub store_path: PathBuf,
    pub watch_extensions: Vec<String>,
}

impl Config {
    /// Load configuration from environment variables and defaults.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to env vars / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        Ok(Self {
            debounce_ms: std::env::var("CHECKLIST_SYNC_DEBOUNCE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.sync.debounce_ms),
            max_wait_ms: std::env::var("CHECKLIST_SYNC_MAX_WAIT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.sync.max_wait_ms),
            idle_timeout_ms: std::env::var("CHECKLIST_SYNC_IDLE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.sync.idle_timeout_ms),
            store_path: std::env::var("CHECKLIST_SYNC_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(yaml.store.path),
            watch_extensions: yaml.watch.extensions,
        })
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
