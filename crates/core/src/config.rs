// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project-scoped configuration.
//!
//! Loaded from `<project_root>/.pal/config.yaml`. Every tunable the
//! coordinator consults lives here; a missing file means defaults.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Checkpoint policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Budget fraction that triggers an `auto_80` checkpoint.
    pub warn_threshold: f64,
    /// Budget fraction that triggers an `auto_90` checkpoint.
    pub critical_threshold: f64,
    /// Minimum seconds between checkpoints for the same (session, trigger).
    pub debounce_secs: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            warn_threshold: 0.80,
            critical_threshold: 0.90,
            debounce_secs: 300,
        }
    }
}

/// Orchestration executor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    /// Per-port retry budget before the port is failed.
    pub max_retries: u32,
}

impl Default for OrchestrationConfig {
    fn default() -> Self {
        Self { max_retries: 3 }
    }
}

/// Top-level configuration for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PalConfig {
    /// Context-window token budget assumed per session.
    pub token_budget: i64,
    pub checkpoint: CheckpointConfig,
    pub orchestration: OrchestrationConfig,
    /// Hours without a heartbeat after which a running session is a zombie.
    pub zombie_ttl_hours: u64,
    /// Seconds a blocking lock acquire waits before timing out.
    pub lock_wait_secs: u64,
    /// Store path override; relative paths resolve against the project root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

impl Default for PalConfig {
    fn default() -> Self {
        Self {
            token_budget: 200_000,
            checkpoint: CheckpointConfig::default(),
            orchestration: OrchestrationConfig::default(),
            zombie_ttl_hours: 24,
            lock_wait_secs: 10,
            db_path: None,
        }
    }
}

impl PalConfig {
    /// Path of the config file under a project root.
    pub fn path_in(project_root: &Path) -> PathBuf {
        project_root.join(".pal").join("config.yaml")
    }

    /// Load from `<project_root>/.pal/config.yaml`, defaulting when absent.
    pub fn load(project_root: &Path) -> crate::Result<Self> {
        let path = Self::path_in(project_root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| crate::Error::External(format!("read {}: {e}", path.display())))?;
        serde_yaml::from_str(&raw)
            .map_err(|e| crate::Error::External(format!("parse {}: {e}", path.display())))
    }

    pub fn zombie_ttl(&self) -> Duration {
        Duration::from_secs(self.zombie_ttl_hours * 3600)
    }

    pub fn checkpoint_debounce(&self) -> Duration {
        Duration::from_secs(self.checkpoint.debounce_secs)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
