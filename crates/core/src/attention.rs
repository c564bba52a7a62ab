// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Attention accounting types.
//!
//! Attention is per-session token-budget accounting plus a derived focus
//! score. Checkpoints anchor recovery when the score degrades past the
//! configured thresholds.

use crate::port::PortId;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Point-in-time view of a session's token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionSnapshot {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<PortId>,
    pub loaded_tokens: i64,
    pub available_tokens: i64,
    pub focus_score: f64,
    pub compact_count: u32,
    pub created_at: DateTime<Utc>,
}

/// What caused a checkpoint to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    Auto80,
    Auto90,
    Manual,
}

impl CheckpointTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointTrigger::Auto80 => "auto_80",
            CheckpointTrigger::Auto90 => "auto_90",
            CheckpointTrigger::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto_80" => Some(CheckpointTrigger::Auto80),
            "auto_90" => Some(CheckpointTrigger::Auto90),
            "manual" => Some(CheckpointTrigger::Manual),
            _ => None,
        }
    }
}

impl fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recovery/resume anchor taken when attention crosses a threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<PortId>,
    pub trigger_type: CheckpointTrigger,
    pub tokens_used: i64,
    pub token_budget: i64,
    pub summary: String,
    pub active_files: Vec<String>,
    pub key_points: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Focus score in `[0, 1]`.
///
/// Non-increasing as `loaded` approaches `budget`; each recent compaction
/// dampens the score further (a session that keeps compacting has lost the
/// thread even when its window is empty).
pub fn focus_score(loaded_tokens: i64, budget: i64, recent_compacts: u32) -> f64 {
    if budget <= 0 {
        return 0.0;
    }
    let headroom = 1.0 - (loaded_tokens.max(0) as f64 / budget as f64);
    let base = headroom.clamp(0.0, 1.0);
    base * 0.9f64.powi(recent_compacts.min(20) as i32)
}

#[cfg(test)]
#[path = "attention_tests.rs"]
mod tests;
