// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration identity and state machine.
//!
//! An orchestration is a directed-acyclic set of atomic ports executed by an
//! operator session. The executor drives it level by level; `progress_percent`
//! is derived from completed atomic ports and never stored out of step with
//! them (both are written in the same transaction).

use crate::port::{PortId, PortStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for an orchestration.
    pub struct OrchestrationId;
}

/// Lifecycle status of an orchestration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationStatus {
    Pending,
    Running,
    Paused,
    Complete,
    Failed,
    Cancelled,
}

impl OrchestrationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrchestrationStatus::Complete
                | OrchestrationStatus::Failed
                | OrchestrationStatus::Cancelled
        )
    }

    /// `pending -> running`; `running <-> paused`;
    /// `running|paused -> complete|failed|cancelled`; `pending -> cancelled`.
    pub fn can_transition(self, to: OrchestrationStatus) -> bool {
        if self == to {
            return false;
        }
        match self {
            OrchestrationStatus::Pending => matches!(
                to,
                OrchestrationStatus::Running | OrchestrationStatus::Cancelled
            ),
            OrchestrationStatus::Running => matches!(
                to,
                OrchestrationStatus::Paused
                    | OrchestrationStatus::Complete
                    | OrchestrationStatus::Failed
                    | OrchestrationStatus::Cancelled
            ),
            OrchestrationStatus::Paused => matches!(
                to,
                OrchestrationStatus::Running
                    | OrchestrationStatus::Failed
                    | OrchestrationStatus::Cancelled
            ),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrchestrationStatus::Pending => "pending",
            OrchestrationStatus::Running => "running",
            OrchestrationStatus::Paused => "paused",
            OrchestrationStatus::Complete => "complete",
            OrchestrationStatus::Failed => "failed",
            OrchestrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrchestrationStatus::Pending),
            "running" => Some(OrchestrationStatus::Running),
            "paused" => Some(OrchestrationStatus::Paused),
            "complete" => Some(OrchestrationStatus::Complete),
            "failed" => Some(OrchestrationStatus::Failed),
            "cancelled" => Some(OrchestrationStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrchestrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A port as it appears in an orchestration's execution graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtomicPort {
    pub port_id: PortId,
    /// In-level ordering; deterministic tie-break for the scheduler.
    pub order: u32,
    pub depends_on: Vec<PortId>,
    pub status: PortStatus,
    pub retry_count: u32,
    pub test_retry_count: u32,
}

/// An orchestration row plus its ordered atomic-port list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Orchestration {
    pub id: OrchestrationId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: OrchestrationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_port_id: Option<PortId>,
    pub progress_percent: u32,
    pub atomic_ports: Vec<AtomicPort>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Orchestration {
    /// `round(100 * completed / total)`; an empty orchestration is 0%.
    pub fn compute_progress(ports: &[AtomicPort]) -> u32 {
        if ports.is_empty() {
            return 0;
        }
        let complete = ports
            .iter()
            .filter(|p| p.status == PortStatus::Complete)
            .count();
        ((100.0 * complete as f64 / ports.len() as f64).round()) as u32
    }

    pub fn all_ports_complete(&self) -> bool {
        !self.atomic_ports.is_empty()
            && self
                .atomic_ports
                .iter()
                .all(|p| p.status == PortStatus::Complete)
    }

    pub fn any_port_failed(&self) -> bool {
        self.atomic_ports
            .iter()
            .any(|p| p.status == PortStatus::Failed)
    }
}

#[cfg(test)]
#[path = "orchestration_tests.rs"]
mod tests;
