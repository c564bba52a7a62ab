// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker session records.
//!
//! A worker session tracks one port's execution by an impl/test pair (or a
//! single session). The record holds both session ids; the sessions
//! themselves are ordinary rows in the session table, parented by the
//! operator.

use crate::port::PortId;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a worker record.
    pub struct WorkerId;
}

/// Shape of the worker: a pair, or one of its halves, or a lone session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    Impl,
    Test,
    ImplTestPair,
    Single,
}

impl WorkerType {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerType::Impl => "impl",
            WorkerType::Test => "test",
            WorkerType::ImplTestPair => "impl_test_pair",
            WorkerType::Single => "single",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "impl" => Some(WorkerType::Impl),
            "test" => Some(WorkerType::Test),
            "impl_test_pair" => Some(WorkerType::ImplTestPair),
            "single" => Some(WorkerType::Single),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a worker record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Running,
    Blocked,
    Failed,
    Complete,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkerStatus::Failed | WorkerStatus::Complete)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Running => "running",
            WorkerStatus::Blocked => "blocked",
            WorkerStatus::Failed => "failed",
            WorkerStatus::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(WorkerStatus::Running),
            "blocked" => Some(WorkerStatus::Blocked),
            "failed" => Some(WorkerStatus::Failed),
            "complete" => Some(WorkerStatus::Complete),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported when a worker finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Test names that failed, when the test half reported them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cost_usd: f64,
}

impl WorkerResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            detail: None,
            failures: vec![],
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: Some(detail.into()),
            failures: vec![],
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
        }
    }
}

/// A worker session record row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSession {
    pub id: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration_id: Option<crate::OrchestrationId>,
    pub port_id: PortId,
    pub worker_type: WorkerType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impl_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_session_id: Option<SessionId>,
    pub status: WorkerStatus,
    /// Free-form phase detail, e.g. "testing", "fixing".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substatus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkerResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkerSession {
    /// Sessions belonging to this worker, impl first.
    pub fn session_ids(&self) -> Vec<&SessionId> {
        self.impl_session_id
            .iter()
            .chain(self.test_session_id.iter())
            .collect()
    }

    /// Whether `session_id` is one of this worker's sessions.
    pub fn owns_session(&self, session_id: &SessionId) -> bool {
        self.impl_session_id.as_ref() == Some(session_id)
            || self.test_session_id.as_ref() == Some(session_id)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
