// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed operator/worker messages.
//!
//! Messages are an append-only log with reader cursors. Delivery is
//! at-least-once from a cursor; consumers dedupe on message id. The id is
//! the store's rowid, so per-recipient ordering by id matches insertion
//! order.

use crate::port::PortId;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Report,
    Event,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Request => "request",
            MessageType::Report => "report",
            MessageType::Event => "event",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "request" => Some(MessageType::Request),
            "report" => Some(MessageType::Report),
            "event" => Some(MessageType::Event),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known message subtypes the executor emits and consumes.
///
/// Serializes with snake_case wire names; unknown subtypes round-trip as
/// [`MessageSubtype::Other`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageSubtype {
    TaskAssign,
    TaskComplete,
    TaskFailed,
    TaskBlocked,
    ImplReady,
    FixRequest,
    TestPass,
    TestFail,
    Other(String),
}

impl MessageSubtype {
    pub fn as_str(&self) -> &str {
        match self {
            MessageSubtype::TaskAssign => "task_assign",
            MessageSubtype::TaskComplete => "task_complete",
            MessageSubtype::TaskFailed => "task_failed",
            MessageSubtype::TaskBlocked => "task_blocked",
            MessageSubtype::ImplReady => "impl_ready",
            MessageSubtype::FixRequest => "fix_request",
            MessageSubtype::TestPass => "test_pass",
            MessageSubtype::TestFail => "test_fail",
            MessageSubtype::Other(s) => s,
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "task_assign" => MessageSubtype::TaskAssign,
            "task_complete" => MessageSubtype::TaskComplete,
            "task_failed" => MessageSubtype::TaskFailed,
            "task_blocked" => MessageSubtype::TaskBlocked,
            "impl_ready" => MessageSubtype::ImplReady,
            "fix_request" => MessageSubtype::FixRequest,
            "test_pass" => MessageSubtype::TestPass,
            "test_fail" => MessageSubtype::TestFail,
            other => MessageSubtype::Other(other.to_string()),
        }
    }
}

impl fmt::Display for MessageSubtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageSubtype {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageSubtype {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(MessageSubtype::parse(&s))
    }
}

/// A persisted bus message. `id` doubles as the read cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: String,
    pub from_session: SessionId,
    pub to_session: SessionId,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub subtype: MessageSubtype,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<PortId>,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Derive the default conversation id for a message.
///
/// The conversation is the unordered session pair plus the port, so both
/// directions of an operator/worker exchange land in the same thread.
pub fn conversation_id(from: &SessionId, to: &SessionId, port_id: Option<&PortId>) -> String {
    let (a, b) = if from.as_str() <= to.as_str() {
        (from, to)
    } else {
        (to, from)
    };
    match port_id {
        Some(p) => format!("{a}~{b}~{p}"),
        None => format!("{a}~{b}"),
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
