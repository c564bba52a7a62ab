// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook wire contract.
//!
//! The assistant runtime delivers lifecycle events as a single JSON object
//! on stdin. Absent stdin yields an empty object; every field is optional
//! and handlers tolerate whatever subset arrives.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The lifecycle events the coordinator binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    SessionStart,
    SessionEnd,
    PreToolUse,
    PostToolUse,
    PreCompact,
    Stop,
    PortStart,
    PortEnd,
    Sync,
    Event,
}

impl HookEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            HookEvent::SessionStart => "session_start",
            HookEvent::SessionEnd => "session_end",
            HookEvent::PreToolUse => "pre_tool_use",
            HookEvent::PostToolUse => "post_tool_use",
            HookEvent::PreCompact => "pre_compact",
            HookEvent::Stop => "stop",
            HookEvent::PortStart => "port_start",
            HookEvent::PortEnd => "port_end",
            HookEvent::Sync => "sync",
            HookEvent::Event => "event",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stdin payload.
///
/// `session_id` is the *runtime's* id, not ours; the session manager
/// reconciles it through the `FindActive` fallback chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_event_name: Option<String>,
    /// session_start only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// session_end only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_hook_active: Option<bool>,
    /// pre/post_tool_use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
    /// pre_compact: "manual" or "auto".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
    /// notification / event hooks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<String>,
}

impl HookInput {
    /// Parse a stdin payload. Empty or whitespace-only input is an empty
    /// object, per the hook contract.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(HookInput::default());
        }
        serde_json::from_str(trimmed)
            .map_err(|e| crate::Error::External(format!("invalid hook payload: {e}")))
    }

    /// File path named by an Edit/Write tool invocation, if present.
    pub fn tool_file_path(&self) -> Option<&str> {
        self.tool_input
            .as_ref()
            .and_then(|v| v.get("file_path"))
            .and_then(|v| v.as_str())
    }
}

/// The optional stdout response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HookResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_: Option<bool>,
    #[serde(default, rename = "stopReason", skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(
        default,
        rename = "hookSpecificOutput",
        skip_serializing_if = "Option::is_none"
    )]
    pub hook_specific_output: Option<serde_json::Value>,
}

impl HookResponse {
    pub fn is_empty(&self) -> bool {
        self.decision.is_none()
            && self.reason.is_none()
            && self.continue_.is_none()
            && self.stop_reason.is_none()
            && self.hook_specific_output.is_none()
    }
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
