// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Briefing and session-summary artifacts.
//!
//! The briefing is the single markdown file the assistant reads at session
//! start; the summary is its session-end counterpart. Both render
//! deterministically from store state (stable ordering, no wall-clock reads
//! outside the injected clock) and are written atomically.

use std::path::{Path, PathBuf};

use pal_core::port::adr_candidate_id;
use pal_core::time_fmt::{format_duration_secs, format_tokens};
use pal_core::{Clock, EscalationStatus, PortStatus, Result, Session, SessionEventType};
use pal_storage::queries::{escalations, events, ports, sessions};
use pal_storage::Store;

use crate::paths;

/// How many recent sessions feed the briefing summary.
const RECENT_SESSION_LIMIT: u32 = 5;

pub struct BriefingGenerator<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> BriefingGenerator<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Render and atomically write the session briefing. Returns its path.
    pub fn write_session_briefing(&self, project_root: &Path) -> Result<PathBuf> {
        let content = self.render_briefing()?;
        let path = paths::briefing_file(project_root);
        paths::write_atomic(&path, &content)?;
        Ok(path)
    }

    /// The four-section briefing: summary, running ports, pending ports,
    /// recommendations.
    pub fn render_briefing(&self) -> Result<String> {
        self.store.with_conn(|conn| {
            let recent = sessions::list_recent(conn, RECENT_SESSION_LIMIT)?;
            let running = ports::list_by_status(conn, PortStatus::Running)?;
            let pending = ports::list_by_status(conn, PortStatus::Pending)?;
            let blocked = ports::list_by_status(conn, PortStatus::Blocked)?;
            let open_escalations = escalations::list(conn, Some(EscalationStatus::Open))?;

            let mut out = String::from("# Session Briefing\n\n## Summary\n\n");
            out.push_str(&format!(
                "- Recent sessions: {}\n- Running ports: {}\n- Pending ports: {}\n- Open escalations: {}\n",
                recent.len(),
                running.len(),
                pending.len(),
                open_escalations.len(),
            ));

            out.push_str("\n## Running Ports\n\n");
            if running.is_empty() {
                out.push_str("None.\n");
            }
            for port in &running {
                let owner = port
                    .session_id
                    .as_ref()
                    .map(|s| format!(" (session {s})"))
                    .unwrap_or_default();
                out.push_str(&format!("- `{}` {}{}\n", port.id, port.display_title(), owner));
            }

            out.push_str("\n## Pending Ports\n\n");
            if pending.is_empty() {
                out.push_str("None.\n");
            }
            for port in &pending {
                let deps = ports::dependencies_of(conn, port.id.as_str())?;
                if deps.is_empty() {
                    out.push_str(&format!("- `{}` {}\n", port.id, port.display_title()));
                } else {
                    let names: Vec<&str> = deps.iter().map(|d| d.as_str()).collect();
                    out.push_str(&format!(
                        "- `{}` {} (after {})\n",
                        port.id,
                        port.display_title(),
                        names.join(", ")
                    ));
                }
            }

            out.push_str("\n## Recommendations\n\n");
            let mut recommended = false;
            if !open_escalations.is_empty() {
                recommended = true;
                for escalation in &open_escalations {
                    out.push_str(&format!(
                        "- Resolve escalation `{}`: {}\n",
                        escalation.id, escalation.issue
                    ));
                }
            }
            if !blocked.is_empty() {
                recommended = true;
                for port in &blocked {
                    out.push_str(&format!(
                        "- Port `{}` is blocked; resume or deactivate it\n",
                        port.id
                    ));
                }
            }
            if running.is_empty() {
                if let Some(next) = pending.first() {
                    recommended = true;
                    out.push_str(&format!(
                        "- No port is active; consider starting `{}`\n",
                        next.id
                    ));
                }
            }
            if !recommended {
                out.push_str("Nothing outstanding.\n");
            }
            Ok(out)
        })
    }

    /// Write the per-session-end summary under
    /// `.pal/sessions/<yyyy-mm-dd>-<id>.md`. Returns its path.
    pub fn write_session_summary(&self, project_root: &Path, session: &Session) -> Result<PathBuf> {
        let content = self.render_session_summary(session)?;
        let date = session.started_at.format("%Y-%m-%d").to_string();
        let path = paths::session_summary_file(project_root, &date, session.id.as_str());
        paths::write_atomic(&path, &content)?;
        Ok(path)
    }

    /// Duration, port activity, usage rollup, and candidate ADRs for one
    /// session.
    pub fn render_session_summary(&self, session: &Session) -> Result<String> {
        self.store.with_conn(|conn| {
            let ended = session.ended_at.unwrap_or_else(|| self.clock.now());
            let duration_secs = (ended - session.started_at).num_seconds().max(0);

            let started_events = events::list(
                conn,
                session.id.as_str(),
                Some(SessionEventType::PortStart),
                100,
            )?;
            let ended_events = events::list(
                conn,
                session.id.as_str(),
                Some(SessionEventType::PortEnd),
                100,
            )?;
            let escalation_events = events::list(
                conn,
                session.id.as_str(),
                Some(SessionEventType::Escalation),
                100,
            )?;

            let mut out = format!("# Session {}\n\n", session.id);
            out.push_str(&format!(
                "- Kind: {}\n- Status: {}\n- Duration: {}\n- Compactions: {}\n",
                session.kind,
                session.status,
                format_duration_secs(duration_secs),
                session.compact_count,
            ));

            out.push_str("\n## Ports\n\n");
            if started_events.is_empty() && ended_events.is_empty() {
                out.push_str("No port activity.\n");
            }
            for event in ended_events.iter().rev() {
                if let Some(port) = event.event_data.get("port_id").and_then(|v| v.as_str()) {
                    let status = event
                        .event_data
                        .get("status")
                        .and_then(|v| v.as_str())
                        .unwrap_or("complete");
                    out.push_str(&format!("- `{port}` finished ({status})\n"));
                }
            }
            for event in started_events.iter().rev() {
                if let Some(port) = event.event_data.get("port_id").and_then(|v| v.as_str()) {
                    let finished = ended_events
                        .iter()
                        .any(|e| e.event_data.get("port_id").and_then(|v| v.as_str()) == Some(port));
                    if !finished {
                        out.push_str(&format!("- `{port}` started\n"));
                    }
                }
            }

            out.push_str("\n## Usage\n\n");
            out.push_str(&format!(
                "- Input tokens: {}\n- Output tokens: {}\n- Cache read: {}\n- Cache create: {}\n- Cost: ${:.4}\n",
                format_tokens(session.input_tokens),
                format_tokens(session.output_tokens),
                format_tokens(session.cache_read_tokens),
                format_tokens(session.cache_create_tokens),
                session.cost_usd,
            ));

            // ADR candidates: architecture-flavored ports seen in this
            // session's port_end/escalation events.
            let mut adr: Vec<String> = Vec::new();
            for event in ended_events.iter().chain(escalation_events.iter()) {
                let port = event
                    .event_data
                    .get("port_id")
                    .or_else(|| event.event_data.get("port"))
                    .and_then(|v| v.as_str());
                if let Some(port) = port {
                    if adr_candidate_id(port) && !adr.iter().any(|a| a == port) {
                        adr.push(port.to_string());
                    }
                }
            }
            if !adr.is_empty() {
                adr.sort();
                out.push_str("\n## Candidate ADRs\n\n");
                for port in adr {
                    out.push_str(&format!("- `{port}` looks architecture-shaping; consider an ADR\n"));
                }
            }
            Ok(out)
        })
    }
}

#[cfg(test)]
#[path = "briefing_tests.rs"]
mod tests;
