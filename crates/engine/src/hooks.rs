// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook handlers.
//!
//! Each handler adapts one externally-delivered lifecycle event onto the
//! managers. Handlers are idempotent: replaying the same payload finds the
//! already-created session, the already-running port, the already-removed
//! rule file. State changes that committed stay committed even when a later
//! best-effort step (transcript capture, briefing write) fails.

use std::path::{Path, PathBuf};

use pal_core::{
    Clock, Error, HookInput, HookResponse, IdGen, PalConfig, PortId, PortStatus, Result,
    SessionEventType, SessionId, SessionKind,
};
use pal_storage::queries::{events, ports as port_queries};
use pal_storage::Store;
use serde_json::json;

use crate::attention::AttentionTracker;
use crate::briefing::BriefingGenerator;
use crate::executor::Executor;
use crate::ports::PortManager;
use crate::rules::{RuleSpec, RulesMaterializer};
use crate::sessions::{SessionManager, StartSession};
use crate::transcript;

/// What a handler hands back to the CLI: the stdout response, an optional
/// stderr warning, and the session the hook resolved to.
#[derive(Debug, Default)]
pub struct HookOutcome {
    pub response: HookResponse,
    pub warning: Option<String>,
    pub session_id: Option<SessionId>,
}

impl HookOutcome {
    fn for_session(session_id: SessionId) -> Self {
        Self {
            session_id: Some(session_id),
            ..Self::default()
        }
    }
}

pub struct HookHandlers<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    ids: &'a dyn IdGen,
    config: &'a PalConfig,
    project_root: PathBuf,
}

impl<'a> HookHandlers<'a> {
    pub fn new(
        store: &'a Store,
        clock: &'a dyn Clock,
        ids: &'a dyn IdGen,
        config: &'a PalConfig,
        project_root: &Path,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            config,
            project_root: project_root.to_owned(),
        }
    }

    fn sessions(&self) -> SessionManager<'a> {
        SessionManager::new(self.store, self.clock, self.ids)
    }

    fn ports(&self) -> PortManager<'a> {
        PortManager::new(self.store, self.clock)
    }

    fn attention(&self) -> AttentionTracker<'a> {
        AttentionTracker::new(self.store, self.clock, self.ids, self.config)
    }

    fn find_active(&self, input: &HookInput) -> Result<pal_core::Session> {
        self.sessions().find_active(
            input.session_id.as_deref(),
            input.cwd.as_deref().map(Path::new),
            Some(&self.project_root),
        )
    }

    /// session_start: reap zombies, find-or-create the session, capture the
    /// opening user message, write the briefing.
    pub fn session_start(&self, input: &HookInput) -> Result<HookOutcome> {
        let sessions = self.sessions();
        let reaped = sessions.cleanup_zombies(self.config.zombie_ttl())?;
        if reaped > 0 {
            tracing::info!(reaped, "zombie sessions cleaned before start");
        }

        let session = match self.find_active(input) {
            Ok(existing) => existing,
            Err(Error::NotFound { .. }) => sessions.start(StartSession {
                kind: Some(SessionKind::Main),
                project_root: Some(self.project_root.clone()),
                cwd: input.cwd.as_deref().map(PathBuf::from),
                external_session_id: input.session_id.clone(),
                transcript_path: input.transcript_path.as_deref().map(PathBuf::from),
                ..StartSession::default()
            })?,
            Err(other) => return Err(other),
        };

        sessions.update_context(
            &session.id,
            Some(&self.project_root),
            input.cwd.as_deref().map(Path::new),
            input.session_id.as_deref(),
            input.transcript_path.as_deref().map(Path::new),
        )?;
        sessions.heartbeat(&session.id)?;

        // Best-effort: the opening user prompt becomes a user_request event.
        if let Some(path) = input.transcript_path.as_deref() {
            match transcript::parse_transcript(Path::new(path)) {
                Ok(summary) => {
                    if let Some(first) = summary.first_user_message {
                        let now = self.clock.now();
                        self.store.with_tx(|tx| {
                            events::append(
                                tx,
                                session.id.as_str(),
                                SessionEventType::UserRequest,
                                &json!({"message": first}),
                                &now,
                            )?;
                            Ok(())
                        })?;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "first-message capture skipped"),
            }
        }

        BriefingGenerator::new(self.store, self.clock)
            .write_session_briefing(&self.project_root)?;
        Ok(HookOutcome::for_session(session.id))
    }

    /// session_end: pull final usage from the transcript, reconcile any
    /// still-running port, end the session, write the summary.
    pub fn session_end(&self, input: &HookInput) -> Result<HookOutcome> {
        let sessions = self.sessions();
        let session = match self.find_active(input) {
            Ok(session) => session,
            Err(Error::NotFound { .. }) => {
                return Ok(HookOutcome {
                    warning: Some("no active session to end".to_string()),
                    ..HookOutcome::default()
                })
            }
            Err(other) => return Err(other),
        };

        let transcript_path = input
            .transcript_path
            .as_deref()
            .map(PathBuf::from)
            .or_else(|| session.transcript_path.clone());
        if let Some(path) = transcript_path {
            match transcript::parse_transcript_with_retry(&path) {
                Ok(summary) if !summary.usage.is_zero() => {
                    sessions.update_usage(&session.id, &summary.usage)?;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "session_end without usage update"),
            }
        }

        // Final attention reading; a threshold crossing here leaves a
        // checkpoint behind as the resume anchor for the next session.
        let refreshed = sessions.get(&session.id)?;
        if let Err(e) = self
            .attention()
            .on_usage(&session.id, refreshed.input_tokens + refreshed.output_tokens)
        {
            tracing::warn!(error = %e, "attention update at session end failed");
        }

        // A port still running on this session survives as blocked; its
        // rules leave the disk with the session.
        if let Some(port) = self.ports().running_for_session(&session.id)? {
            let now = self.clock.now();
            self.store.with_tx(|tx| {
                port_queries::set_status(tx, port.id.as_str(), PortStatus::Blocked)?;
                events::append(
                    tx,
                    session.id.as_str(),
                    SessionEventType::Escalation,
                    &json!({
                        "message": format!("session ended while port {} was running", port.id),
                        "port_id": port.id.as_str(),
                    }),
                    &now,
                )?;
                Ok(())
            })?;
            RulesMaterializer::deactivate_port(&self.project_root, &port.id)?;
        }

        let reason = input.reason.as_deref().unwrap_or("session_end");
        let ended = sessions.end(&session.id, reason)?;
        BriefingGenerator::new(self.store, self.clock)
            .write_session_summary(&self.project_root, &ended)?;
        Ok(HookOutcome::for_session(ended.id))
    }

    /// pre_tool_use: edits against a running port log `file_edit`; edits
    /// with no port log `untracked_edit` and warn.
    pub fn pre_tool_use(&self, input: &HookInput) -> Result<HookOutcome> {
        let tool = input.tool_name.as_deref().unwrap_or_default();
        if tool != "Edit" && tool != "Write" {
            return Ok(HookOutcome::default());
        }
        let session = match self.find_active(input) {
            Ok(session) => session,
            Err(Error::NotFound { .. }) => return Ok(HookOutcome::default()),
            Err(other) => return Err(other),
        };
        self.sessions().heartbeat(&session.id)?;

        let file = input.tool_file_path().unwrap_or_default();
        let running = self.ports().running_for_session(&session.id)?;
        let now = self.clock.now();
        let mut outcome = HookOutcome::for_session(session.id.clone());
        self.store.with_tx(|tx| {
            match &running {
                Some(port) => {
                    events::append(
                        tx,
                        session.id.as_str(),
                        SessionEventType::FileEdit,
                        &json!({"file": file, "tool": tool, "port_id": port.id.as_str()}),
                        &now,
                    )?;
                }
                None => {
                    events::append(
                        tx,
                        session.id.as_str(),
                        SessionEventType::UntrackedEdit,
                        &json!({"file": file, "tool": tool}),
                        &now,
                    )?;
                }
            }
            Ok(())
        })?;
        if running.is_none() {
            outcome.warning = Some(format!(
                "edit to {file} is not tracked by any port; run `pal port activate` first"
            ));
        }
        Ok(outcome)
    }

    /// post_tool_use: reserved.
    pub fn post_tool_use(&self, _input: &HookInput) -> Result<HookOutcome> {
        Ok(HookOutcome::default())
    }

    /// stop: reserved.
    pub fn stop(&self, _input: &HookInput) -> Result<HookOutcome> {
        Ok(HookOutcome::default())
    }

    /// pre_compact: count the compaction and log it.
    pub fn pre_compact(&self, input: &HookInput) -> Result<HookOutcome> {
        let session = match self.find_active(input) {
            Ok(session) => session,
            Err(Error::NotFound { .. }) => return Ok(HookOutcome::default()),
            Err(other) => return Err(other),
        };
        let sessions = self.sessions();
        sessions.heartbeat(&session.id)?;
        let count = sessions.increment_compact(&session.id)?;
        let now = self.clock.now();
        let trigger = input.trigger.clone().unwrap_or_else(|| "auto".to_string());
        self.store.with_tx(|tx| {
            events::append(
                tx,
                session.id.as_str(),
                SessionEventType::Compact,
                &json!({"trigger": trigger, "compact_count": count}),
                &now,
            )?;
            Ok(())
        })?;

        // Record where attention stood when the window filled up.
        if let Err(e) = self.attention().snapshot(&session.id) {
            tracing::warn!(error = %e, "attention snapshot at compaction failed");
        }
        Ok(HookOutcome::for_session(session.id))
    }

    /// port_start: activate the port on the active session, materialize its
    /// rules, and nudge the orchestration scheduler when relevant.
    pub fn port_start(
        &self,
        input: &HookInput,
        port_id: &PortId,
        executor: &Executor<'_>,
    ) -> Result<HookOutcome> {
        let session = self.find_active(input)?;
        self.sessions().heartbeat(&session.id)?;
        let port = self.ports().activate(port_id, &session.id, None)?;

        RulesMaterializer::activate_port(
            &self.project_root,
            &RuleSpec {
                port_id: port.id.clone(),
                title: port.title.clone(),
                spec_path: port.file_path.clone(),
                related_docs: vec![],
            },
        )?;

        let in_orchestration = self.store.with_conn(|conn| {
            Ok(pal_storage::queries::orchestrations::containing_port(
                conn,
                port_id.as_str(),
            )?)
        })?;
        if let Some(orchestration_id) = in_orchestration {
            executor.process_next_ports(&orchestration_id)?;
        }
        Ok(HookOutcome::for_session(session.id))
    }

    /// port_end: record completion (usage optional), drop the rules file.
    pub fn port_end(
        &self,
        input: &HookInput,
        port_id: &PortId,
        input_tokens: i64,
        output_tokens: i64,
        cost_usd: f64,
    ) -> Result<HookOutcome> {
        let session = self.find_active(input).ok().map(|s| s.id);
        if let Some(session_id) = &session {
            self.sessions().heartbeat(session_id)?;
        }
        self.ports()
            .record_completion(port_id, input_tokens, output_tokens, cost_usd)?;
        RulesMaterializer::deactivate_port(&self.project_root, port_id)?;
        Ok(HookOutcome {
            session_id: session,
            ..HookOutcome::default()
        })
    }

    /// sync: reconcile the rules directory with the running-port set.
    pub fn sync(&self, _input: &HookInput) -> Result<HookOutcome> {
        let running = self.ports().list_by_status(PortStatus::Running)?;
        let specs: Vec<RuleSpec> = running
            .iter()
            .map(|port| RuleSpec {
                port_id: port.id.clone(),
                title: port.title.clone(),
                spec_path: port.file_path.clone(),
                related_docs: vec![],
            })
            .collect();
        let outcome = RulesMaterializer::sync(&self.project_root, &specs)?;
        Ok(HookOutcome {
            response: HookResponse {
                hook_specific_output: Some(json!({
                    "activated": outcome.activated,
                    "deactivated": outcome.deactivated,
                })),
                ..HookResponse::default()
            },
            ..HookOutcome::default()
        })
    }

    /// event: append a decision/escalation/user_request to the active
    /// session's log.
    pub fn event(
        &self,
        input: &HookInput,
        event_type: &str,
        message: Option<&str>,
    ) -> Result<HookOutcome> {
        let event_type = match SessionEventType::parse(event_type) {
            Some(
                t @ (SessionEventType::Decision
                | SessionEventType::Escalation
                | SessionEventType::UserRequest),
            ) => t,
            _ => {
                return Err(Error::InvalidState(format!(
                    "event type {event_type} is not recordable from hooks"
                )))
            }
        };
        let session = self.find_active(input)?;
        self.sessions().heartbeat(&session.id)?;
        let message = message
            .map(str::to_string)
            .or_else(|| input.message.clone())
            .unwrap_or_default();
        let now = self.clock.now();
        self.store.with_tx(|tx| {
            events::append(
                tx,
                session.id.as_str(),
                event_type,
                &json!({"message": message}),
                &now,
            )?;
            Ok(())
        })?;
        Ok(HookOutcome::for_session(session.id))
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
