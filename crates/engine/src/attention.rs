// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session token accounting and checkpoint policy.
//!
//! `on_usage` records the session's current context load; when the load
//! crosses a configured budget threshold, a checkpoint is cut capturing
//! where the work stood. At most one checkpoint per (session, trigger)
//! within the debounce window.

use chrono::Duration as ChronoDuration;

use pal_core::{
    focus_score, AttentionSnapshot, Checkpoint, CheckpointTrigger, Clock, Error, IdGen, PalConfig,
    Result, SessionEventType, SessionId,
};
use pal_storage::queries::{attention, events, ports, sessions};
use pal_storage::Store;

/// How far back compactions count against the focus score.
const COMPACT_RECENCY_SECS: i64 = 3600;

/// How many recent file edits feed a checkpoint's active-file list.
const ACTIVE_FILE_LIMIT: u32 = 10;

/// How many recent decision/escalation events feed the summary.
const KEY_POINT_LIMIT: u32 = 5;

pub struct AttentionTracker<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
    ids: &'a dyn IdGen,
    config: &'a PalConfig,
}

impl<'a> AttentionTracker<'a> {
    pub fn new(
        store: &'a Store,
        clock: &'a dyn Clock,
        ids: &'a dyn IdGen,
        config: &'a PalConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            config,
        }
    }

    /// Compute and persist a snapshot of the session's attention.
    pub fn snapshot(&self, session_id: &SessionId) -> Result<AttentionSnapshot> {
        let now = self.clock.now();
        let budget = self.config.token_budget;
        self.store.with_tx(|tx| {
            let session = sessions::get(tx, session_id.as_str())?
                .ok_or_else(|| Error::not_found("session", session_id.as_str()))?;
            let loaded = attention::latest_snapshot(tx, session_id.as_str())?
                .map(|s| s.loaded_tokens)
                .unwrap_or(session.input_tokens + session.output_tokens);
            let port = ports::running_for_session(tx, session_id.as_str())?;
            let recent_compacts = self.recent_compacts(tx, session_id)?;

            let snapshot = AttentionSnapshot {
                session_id: session_id.clone(),
                port_id: port.map(|p| p.id),
                loaded_tokens: loaded,
                available_tokens: (budget - loaded).max(0),
                focus_score: focus_score(loaded, budget, recent_compacts),
                compact_count: session.compact_count,
                created_at: now,
            };
            attention::insert_snapshot(tx, &snapshot)?;
            Ok(snapshot)
        })
    }

    /// Record the session's current context load and cut a threshold
    /// checkpoint when a budget line is crossed. Returns the checkpoint, if
    /// one was taken.
    pub fn on_usage(&self, session_id: &SessionId, tokens_used: i64) -> Result<Option<Checkpoint>> {
        if tokens_used < 0 {
            return Err(Error::InvalidState(
                "tokens_used must be non-negative".to_string(),
            ));
        }
        let now = self.clock.now();
        let budget = self.config.token_budget;
        let warn = self.config.checkpoint.warn_threshold;
        let critical = self.config.checkpoint.critical_threshold;

        self.store.with_tx(|tx| {
            let session = sessions::get(tx, session_id.as_str())?
                .ok_or_else(|| Error::not_found("session", session_id.as_str()))?;
            let previous = attention::latest_snapshot(tx, session_id.as_str())?
                .map(|s| s.loaded_tokens)
                .unwrap_or(0);
            let port = ports::running_for_session(tx, session_id.as_str())?;
            let recent_compacts = self.recent_compacts(tx, session_id)?;

            attention::insert_snapshot(
                tx,
                &AttentionSnapshot {
                    session_id: session_id.clone(),
                    port_id: port.as_ref().map(|p| p.id.clone()),
                    loaded_tokens: tokens_used,
                    available_tokens: (budget - tokens_used).max(0),
                    focus_score: focus_score(tokens_used, budget, recent_compacts),
                    compact_count: session.compact_count,
                    created_at: now,
                },
            )?;

            let prev_ratio = previous as f64 / budget as f64;
            let new_ratio = tokens_used as f64 / budget as f64;
            let trigger = if prev_ratio < critical && new_ratio >= critical {
                Some(CheckpointTrigger::Auto90)
            } else if prev_ratio < warn && new_ratio >= warn {
                Some(CheckpointTrigger::Auto80)
            } else {
                None
            };
            let Some(trigger) = trigger else {
                return Ok(None);
            };

            if self.debounced(tx, session_id, trigger)? {
                tracing::debug!(session = %session_id, %trigger, "checkpoint debounced");
                return Ok(None);
            }

            let checkpoint = self.build_checkpoint(
                tx,
                session_id,
                port.map(|p| p.id),
                trigger,
                tokens_used,
                None,
            )?;
            attention::insert_checkpoint(tx, &checkpoint)?;
            tracing::info!(session = %session_id, %trigger, tokens_used, "checkpoint taken");
            Ok(Some(checkpoint))
        })
    }

    /// Cut a checkpoint on demand, outside the threshold policy. Debounced
    /// like the automatic ones.
    pub fn manual_checkpoint(
        &self,
        session_id: &SessionId,
        summary: Option<&str>,
    ) -> Result<Option<Checkpoint>> {
        self.store.with_tx(|tx| {
            if sessions::get(tx, session_id.as_str())?.is_none() {
                return Err(Error::not_found("session", session_id.as_str()));
            }
            if self.debounced(tx, session_id, CheckpointTrigger::Manual)? {
                return Ok(None);
            }
            let loaded = attention::latest_snapshot(tx, session_id.as_str())?
                .map(|s| s.loaded_tokens)
                .unwrap_or(0);
            let port = ports::running_for_session(tx, session_id.as_str())?.map(|p| p.id);
            let checkpoint = self.build_checkpoint(
                tx,
                session_id,
                port,
                CheckpointTrigger::Manual,
                loaded,
                summary,
            )?;
            attention::insert_checkpoint(tx, &checkpoint)?;
            Ok(Some(checkpoint))
        })
    }

    pub fn checkpoints(&self, session_id: &SessionId) -> Result<Vec<Checkpoint>> {
        self.store
            .with_conn(|conn| Ok(attention::list_checkpoints(conn, session_id.as_str())?))
    }

    /// Compactions within the recency window, for focus-score dampening.
    fn recent_compacts(
        &self,
        conn: &pal_storage::Connection,
        session_id: &SessionId,
    ) -> Result<u32> {
        let since = self.clock.now() - ChronoDuration::seconds(COMPACT_RECENCY_SECS);
        let recent = events::list_since(
            conn,
            session_id.as_str(),
            SessionEventType::Compact,
            &since,
        )?;
        Ok(recent.len() as u32)
    }

    fn debounced(
        &self,
        conn: &pal_storage::Connection,
        session_id: &SessionId,
        trigger: CheckpointTrigger,
    ) -> Result<bool> {
        let Some(last) = attention::latest_checkpoint(conn, session_id.as_str(), trigger)? else {
            return Ok(false);
        };
        let window = ChronoDuration::seconds(self.config.checkpoint.debounce_secs as i64);
        Ok(self.clock.now() - last.created_at < window)
    }

    /// Assemble checkpoint content from the recent event log: active files
    /// from `file_edit` events, key points from `decision`/`escalation`.
    fn build_checkpoint(
        &self,
        conn: &pal_storage::Connection,
        session_id: &SessionId,
        port_id: Option<pal_core::PortId>,
        trigger: CheckpointTrigger,
        tokens_used: i64,
        summary_override: Option<&str>,
    ) -> Result<Checkpoint> {
        let mut active_files = Vec::new();
        for event in events::list(
            conn,
            session_id.as_str(),
            Some(SessionEventType::FileEdit),
            ACTIVE_FILE_LIMIT,
        )? {
            if let Some(file) = event.event_data.get("file").and_then(|v| v.as_str()) {
                if !active_files.iter().any(|f| f == file) {
                    active_files.push(file.to_string());
                }
            }
        }

        let mut key_points = Vec::new();
        for event_type in [SessionEventType::Decision, SessionEventType::Escalation] {
            for event in events::list(conn, session_id.as_str(), Some(event_type), KEY_POINT_LIMIT)?
            {
                if let Some(text) = event.event_data.get("message").and_then(|v| v.as_str()) {
                    key_points.push(format!("{}: {}", event_type.as_str(), text));
                }
            }
        }

        let summary = match summary_override {
            Some(s) => s.to_string(),
            None if key_points.is_empty() => {
                format!("{} checkpoint at {} tokens", trigger.as_str(), tokens_used)
            }
            None => key_points.join("; "),
        };

        Ok(Checkpoint {
            id: format!("cp-{}", self.ids.next_short()),
            session_id: session_id.clone(),
            port_id,
            trigger_type: trigger,
            tokens_used,
            token_budget: self.config.token_budget,
            summary,
            active_files,
            key_points,
            created_at: self.clock.now(),
        })
    }
}

#[cfg(test)]
#[path = "attention_tests.rs"]
mod tests;
