// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal session` - session management commands.

use anyhow::Result;
use clap::{Args, Subcommand};
use pal_core::time_fmt::format_tokens;
use pal_core::{Error, Session, SessionEventType, SessionId, SessionKind};
use pal_engine::sessions::{SessionTree, StartSession};
use pal_storage::queries;

use crate::context::Context;
use crate::output::{emit, kv_block};

#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(Subcommand)]
pub enum SessionCommand {
    /// Start a session explicitly
    Start {
        /// Session kind (main, sub, builder, operator, worker, test)
        #[arg(long, default_value = "main")]
        kind: String,
        /// Parent session id
        #[arg(long)]
        parent: Option<String>,
        /// External runtime session id
        #[arg(long)]
        external_id: Option<String>,
    },
    /// End a session
    End {
        /// Session id (defaults to the active session)
        id: Option<String>,
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// List recent sessions
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one session
    Show {
        /// Session id
        id: String,
    },
    /// Show the session subtree
    Tree {
        /// Root session id
        id: String,
    },
    /// List a session's event log
    Events {
        /// Session id
        id: String,
        /// Filter by event type
        #[arg(long = "type")]
        event_type: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

pub fn handle(ctx: &Context, command: SessionCommand) -> Result<()> {
    let sessions = ctx.sessions();
    match command {
        SessionCommand::Start {
            kind,
            parent,
            external_id,
        } => {
            let kind = SessionKind::parse(&kind)
                .ok_or_else(|| Error::InvalidState(format!("unknown session kind: {kind}")))?;
            let session = sessions.start(StartSession {
                kind: Some(kind),
                parent_id: parent.map(SessionId::new),
                project_root: Some(ctx.project_root.clone()),
                cwd: std::env::current_dir().ok(),
                external_session_id: external_id,
                ..StartSession::default()
            })?;
            emit(ctx.output, &session, || {
                format!("started session {} ({})", session.id, session.kind)
            })
        }
        SessionCommand::End { id, reason } => {
            let id = ctx.resolve_session(id.as_deref())?;
            let session = sessions.end(&id, &reason)?;
            emit(ctx.output, &session, || {
                format!("session {} is {}", session.id, session.status)
            })
        }
        SessionCommand::List { limit } => {
            let list = sessions.list_recent(limit)?;
            emit(ctx.output, &list, || render_list(&list))
        }
        SessionCommand::Show { id } => {
            let session = sessions.get(&SessionId::new(id))?;
            emit(ctx.output, &session, || render_show(&session))
        }
        SessionCommand::Tree { id } => {
            let tree = sessions.tree(&SessionId::new(id))?;
            emit(ctx.output, &tree, || {
                let mut out = String::new();
                render_tree(&tree, 0, &mut out);
                out.trim_end().to_string()
            })
        }
        SessionCommand::Events {
            id,
            event_type,
            limit,
        } => {
            let filter = match event_type.as_deref() {
                Some(raw) => Some(SessionEventType::parse(raw).ok_or_else(|| {
                    Error::InvalidState(format!("unknown event type: {raw}"))
                })?),
                None => None,
            };
            let events = ctx
                .store
                .with_conn(|conn| Ok(queries::events::list(conn, &id, filter, limit)?))?;
            emit(ctx.output, &events, || {
                events
                    .iter()
                    .map(|e| {
                        format!(
                            "{}  {:14}  {}",
                            e.created_at.format("%Y-%m-%d %H:%M:%S"),
                            e.event_type,
                            e.event_data
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

fn render_list(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No sessions".to_string();
    }
    sessions
        .iter()
        .map(|s| {
            format!(
                "{:10}  {:8}  {:9}  {}",
                s.id.short(10),
                s.kind,
                s.status,
                s.started_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_show(session: &Session) -> String {
    kv_block(&[
        ("id", session.id.to_string()),
        ("kind", session.kind.to_string()),
        ("status", session.status.to_string()),
        (
            "parent",
            session
                .parent_id
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("depth", session.depth.to_string()),
        (
            "started",
            session.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ),
        (
            "input tokens",
            format_tokens(session.input_tokens),
        ),
        (
            "output tokens",
            format_tokens(session.output_tokens),
        ),
        ("cost", format!("${:.4}", session.cost_usd)),
        ("compactions", session.compact_count.to_string()),
    ])
}

fn render_tree(tree: &SessionTree, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    out.push_str(&format!(
        "{indent}{} ({}, {})\n",
        tree.session.id, tree.session.kind, tree.session.status
    ));
    for child in &tree.children {
        render_tree(child, depth + 1, out);
    }
}
