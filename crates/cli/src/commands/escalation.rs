// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal escalation` - raise and resolve issues needing a human.

use anyhow::Result;
use clap::{Args, Subcommand};
use pal_core::{Error, Escalation, EscalationId, EscalationStatus, PortId, SessionId};
use pal_storage::queries;

use crate::context::Context;
use crate::output::{emit, kv_block};

#[derive(Args)]
pub struct EscalationArgs {
    #[command(subcommand)]
    pub command: EscalationCommand,
}

#[derive(Subcommand)]
pub enum EscalationCommand {
    /// Raise an escalation
    Create {
        /// What needs attention
        issue: String,
        /// Originating session
        #[arg(long)]
        session: Option<String>,
        /// Originating port
        #[arg(long)]
        port: Option<String>,
    },
    /// List escalations (open only by default)
    List {
        #[arg(long)]
        all: bool,
    },
    /// Show one escalation
    Show { id: String },
    /// Mark resolved
    Resolve { id: String },
    /// Dismiss without action
    Dismiss { id: String },
}

pub fn handle(ctx: &Context, command: EscalationCommand) -> Result<()> {
    match command {
        EscalationCommand::Create {
            issue,
            session,
            port,
        } => {
            let escalation = Escalation {
                id: EscalationId::new(format!("esc-{}", pal_core::IdGen::next_short(&ctx.ids))),
                from_session: session.map(SessionId::new),
                from_port: port.map(PortId::new),
                issue,
                status: EscalationStatus::Open,
                created_at: pal_core::Clock::now(&ctx.clock),
                resolved_at: None,
            };
            ctx.store
                .with_tx(|tx| Ok(queries::escalations::insert(tx, &escalation)?))?;
            emit(ctx.output, &escalation, || {
                format!("escalation {} opened", escalation.id)
            })
        }
        EscalationCommand::List { all } => {
            let filter = if all { None } else { Some(EscalationStatus::Open) };
            let list = ctx
                .store
                .with_conn(|conn| Ok(queries::escalations::list(conn, filter)?))?;
            emit(ctx.output, &list, || {
                if list.is_empty() {
                    "No escalations".to_string()
                } else {
                    list.iter()
                        .map(|e| format!("{:12}  {:9}  {}", e.id.short(12), e.status, e.issue))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })
        }
        EscalationCommand::Show { id } => {
            let escalation = get(ctx, &id)?;
            emit(ctx.output, &escalation, || {
                kv_block(&[
                    ("id", escalation.id.to_string()),
                    ("status", escalation.status.to_string()),
                    ("issue", escalation.issue.clone()),
                    (
                        "session",
                        escalation
                            .from_session
                            .as_ref()
                            .map(|s| s.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                    (
                        "port",
                        escalation
                            .from_port
                            .as_ref()
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                    ),
                ])
            })
        }
        EscalationCommand::Resolve { id } => close(ctx, &id, EscalationStatus::Resolved),
        EscalationCommand::Dismiss { id } => close(ctx, &id, EscalationStatus::Dismissed),
    }
}

fn get(ctx: &Context, id: &str) -> Result<Escalation> {
    Ok(ctx.store.with_conn(|conn| {
        queries::escalations::get(conn, id)?
            .ok_or_else(|| Error::not_found("escalation", id))
    })?)
}

fn close(ctx: &Context, id: &str, status: EscalationStatus) -> Result<()> {
    let escalation = get(ctx, id)?;
    if escalation.status.is_closed() {
        return emit(ctx.output, &escalation, || {
            format!("escalation {} already {}", escalation.id, escalation.status)
        });
    }
    let now = pal_core::Clock::now(&ctx.clock);
    ctx.store.with_tx(|tx| {
        queries::escalations::set_status(tx, id, status, Some(&now))?;
        Ok(())
    })?;
    let escalation = get(ctx, id)?;
    emit(ctx.output, &escalation, || {
        format!("escalation {} {}", escalation.id, escalation.status)
    })
}
