// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal orchestration` - execution control for orchestrations.

use anyhow::Result;
use clap::{Args, Subcommand};
use pal_core::{OrchestrationId, SessionKind};
use pal_engine::sessions::StartSession;

use crate::commands::pipeline;
use crate::context::Context;
use crate::output::emit;

#[derive(Args)]
pub struct OrchestrationArgs {
    #[command(subcommand)]
    pub command: OrchestrationCommand,
}

#[derive(Subcommand)]
pub enum OrchestrationCommand {
    /// Create an orchestration
    Create {
        title: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Start executing (spawns the operator session when absent)
    Start {
        id: String,
        /// Operator session id; a fresh operator session is created when
        /// not given
        #[arg(long)]
        operator: Option<String>,
    },
    /// Pause scheduling
    Pause { id: String },
    /// Resume scheduling
    Resume { id: String },
    /// Cancel; active workers complete with failure
    Cancel { id: String },
    /// Execution snapshot
    Show { id: String },
    /// List orchestrations
    List,
}

pub fn handle(ctx: &Context, command: OrchestrationCommand) -> Result<()> {
    let executor = ctx.executor();
    match command {
        OrchestrationCommand::Create {
            title,
            id,
            description,
        } => {
            let orchestration =
                executor.create(id.as_deref(), &title, description.as_deref())?;
            emit(ctx.output, &orchestration, || {
                format!("created orchestration {}", orchestration.id)
            })
        }
        OrchestrationCommand::Start { id, operator } => {
            let operator_id = match operator {
                Some(explicit) => ctx.resolve_session(Some(&explicit))?,
                None => {
                    ctx.sessions()
                        .start(StartSession {
                            kind: Some(SessionKind::Operator),
                            project_root: Some(ctx.project_root.clone()),
                            cwd: std::env::current_dir().ok(),
                            ..StartSession::default()
                        })?
                        .id
                }
            };
            let state = executor.start(
                &OrchestrationId::new(id),
                &operator_id,
                Some(&ctx.project_root),
            )?;
            emit(ctx.output, &state, || {
                format!(
                    "orchestration {} running under operator {} ({} active workers)",
                    state.orchestration_id,
                    operator_id,
                    state.active_workers.len()
                )
            })
        }
        OrchestrationCommand::Pause { id } => {
            let orchestration = executor.pause(&OrchestrationId::new(id))?;
            emit(ctx.output, &orchestration, || {
                format!("orchestration {} paused", orchestration.id)
            })
        }
        OrchestrationCommand::Resume { id } => {
            let orchestration = executor.resume(&OrchestrationId::new(id))?;
            emit(ctx.output, &orchestration, || {
                format!("orchestration {} running", orchestration.id)
            })
        }
        OrchestrationCommand::Cancel { id } => {
            let orchestration = executor.cancel(&OrchestrationId::new(id))?;
            emit(ctx.output, &orchestration, || {
                format!("orchestration {} cancelled", orchestration.id)
            })
        }
        OrchestrationCommand::Show { id } => {
            let id = OrchestrationId::new(id);
            let orchestration = executor.get(&id)?;
            let state = executor.state(&id)?;
            emit(ctx.output, &state, || {
                let mut out = pipeline::render_show(&orchestration);
                if !state.active_workers.is_empty() {
                    out.push_str(&format!(
                        "\n\nactive workers: {}",
                        state
                            .active_workers
                            .iter()
                            .map(|w| w.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ));
                }
                out
            })
        }
        OrchestrationCommand::List => {
            let list = executor.list()?;
            emit(ctx.output, &list, || pipeline::render_list(&list))
        }
    }
}
