// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal port` - port management commands.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use pal_core::time_fmt::{format_duration_secs, format_tokens};
use pal_core::{Error, Port, PortId, PortStatus};
use pal_engine::{RuleSpec, RulesMaterializer};

use crate::context::Context;
use crate::output::{emit, kv_block};

#[derive(Args)]
pub struct PortArgs {
    #[command(subcommand)]
    pub command: PortCommand,
}

#[derive(Subcommand)]
pub enum PortCommand {
    /// Create a port
    Create {
        /// Port id (slug)
        id: String,
        #[arg(long)]
        title: Option<String>,
        /// Path to the port's spec markdown
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Activate a port on a session (and materialize its rules)
    Activate {
        id: String,
        /// Owning session (defaults to the active session)
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        agent: Option<String>,
    },
    /// Return a running port to pending (and drop its rules)
    Deactivate { id: String },
    /// Force a status transition
    Status {
        id: String,
        /// Target state (pending, running, complete, failed, blocked)
        state: String,
    },
    /// Show one port
    Show { id: String },
    /// List ports
    List {
        #[arg(long = "status")]
        status: Option<String>,
    },
    /// Print the rules markdown for a port
    Rules { id: String },
    /// Usage/duration rollup for a port
    Summary { id: String },
}

pub fn handle(ctx: &Context, command: PortCommand) -> Result<()> {
    let ports = ctx.ports();
    match command {
        PortCommand::Create { id, title, file } => {
            let port = ports.create(&PortId::new(id), title.as_deref(), file.as_deref())?;
            emit(ctx.output, &port, || format!("created port {}", port.id))
        }
        PortCommand::Activate { id, session, agent } => {
            let session_id = ctx.resolve_session(session.as_deref())?;
            let port = ports.activate(&PortId::new(id), &session_id, agent.as_deref())?;
            RulesMaterializer::activate_port(&ctx.project_root, &rule_spec(&port))?;
            emit(ctx.output, &port, || {
                format!("port {} running on session {session_id}", port.id)
            })
        }
        PortCommand::Deactivate { id } => {
            let port = ports.deactivate(&PortId::new(id))?;
            RulesMaterializer::deactivate_port(&ctx.project_root, &port.id)?;
            emit(ctx.output, &port, || {
                format!("port {} is {}", port.id, port.status)
            })
        }
        PortCommand::Status { id, state } => {
            let status = PortStatus::parse(&state)
                .ok_or_else(|| Error::InvalidState(format!("unknown port status: {state}")))?;
            let port = ports.update_status(&PortId::new(id), status)?;
            if status.is_terminal() {
                RulesMaterializer::deactivate_port(&ctx.project_root, &port.id)?;
            }
            emit(ctx.output, &port, || {
                format!("port {} is {}", port.id, port.status)
            })
        }
        PortCommand::Show { id } => {
            let port = ports.get(&PortId::new(id))?;
            let deps = ports.dependencies(&port.id)?;
            emit(ctx.output, &port, || render_show(&port, &deps))
        }
        PortCommand::List { status } => {
            let list = match status.as_deref() {
                Some(raw) => {
                    let status = PortStatus::parse(raw).ok_or_else(|| {
                        Error::InvalidState(format!("unknown port status: {raw}"))
                    })?;
                    ports.list_by_status(status)?
                }
                None => ports.list()?,
            };
            emit(ctx.output, &list, || render_list(&list))
        }
        PortCommand::Rules { id } => {
            let port = ports.get(&PortId::new(id))?;
            let rendered = RulesMaterializer::render(&rule_spec(&port));
            emit(ctx.output, &rendered, || rendered.clone())
        }
        PortCommand::Summary { id } => {
            let port = ports.get(&PortId::new(id))?;
            emit(ctx.output, &port, || {
                kv_block(&[
                    ("id", port.id.to_string()),
                    ("status", port.status.to_string()),
                    ("duration", format_duration_secs(port.duration_secs)),
                    ("input tokens", format_tokens(port.input_tokens)),
                    ("output tokens", format_tokens(port.output_tokens)),
                    ("cost", format!("${:.4}", port.cost_usd)),
                ])
            })
        }
    }
}

fn rule_spec(port: &Port) -> RuleSpec {
    RuleSpec {
        port_id: port.id.clone(),
        title: port.title.clone(),
        spec_path: port.file_path.clone(),
        related_docs: vec![],
    }
}

fn render_show(port: &Port, deps: &[PortId]) -> String {
    let deps = if deps.is_empty() {
        "-".to_string()
    } else {
        deps.iter()
            .map(|d| d.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    kv_block(&[
        ("id", port.id.to_string()),
        ("title", port.display_title().to_string()),
        ("status", port.status.to_string()),
        (
            "session",
            port.session_id
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
        ("depends on", deps),
        (
            "spec",
            port.file_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ])
}

fn render_list(ports: &[Port]) -> String {
    if ports.is_empty() {
        return "No ports".to_string();
    }
    ports
        .iter()
        .map(|p| {
            format!(
                "{:20}  {:8}  {}",
                p.id.short(20),
                p.status,
                p.display_title()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
