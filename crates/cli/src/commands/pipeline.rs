// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal pipeline` (alias `pl`) - author an orchestration's atomic ports.

use anyhow::Result;
use clap::{Args, Subcommand};
use pal_core::{Orchestration, OrchestrationId, PortId};

use crate::context::Context;
use crate::output::{emit, kv_block};

#[derive(Args)]
pub struct PipelineArgs {
    #[command(subcommand)]
    pub command: PipelineCommand,
}

#[derive(Subcommand)]
pub enum PipelineCommand {
    /// Create an empty pipeline
    Create {
        /// Title
        title: String,
        /// Explicit id (generated when absent)
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Append an atomic port
    Add {
        /// Pipeline id
        pipeline: String,
        /// Port id (must exist)
        port: String,
        /// In-level ordering (appended after the last when absent)
        #[arg(long)]
        order: Option<u32>,
        /// Ports this one depends on
        #[arg(long = "after")]
        after: Vec<String>,
    },
    /// List pipelines
    List,
    /// Show one pipeline with its atomic ports
    Show { id: String },
    /// One-line status
    Status { id: String },
}

pub fn handle(ctx: &Context, command: PipelineCommand) -> Result<()> {
    let executor = ctx.executor();
    match command {
        PipelineCommand::Create {
            title,
            id,
            description,
        } => {
            let orchestration =
                executor.create(id.as_deref(), &title, description.as_deref())?;
            emit(ctx.output, &orchestration, || {
                format!("created pipeline {}", orchestration.id)
            })
        }
        PipelineCommand::Add {
            pipeline,
            port,
            order,
            after,
        } => {
            let deps: Vec<PortId> = after.iter().map(|p| PortId::new(p.as_str())).collect();
            let orchestration = executor.add_port(
                &OrchestrationId::new(pipeline),
                &PortId::new(port),
                order,
                &deps,
            )?;
            emit(ctx.output, &orchestration, || {
                format!(
                    "pipeline {} now has {} ports",
                    orchestration.id,
                    orchestration.atomic_ports.len()
                )
            })
        }
        PipelineCommand::List => {
            let list = executor.list()?;
            emit(ctx.output, &list, || render_list(&list))
        }
        PipelineCommand::Show { id } => {
            let orchestration = executor.get(&OrchestrationId::new(id))?;
            emit(ctx.output, &orchestration, || render_show(&orchestration))
        }
        PipelineCommand::Status { id } => {
            let orchestration = executor.get(&OrchestrationId::new(id))?;
            emit(ctx.output, &orchestration, || {
                format!(
                    "{}: {} ({}%)",
                    orchestration.id, orchestration.status, orchestration.progress_percent
                )
            })
        }
    }
}

pub(crate) fn render_list(orchestrations: &[Orchestration]) -> String {
    if orchestrations.is_empty() {
        return "No pipelines".to_string();
    }
    orchestrations
        .iter()
        .map(|o| {
            format!(
                "{:16}  {:9}  {:3}%  {}",
                o.id.short(16),
                o.status,
                o.progress_percent,
                o.title
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn render_show(orchestration: &Orchestration) -> String {
    let mut out = kv_block(&[
        ("id", orchestration.id.to_string()),
        ("title", orchestration.title.clone()),
        ("status", orchestration.status.to_string()),
        ("progress", format!("{}%", orchestration.progress_percent)),
        (
            "current",
            orchestration
                .current_port_id
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]);
    out.push_str("\n\nports:");
    for atomic in &orchestration.atomic_ports {
        let deps = if atomic.depends_on.is_empty() {
            String::new()
        } else {
            format!(
                " (after {})",
                atomic
                    .depends_on
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        };
        let retries = if atomic.retry_count > 0 || atomic.test_retry_count > 0 {
            format!(
                " [retries impl={} test={}]",
                atomic.retry_count, atomic.test_retry_count
            )
        } else {
            String::new()
        };
        out.push_str(&format!(
            "\n  {:3}. {:20} {:8}{deps}{retries}",
            atomic.order,
            atomic.port_id.as_str(),
            atomic.status
        ));
    }
    out
}
