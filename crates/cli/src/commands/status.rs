// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal status` - the aggregate dashboard.

use anyhow::Result;
use clap::Args;
use pal_core::{EscalationStatus, PortStatus};
use pal_storage::queries;

use crate::context::Context;
use crate::output::emit;

#[derive(Args)]
pub struct StatusArgs {}

#[derive(serde::Serialize)]
struct Dashboard {
    running_sessions: usize,
    ports: PortCounts,
    orchestrations: Vec<OrchestrationLine>,
    open_escalations: usize,
    held_locks: usize,
}

#[derive(serde::Serialize)]
struct PortCounts {
    pending: usize,
    running: usize,
    blocked: usize,
    complete: usize,
    failed: usize,
}

#[derive(serde::Serialize)]
struct OrchestrationLine {
    id: String,
    title: String,
    status: String,
    progress_percent: u32,
}

pub fn handle(ctx: &Context, _args: StatusArgs) -> Result<()> {
    let dashboard = ctx.store.with_conn(|conn| {
        let count = |status: PortStatus| -> pal_core::Result<usize> {
            Ok(queries::ports::list_by_status(conn, status)?.len())
        };
        Ok(Dashboard {
            running_sessions: queries::sessions::list_running(conn)?.len(),
            ports: PortCounts {
                pending: count(PortStatus::Pending)?,
                running: count(PortStatus::Running)?,
                blocked: count(PortStatus::Blocked)?,
                complete: count(PortStatus::Complete)?,
                failed: count(PortStatus::Failed)?,
            },
            orchestrations: queries::orchestrations::list(conn)?
                .into_iter()
                .map(|o| OrchestrationLine {
                    id: o.id.to_string(),
                    title: o.title,
                    status: o.status.to_string(),
                    progress_percent: o.progress_percent,
                })
                .collect(),
            open_escalations: queries::escalations::list(conn, Some(EscalationStatus::Open))?
                .len(),
            held_locks: queries::locks::list(conn)?.len(),
        })
    })?;

    emit(ctx.output, &dashboard, || {
        let mut out = format!(
            "sessions   {} running\nports      {} pending, {} running, {} blocked, {} complete, {} failed\nescalations {} open\nlocks      {} held",
            dashboard.running_sessions,
            dashboard.ports.pending,
            dashboard.ports.running,
            dashboard.ports.blocked,
            dashboard.ports.complete,
            dashboard.ports.failed,
            dashboard.open_escalations,
            dashboard.held_locks,
        );
        if !dashboard.orchestrations.is_empty() {
            out.push_str("\n\norchestrations:");
            for line in &dashboard.orchestrations {
                out.push_str(&format!(
                    "\n  {:16}  {:9}  {:3}%  {}",
                    line.id, line.status, line.progress_percent, line.title
                ));
            }
        }
        out
    })
}
