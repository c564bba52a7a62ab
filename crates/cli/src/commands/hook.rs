// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal hook` - adapters invoked by the assistant runtime.
//!
//! Every handler reads one JSON object from stdin (absent stdin is an empty
//! object), applies the state change, and optionally writes a JSON response
//! to stdout. Warnings go to stderr; the exit code reflects the error kind.

use std::io::{IsTerminal, Read};

use anyhow::Result;
use clap::{Args, Subcommand};
use pal_core::{HookInput, PortId};
use pal_engine::HookOutcome;

use crate::context::Context;
use crate::output::print_json;

#[derive(Args)]
pub struct HookArgs {
    #[command(subcommand)]
    pub command: HookCommand,
}

#[derive(Subcommand)]
pub enum HookCommand {
    /// Assistant session started
    SessionStart,
    /// Assistant session ended
    SessionEnd,
    /// About to run a tool (Edit/Write are tracked)
    PreToolUse,
    /// Tool finished (reserved)
    PostToolUse,
    /// Context compaction imminent
    PreCompact,
    /// Assistant stop hook (reserved)
    Stop,
    /// A port begins on the active session
    PortStart {
        /// Port id (slug)
        port_id: String,
    },
    /// A port finishes on the active session
    PortEnd {
        /// Port id (slug)
        port_id: String,
        #[arg(long, default_value_t = 0)]
        input_tokens: i64,
        #[arg(long, default_value_t = 0)]
        output_tokens: i64,
        #[arg(long, default_value_t = 0.0)]
        cost_usd: f64,
    },
    /// Reconcile on-disk rules with running ports
    Sync,
    /// Record a decision/escalation/user_request event
    Event {
        /// Event type
        event_type: String,
        /// Event message (falls back to the payload's message field)
        #[arg(long)]
        message: Option<String>,
    },
}

pub fn handle(ctx: &Context, command: HookCommand) -> Result<()> {
    let input = read_hook_input()?;
    let handlers = ctx.hooks();

    let outcome = match command {
        HookCommand::SessionStart => handlers.session_start(&input)?,
        HookCommand::SessionEnd => handlers.session_end(&input)?,
        HookCommand::PreToolUse => handlers.pre_tool_use(&input)?,
        HookCommand::PostToolUse => handlers.post_tool_use(&input)?,
        HookCommand::PreCompact => handlers.pre_compact(&input)?,
        HookCommand::Stop => handlers.stop(&input)?,
        HookCommand::PortStart { port_id } => {
            let executor = ctx.executor();
            handlers.port_start(&input, &PortId::new(port_id), &executor)?
        }
        HookCommand::PortEnd {
            port_id,
            input_tokens,
            output_tokens,
            cost_usd,
        } => handlers.port_end(
            &input,
            &PortId::new(port_id),
            input_tokens,
            output_tokens,
            cost_usd,
        )?,
        HookCommand::Sync => handlers.sync(&input)?,
        HookCommand::Event {
            event_type,
            message,
        } => handlers.event(&input, &event_type, message.as_deref())?,
    };

    finish(outcome)
}

fn finish(outcome: HookOutcome) -> Result<()> {
    if let Some(warning) = &outcome.warning {
        eprintln!("pal: {warning}");
    }
    if !outcome.response.is_empty() {
        print_json(&outcome.response)?;
    }
    Ok(())
}

/// Read the hook payload from stdin; a terminal stdin yields an empty
/// object. `CLAUDE_SESSION_ID` backfills a missing session id.
fn read_hook_input() -> Result<HookInput> {
    let mut raw = String::new();
    if !std::io::stdin().is_terminal() {
        std::io::stdin().read_to_string(&mut raw)?;
    }
    let mut input = HookInput::from_json(&raw)?;
    if input.session_id.is_none() {
        input.session_id = std::env::var("CLAUDE_SESSION_ID").ok();
    }
    Ok(input)
}

#[cfg(test)]
#[path = "hook_tests.rs"]
mod tests;
