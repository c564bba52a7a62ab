// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pal - PAL Kit CLI

mod commands;
mod context;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{escalation, hook, lock, orchestration, pipeline, port, session, status};
use context::Context;
use output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "pal",
    version,
    about = "PAL Kit - a session/port/orchestration coordinator for assistant-driven work"
)]
struct Cli {
    /// Store path override
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hook entry points invoked by the assistant runtime
    Hook(hook::HookArgs),
    /// Session management
    Session(session::SessionArgs),
    /// Port management
    Port(port::PortArgs),
    /// Pipeline authoring (orchestration + atomic ports)
    #[command(alias = "pl")]
    Pipeline(pipeline::PipelineArgs),
    /// Orchestration execution control
    Orchestration(orchestration::OrchestrationArgs),
    /// Aggregate dashboard
    Status(status::StatusArgs),
    /// Advisory resource locks
    Lock(lock::LockArgs),
    /// Escalation management
    Escalation(escalation::EscalationArgs),
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code(&err));
    }
}

fn run(cli: Cli) -> Result<()> {
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let ctx = Context::init(cli.db, format)?;
    match cli.command {
        Commands::Hook(args) => hook::handle(&ctx, args.command),
        Commands::Session(args) => session::handle(&ctx, args.command),
        Commands::Port(args) => port::handle(&ctx, args.command),
        Commands::Pipeline(args) => pipeline::handle(&ctx, args.command),
        Commands::Orchestration(args) => orchestration::handle(&ctx, args.command),
        Commands::Status(args) => status::handle(&ctx, args),
        Commands::Lock(args) => lock::handle(&ctx, args.command),
        Commands::Escalation(args) => escalation::handle(&ctx, args.command),
    }
}

/// `0` success, `1` generic, `2` usage (clap), `3` not found, `4` conflict.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<pal_core::Error>()
        .map(pal_core::Error::exit_code)
        .unwrap_or(1)
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("PAL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
