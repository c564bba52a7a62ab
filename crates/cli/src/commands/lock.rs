// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pal lock` - advisory resource locks.

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::context::Context;
use crate::output::emit;

#[derive(Args)]
pub struct LockArgs {
    #[command(subcommand)]
    pub command: LockCommand,
}

#[derive(Subcommand)]
pub enum LockCommand {
    /// Acquire a lock for a session
    Acquire {
        resource: String,
        /// Owning session (defaults to the active session)
        #[arg(long)]
        session: Option<String>,
        /// Poll until the lock frees instead of failing fast
        #[arg(long)]
        wait: bool,
    },
    /// Release a lock (owner only)
    Release {
        resource: String,
        #[arg(long)]
        session: Option<String>,
    },
    /// List held locks
    List,
    /// Show the holder of a resource
    Check { resource: String },
}

pub fn handle(ctx: &Context, command: LockCommand) -> Result<()> {
    let locks = ctx.locks();
    match command {
        LockCommand::Acquire {
            resource,
            session,
            wait,
        } => {
            let session_id = ctx.resolve_session(session.as_deref())?;
            let lock = locks.acquire(&resource, &session_id, wait, ctx.config.lock_wait())?;
            emit(ctx.output, &lock, || {
                format!("{} locked by {}", lock.resource, lock.session_id)
            })
        }
        LockCommand::Release { resource, session } => {
            let session_id = ctx.resolve_session(session.as_deref())?;
            locks.release(&resource, &session_id)?;
            emit(ctx.output, &serde_json::json!({"released": resource}), || {
                format!("released {resource}")
            })
        }
        LockCommand::List => {
            let list = locks.list()?;
            emit(ctx.output, &list, || {
                if list.is_empty() {
                    "No locks".to_string()
                } else {
                    list.iter()
                        .map(|l| format!("{:24}  {}", l.resource, l.session_id))
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })
        }
        LockCommand::Check { resource } => {
            let holder = locks.check(&resource)?;
            emit(ctx.output, &holder, || match &holder {
                Some(lock) => format!("{} held by {}", lock.resource, lock.session_id),
                None => format!("{resource} is free"),
            })
        }
    }
}
