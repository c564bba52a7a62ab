// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared command context: store handle, config, clock, project layout.

use std::path::{Path, PathBuf};

use anyhow::Result;
use pal_core::{Error, PalConfig, SessionId, SystemClock, UuidIdGen};
use pal_engine::{
    AttentionTracker, BriefingGenerator, Executor, HookHandlers, LockManager, MessageBus,
    PortManager, SessionManager,
};
use pal_storage::Store;

use crate::output::OutputFormat;

pub struct Context {
    pub store: Store,
    pub clock: SystemClock,
    pub ids: UuidIdGen,
    pub config: PalConfig,
    pub project_root: PathBuf,
    pub output: OutputFormat,
}

impl Context {
    pub fn init(db_override: Option<PathBuf>, output: OutputFormat) -> Result<Self> {
        check_db_backend()?;
        let project_root = resolve_project_root();
        let config = PalConfig::load(&project_root)?;
        let db_path = resolve_db_path(db_override, &config, &project_root)?;
        let store = Store::open(&db_path).map_err(pal_core::Error::from)?;
        Ok(Self {
            store,
            clock: SystemClock,
            ids: UuidIdGen,
            config,
            project_root,
            output,
        })
    }

    pub fn sessions(&self) -> SessionManager<'_> {
        SessionManager::new(&self.store, &self.clock, &self.ids)
    }

    pub fn ports(&self) -> PortManager<'_> {
        PortManager::new(&self.store, &self.clock)
    }

    pub fn locks(&self) -> LockManager<'_> {
        LockManager::new(&self.store, &self.clock)
    }

    pub fn bus(&self) -> MessageBus<'_> {
        MessageBus::new(&self.store, &self.clock)
    }

    pub fn attention(&self) -> AttentionTracker<'_> {
        AttentionTracker::new(&self.store, &self.clock, &self.ids, &self.config)
    }

    pub fn executor(&self) -> Executor<'_> {
        Executor::new(&self.store, &self.clock, &self.ids, &self.config)
    }

    pub fn briefing(&self) -> BriefingGenerator<'_> {
        BriefingGenerator::new(&self.store, &self.clock)
    }

    pub fn hooks(&self) -> HookHandlers<'_> {
        HookHandlers::new(
            &self.store,
            &self.clock,
            &self.ids,
            &self.config,
            &self.project_root,
        )
    }

    /// Resolve a session argument: an explicit id wins; otherwise fall back
    /// to the active session for this environment.
    pub fn resolve_session(&self, explicit: Option<&str>) -> Result<SessionId> {
        if let Some(id) = explicit {
            return Ok(self.sessions().get(&SessionId::new(id))?.id);
        }
        let external = std::env::var("CLAUDE_SESSION_ID").ok();
        let cwd = std::env::current_dir().ok();
        let session = self.sessions().find_active(
            external.as_deref(),
            cwd.as_deref(),
            Some(&self.project_root),
        )?;
        Ok(session.id)
    }
}

/// `CLAUDE_PROJECT_DIR` wins; otherwise the working directory.
fn resolve_project_root() -> PathBuf {
    std::env::var("CLAUDE_PROJECT_DIR")
        .map(PathBuf::from)
        .ok()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Only the sqlite backend exists; anything else in `PAL_DB_TYPE` is a
/// configuration error, not a silent fallback.
fn check_db_backend() -> Result<(), Error> {
    match std::env::var("PAL_DB_TYPE") {
        Ok(value) if !value.is_empty() && value != "sqlite" => Err(Error::InvalidState(format!(
            "unsupported PAL_DB_TYPE: {value}"
        ))),
        _ => Ok(()),
    }
}

fn resolve_db_path(
    db_override: Option<PathBuf>,
    config: &PalConfig,
    project_root: &Path,
) -> Result<PathBuf, Error> {
    if let Some(path) = db_override {
        return Ok(path);
    }
    if let Some(path) = &config.db_path {
        return Ok(if path.is_relative() {
            project_root.join(path)
        } else {
            path.clone()
        });
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::External("cannot determine home directory".to_string()))?;
    Ok(home.join(".pal").join("pal.db"))
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
