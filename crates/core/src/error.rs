// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types shared across the coordinator.
//!
//! Every failure surfaced to a caller carries one of the stable kinds below.
//! The CLI maps kinds to exit codes: `3` for missing entities, `4` for
//! conflict/invariant violations, `1` for everything else.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Domain errors with stable names.
#[derive(Debug, Error)]
pub enum Error {
    /// Id not present.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Uniqueness violated on create.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// Port is already running on another session.
    #[error("port {port} is already active on session {session}")]
    AlreadyActive { port: String, session: String },

    /// Session hierarchy rule violated.
    #[error("session kind {parent} may not parent {child}")]
    InvalidParent { parent: String, child: String },

    /// Single-worker discipline: the session already owns a running port.
    #[error("session {session} already has running port {port}")]
    PortBusy { session: String, port: String },

    /// A dependency edge would create a cycle.
    #[error("dependency {port} -> {depends_on} would create a cycle")]
    WouldCycle { port: String, depends_on: String },

    /// State-machine transition rejected.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// I/O, lock timeout, or constraint failure in the store.
    #[error("storage error: {0}")]
    Storage(String),

    /// Transcript unreadable, artifact write failure, or other outside-world
    /// failure.
    #[error("external error: {0}")]
    External(String),

    /// A worker or hook exceeded its budget.
    #[error("timeout: {0}")]
    Timeout(String),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn already_exists(entity: &'static str, id: impl Into<String>) -> Self {
        Error::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// Stable machine-readable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::AlreadyExists { .. } => "already_exists",
            Error::AlreadyActive { .. } => "already_active",
            Error::InvalidParent { .. } => "invalid_parent",
            Error::PortBusy { .. } => "port_busy",
            Error::WouldCycle { .. } => "would_cycle",
            Error::InvalidState(_) => "invalid_state",
            Error::Storage(_) => "storage",
            Error::External(_) => "external",
            Error::Timeout(_) => "timeout",
        }
    }

    /// Process exit code for the CLI surface.
    ///
    /// `0` success, `1` generic failure, `2` usage (handled by clap),
    /// `3` not found, `4` conflict/invariant violation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::NotFound { .. } => 3,
            Error::AlreadyExists { .. }
            | Error::AlreadyActive { .. }
            | Error::InvalidParent { .. }
            | Error::PortBusy { .. }
            | Error::WouldCycle { .. }
            | Error::InvalidState(_) => 4,
            Error::Storage(_) | Error::External(_) | Error::Timeout(_) => 1,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
