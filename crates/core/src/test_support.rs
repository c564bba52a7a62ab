// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::clock::Clock;
use crate::port::{Port, PortId, PortStatus};
use crate::session::{Session, SessionId, SessionKind, SessionStatus};

/// A minimal running main session for tests.
pub fn session_fixture(id: &str, clock: &impl Clock) -> Session {
    Session {
        id: SessionId::new(id),
        kind: SessionKind::Main,
        parent_id: None,
        depth: 0,
        status: SessionStatus::Running,
        project_root: None,
        cwd: None,
        external_session_id: None,
        transcript_path: None,
        started_at: clock.now(),
        ended_at: None,
        last_heartbeat_at: clock.now(),
        input_tokens: 0,
        output_tokens: 0,
        cache_read_tokens: 0,
        cache_create_tokens: 0,
        cost_usd: 0.0,
        compact_count: 0,
    }
}

/// A minimal pending port for tests.
pub fn port_fixture(id: &str, clock: &impl Clock) -> Port {
    Port {
        id: PortId::new(id),
        title: None,
        status: PortStatus::Pending,
        file_path: None,
        session_id: None,
        agent_id: None,
        created_at: clock.now(),
        started_at: None,
        completed_at: None,
        input_tokens: 0,
        output_tokens: 0,
        cost_usd: 0.0,
        duration_secs: 0,
    }
}
