// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory resource locks.
//!
//! A lock is exclusive per resource name and owned by a session. Session end
//! releases every lock held by that session in the same transaction.

use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A lock row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lock {
    pub resource: String,
    pub session_id: SessionId,
    pub acquired_at: DateTime<Utc>,
}
