// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Row-level queries, one module per entity.
//!
//! Every function takes a `&Connection` so it can run standalone or inside a
//! transaction (a `Transaction` derefs to `Connection`). Managers compose
//! these inside `Store::with_tx` to uphold multi-row invariants.

pub mod attention;
pub mod escalations;
pub mod events;
pub mod locks;
pub mod messages;
pub mod orchestrations;
pub mod ports;
pub mod sessions;
pub mod workers;

use chrono::{DateTime, Utc};

use crate::store::StoreError;

/// Parse a stored RFC 3339 timestamp, surfacing corruption by table name.
pub(crate) fn parse_ts(table: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    pal_core::clock::parse_rfc3339(raw)
        .ok_or_else(|| StoreError::corrupt(table, format!("bad timestamp: {raw}")))
}

pub(crate) fn parse_opt_ts(
    table: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    raw.map(|s| parse_ts(table, &s)).transpose()
}

pub(crate) fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}
