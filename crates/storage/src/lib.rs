// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storage layer for PAL Kit.
//!
//! A single-file SQLite database is the sole mutation boundary: all managers
//! persist through it, writes are serialized on one connection, and every
//! multi-row invariant is maintained inside a transaction.

pub mod queries;
mod schema;
mod store;

pub use schema::SCHEMA_VERSION;
pub use store::{Store, StoreError};

// Re-exported so callers composing query functions inside transactions can
// name the connection type without depending on rusqlite directly.
pub use rusqlite::{Connection, Transaction};
