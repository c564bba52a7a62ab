// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store handle and transaction discipline.
//!
//! One open writer; readers share the same connection and are serialized
//! behind it. WAL journal mode keeps hook processes from blocking each other
//! beyond the busy timeout.

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::schema;

/// How long a writer waits on the file lock before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row in {table}: {message}")]
    Corrupt { table: &'static str, message: String },
}

impl From<StoreError> for pal_core::Error {
    fn from(err: StoreError) -> Self {
        pal_core::Error::Storage(err.to_string())
    }
}

impl StoreError {
    pub(crate) fn corrupt(table: &'static str, message: impl Into<String>) -> Self {
        StoreError::Corrupt {
            table,
            message: message.into(),
        }
    }
}

/// Handle to the coordinator database.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_owned()),
        };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            path: None,
        };
        store.configure()?;
        store.migrate()?;
        Ok(store)
    }

    fn configure(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // WAL is a no-op for in-memory databases; ignore the returned mode.
        let _: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    }

    /// Apply pending schema migrations. Idempotent.
    pub fn migrate(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        schema::migrate(&mut conn)
    }

    /// Current schema version recorded in the metadata table.
    pub fn schema_version(&self) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        schema::current_version(&conn)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run `f` with the connection, read-only by convention.
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> pal_core::Result<T>,
    ) -> pal_core::Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction; commit on `Ok`, roll back on `Err`.
    ///
    /// All multi-row invariants (progress recomputation, lock release with
    /// status change, usage rollups) go through here.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> pal_core::Result<T>,
    ) -> pal_core::Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
