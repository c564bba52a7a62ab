// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Advisory resource locks.
//!
//! The locks table is the only coordination mechanism visible to external
//! callers. Acquire either fails fast or polls until the configured wait
//! budget runs out; only the owning session may release.

use std::time::Duration;

use pal_core::{Clock, Error, Lock, Result, SessionId};
use pal_storage::queries::locks;
use pal_storage::Store;

/// Poll interval while waiting for a contended lock.
const WAIT_POLL: Duration = Duration::from_millis(100);

pub struct LockManager<'a> {
    store: &'a Store,
    clock: &'a dyn Clock,
}

impl<'a> LockManager<'a> {
    pub fn new(store: &'a Store, clock: &'a dyn Clock) -> Self {
        Self { store, clock }
    }

    /// Acquire `resource` for `session_id`.
    ///
    /// Fail-fast mode returns `AlreadyExists` when the resource is held by
    /// another session; re-acquiring a lock you already hold succeeds.
    /// With `wait`, contention polls up to `wait_budget` then `Timeout`.
    pub fn acquire(
        &self,
        resource: &str,
        session_id: &SessionId,
        wait: bool,
        wait_budget: Duration,
    ) -> Result<Lock> {
        let deadline = std::time::Instant::now() + wait_budget;
        loop {
            let now = self.clock.now();
            let outcome = self.store.with_tx(|tx| {
                if locks::try_acquire(tx, resource, session_id.as_str(), &now)? {
                    return Ok(None);
                }
                let holder = locks::get(tx, resource)?;
                Ok(holder)
            })?;

            match outcome {
                None => {
                    return self.check(resource)?.ok_or_else(|| {
                        Error::Storage(format!("lock {resource} vanished after acquire"))
                    });
                }
                Some(holder) if holder.session_id == *session_id => return Ok(holder),
                Some(holder) => {
                    if !wait {
                        return Err(Error::already_exists("lock", format!(
                            "{resource} (held by {})",
                            holder.session_id
                        )));
                    }
                    if std::time::Instant::now() >= deadline {
                        return Err(Error::Timeout(format!(
                            "lock {resource} held by {} past wait budget",
                            holder.session_id
                        )));
                    }
                    std::thread::sleep(WAIT_POLL);
                }
            }
        }
    }

    /// Release `resource`; only the owner may do so.
    pub fn release(&self, resource: &str, session_id: &SessionId) -> Result<()> {
        self.store.with_tx(|tx| {
            match locks::get(tx, resource)? {
                None => Err(Error::not_found("lock", resource)),
                Some(lock) if lock.session_id == *session_id => {
                    locks::release(tx, resource, session_id.as_str())?;
                    Ok(())
                }
                Some(lock) => Err(Error::InvalidState(format!(
                    "lock {resource} is held by {}, not {session_id}",
                    lock.session_id
                ))),
            }
        })
    }

    /// Drop every lock a session holds. Returns how many were released.
    pub fn release_all(&self, session_id: &SessionId) -> Result<u32> {
        self.store
            .with_tx(|tx| Ok(locks::release_all_for_session(tx, session_id.as_str())?))
    }

    pub fn check(&self, resource: &str) -> Result<Option<Lock>> {
        self.store.with_conn(|conn| Ok(locks::get(conn, resource)?))
    }

    pub fn list(&self) -> Result<Vec<Lock>> {
        self.store.with_conn(|conn| Ok(locks::list(conn)?))
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
