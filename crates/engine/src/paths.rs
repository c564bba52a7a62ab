// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project-scoped filesystem layout and atomic writes.
//!
//! All generated artifacts live under `.pal/` (briefings, summaries) or
//! `.claude/rules/` (materialized port rules). Writes go through a
//! temp-file-then-rename so readers never observe a half-written file.

use std::path::{Path, PathBuf};

use pal_core::{Error, Result};

/// `<root>/.claude/rules`, the directory the assistant reads.
pub fn rules_dir(project_root: &Path) -> PathBuf {
    project_root.join(".claude").join("rules")
}

/// `<root>/.claude/rules/<port_id>.md`.
pub fn rule_file(project_root: &Path, port_id: &str) -> PathBuf {
    rules_dir(project_root).join(format!("{port_id}.md"))
}

/// `<root>/.pal/context/session-briefing.md`.
pub fn briefing_file(project_root: &Path) -> PathBuf {
    project_root
        .join(".pal")
        .join("context")
        .join("session-briefing.md")
}

/// `<root>/.pal/sessions/<yyyy-mm-dd>-<session_id>.md`.
pub fn session_summary_file(project_root: &Path, date: &str, session_id: &str) -> PathBuf {
    project_root
        .join(".pal")
        .join("sessions")
        .join(format!("{date}-{session_id}.md"))
}

/// Write `content` to `path` atomically (temp file + rename), creating
/// parent directories as needed.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::External(format!("no parent directory for {}", path.display())))?;
    std::fs::create_dir_all(parent)
        .map_err(|e| Error::External(format!("create {}: {e}", parent.display())))?;

    let tmp = path.with_extension("md.tmp");
    std::fs::write(&tmp, content)
        .map_err(|e| Error::External(format!("write {}: {e}", tmp.display())))?;
    std::fs::rename(&tmp, path)
        .map_err(|e| Error::External(format!("rename {}: {e}", path.display())))?;
    Ok(())
}

/// Remove a file, treating "not found" as success.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::External(format!("remove {}: {e}", path.display()))),
    }
}

#[cfg(test)]
#[path = "paths_tests.rs"]
mod tests;
