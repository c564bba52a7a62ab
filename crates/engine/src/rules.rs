// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rules materializer.
//!
//! The external assistant is not controlled; it is merely configured to read
//! `.claude/rules/`. This module is the single writer to that directory:
//! one markdown file per running port, created on activation, removed on
//! completion, reconciled by `sync`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use pal_core::{Error, PortId, Result};

use crate::paths;

/// Marker on the first line of every file we own.
const HEADER_PREFIX: &str = "<!-- pal:rule ";

/// What to materialize for one running port.
#[derive(Debug, Clone)]
pub struct RuleSpec {
    pub port_id: PortId,
    pub title: Option<String>,
    pub spec_path: Option<PathBuf>,
    pub related_docs: Vec<PathBuf>,
}

impl RuleSpec {
    pub fn new(port_id: PortId) -> Self {
        Self {
            port_id,
            title: None,
            spec_path: None,
            related_docs: vec![],
        }
    }
}

/// Result of a `sync` reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SyncOutcome {
    pub activated: u32,
    pub deactivated: u32,
}

pub struct RulesMaterializer;

impl RulesMaterializer {
    /// Render the canonical rules markdown for a port.
    pub fn render(spec: &RuleSpec) -> String {
        let mut out = String::new();
        out.push_str(HEADER_PREFIX);
        out.push_str(spec.port_id.as_str());
        out.push_str(" -->\n");
        out.push_str(&format!(
            "# Active Port: {}\n\n",
            spec.title.as_deref().unwrap_or(spec.port_id.as_str())
        ));
        out.push_str(
            "Work on this port only. Keep edits scoped to what the port spec describes.\n",
        );
        if let Some(path) = &spec.spec_path {
            out.push_str(&format!("\nSpec: {}\n", path.display()));
        }
        if !spec.related_docs.is_empty() {
            out.push_str("\n## Related\n");
            for doc in &spec.related_docs {
                out.push_str(&format!("- {}\n", doc.display()));
            }
        }
        out
    }

    /// Write the rules file for an activated port (atomic write).
    pub fn activate_port(project_root: &Path, spec: &RuleSpec) -> Result<PathBuf> {
        let path = paths::rule_file(project_root, spec.port_id.as_str());
        paths::write_atomic(&path, &Self::render(spec))?;
        tracing::debug!(port = %spec.port_id, path = %path.display(), "rules file written");
        Ok(path)
    }

    /// Remove the rules file for a deactivated port. Idempotent.
    pub fn deactivate_port(project_root: &Path, port_id: &PortId) -> Result<()> {
        paths::remove_if_exists(&paths::rule_file(project_root, port_id.as_str()))
    }

    /// Reconcile the on-disk rules directory against the set of running
    /// ports: create missing files, remove stale ones.
    pub fn sync(project_root: &Path, running: &[RuleSpec]) -> Result<SyncOutcome> {
        let dir = paths::rules_dir(project_root);
        let expected: HashSet<&str> = running.iter().map(|s| s.port_id.as_str()).collect();
        let mut outcome = SyncOutcome::default();

        // Remove stale managed files.
        if dir.is_dir() {
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| Error::External(format!("read {}: {e}", dir.display())))?;
            for entry in entries {
                let entry =
                    entry.map_err(|e| Error::External(format!("read {}: {e}", dir.display())))?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("md") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if !expected.contains(stem) && Self::is_managed(&path) {
                    paths::remove_if_exists(&path)?;
                    outcome.deactivated += 1;
                }
            }
        }

        // Create what is missing.
        for spec in running {
            let path = paths::rule_file(project_root, spec.port_id.as_str());
            if !path.exists() {
                Self::activate_port(project_root, spec)?;
                outcome.activated += 1;
            }
        }
        Ok(outcome)
    }

    /// Only files carrying our header are ours to delete.
    fn is_managed(path: &Path) -> bool {
        std::fs::read_to_string(path)
            .map(|content| content.starts_with(HEADER_PREFIX))
            .unwrap_or(false)
    }
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
