// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator-owned `.gitignore` entries and diff classification.
//!
//! The engine appends a marked block ignoring its own scratch paths. During
//! reverse integration a dirty `.gitignore` whose diff contains only these
//! lines may be discarded instead of stashed.

use crate::runner::GitError;
use crate::Git;
use std::path::Path;

/// Marker heading the managed block.
pub const ORCHESTRATOR_GITIGNORE_MARKER: &str = "# trellis-managed (do not edit)";

/// Patterns the orchestrator owns.
pub const ORCHESTRATOR_GITIGNORE_PATTERNS: [&str; 2] = [".trellis/", ".trellis-worktrees/"];

/// Orchestrator-projected files inside worktrees (context briefings, agent
/// instructions, evidence). Kept out of `git status` via the repository's
/// shared info/exclude so they are never committed with job work.
pub const ORCHESTRATOR_EXCLUDE_PATTERNS: [&str; 4] = [
    ".trellis/",
    ".trellis-worktrees/",
    ".github/instructions/context.md",
    ".github/instructions/trellis-*",
];

impl Git {
    /// Ensure the managed block exists in `<dir>/.gitignore`. Idempotent.
    pub async fn ensure_orchestrator_gitignore(&self, dir: &Path) -> Result<(), GitError> {
        let path = dir.join(".gitignore");
        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if existing.contains(ORCHESTRATOR_GITIGNORE_MARKER) {
            return Ok(());
        }

        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(ORCHESTRATOR_GITIGNORE_MARKER);
        updated.push('\n');
        for pattern in ORCHESTRATOR_GITIGNORE_PATTERNS {
            updated.push_str(pattern);
            updated.push('\n');
        }
        tokio::fs::write(&path, updated).await?;
        Ok(())
    }

    /// Ensure the orchestrator's exclude patterns exist in the repository's
    /// shared `info/exclude`. Worktrees share it, so projected files stay
    /// invisible to `git status` everywhere. Idempotent.
    pub async fn ensure_orchestrator_excludes(&self) -> Result<(), GitError> {
        let common = self.run_trimmed(&["rev-parse", "--git-common-dir"]).await?;
        let common = if Path::new(&common).is_absolute() {
            std::path::PathBuf::from(common)
        } else {
            self.repo_path().join(common)
        };
        let dir = common.join("info");
        let path = dir.join("exclude");

        let existing = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if existing.contains(ORCHESTRATOR_GITIGNORE_MARKER) {
            return Ok(());
        }

        tokio::fs::create_dir_all(&dir).await?;
        let mut updated = existing;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(ORCHESTRATOR_GITIGNORE_MARKER);
        updated.push('\n');
        for pattern in ORCHESTRATOR_EXCLUDE_PATTERNS {
            updated.push_str(pattern);
            updated.push('\n');
        }
        tokio::fs::write(&path, updated).await?;
        Ok(())
    }
}

/// True when every changed line of a unified diff is orchestrator-owned:
/// the marker, a managed pattern, or blank. Used to decide whether a dirty
/// `.gitignore` can be discarded instead of stashed.
pub fn is_diff_only_orchestrator_changes(diff: &str) -> bool {
    let mut saw_change = false;
    for line in diff.lines() {
        let content = match line.as_bytes().first() {
            Some(b'+') if !line.starts_with("+++") => &line[1..],
            Some(b'-') if !line.starts_with("---") => &line[1..],
            _ => continue,
        };
        saw_change = true;
        let content = content.trim();
        let owned = content.is_empty()
            || content == ORCHESTRATOR_GITIGNORE_MARKER
            || ORCHESTRATOR_GITIGNORE_PATTERNS.contains(&content);
        if !owned {
            return false;
        }
    }
    saw_change
}

#[cfg(test)]
#[path = "gitignore_tests.rs"]
mod tests;
