// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree lifecycle: detached create/reuse and safe removal.

use crate::runner::GitError;
use crate::Git;
use std::path::Path;
use std::time::Instant;
use trellis_adapters::subprocess::GIT_WORKTREE_TIMEOUT;

/// Result of acquiring a worktree for a job attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeAcquisition {
    /// True when an existing worktree was kept (retry path).
    pub reused: bool,
    /// Commit the worktree is based on: the requested base for a fresh
    /// checkout, the existing HEAD for a reused one.
    pub base_commit: String,
    pub total_ms: u64,
}

impl Git {
    /// Create a detached worktree at `base_commit`, or reuse the worktree
    /// already present at `path` (its checkout is left untouched so retry
    /// attempts keep prior work).
    pub async fn create_or_reuse_detached(
        &self,
        path: &Path,
        base_commit: &str,
    ) -> Result<WorktreeAcquisition, GitError> {
        let start = Instant::now();

        if path.join(".git").exists() {
            let head = self.run_at_trimmed(path, &["rev-parse", "HEAD"]).await?;
            return Ok(WorktreeAcquisition {
                reused: true,
                base_commit: head,
                total_ms: start.elapsed().as_millis() as u64,
            });
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // Drop stale registrations left by a crashed run before re-adding.
        let repo = self.repo_path().to_path_buf();
        let _ = self.run_raw(&repo, &["worktree", "prune"], GIT_WORKTREE_TIMEOUT).await;

        let path_str = path.display().to_string();
        self.run_at(
            &repo,
            &["worktree", "add", "--detach", &path_str, base_commit],
            GIT_WORKTREE_TIMEOUT,
        )
        .await?;

        Ok(WorktreeAcquisition {
            reused: false,
            base_commit: base_commit.to_string(),
            total_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Remove a worktree and its directory. Best-effort: failures are
    /// logged and the directory is removed regardless so retries can
    /// start clean.
    pub async fn remove_worktree(&self, path: &Path) {
        let repo = self.repo_path().to_path_buf();
        let path_str = path.display().to_string();
        if let Err(e) = self
            .run_at(&repo, &["worktree", "remove", "--force", &path_str], GIT_WORKTREE_TIMEOUT)
            .await
        {
            tracing::warn!(path = %path.display(), error = %e, "git worktree remove failed");
        }

        if path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove worktree directory (best-effort)"
                );
            }
        }
        let _ = self.run_raw(&repo, &["worktree", "prune"], GIT_WORKTREE_TIMEOUT).await;
    }
}
