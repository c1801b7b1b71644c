// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Repository operations: refs, staging, commits, diffs, stash.

use crate::runner::GitError;
use crate::Git;
use std::path::Path;
use trellis_adapters::subprocess::GIT_COMMAND_TIMEOUT;
use trellis_core::{CommitDetail, JobWorkSummary};

impl Git {
    /// Resolve a ref (branch, tag, sha) to a full commit sha.
    pub async fn resolve_ref(&self, reference: &str) -> Result<String, GitError> {
        let spec = format!("{reference}^{{commit}}");
        self.run_trimmed(&["rev-parse", "--verify", &spec]).await
    }

    /// HEAD commit of a worktree.
    pub async fn head(&self, dir: &Path) -> Result<String, GitError> {
        self.run_at_trimmed(dir, &["rev-parse", "HEAD"]).await
    }

    pub async fn stage_all(&self, dir: &Path) -> Result<(), GitError> {
        self.run_at(dir, &["add", "-A"], GIT_COMMAND_TIMEOUT).await?;
        Ok(())
    }

    pub async fn stage_file(&self, dir: &Path, file: &str) -> Result<(), GitError> {
        self.run_at(dir, &["add", "--", file], GIT_COMMAND_TIMEOUT).await?;
        Ok(())
    }

    /// Commit staged changes and return the new commit sha.
    pub async fn commit(&self, dir: &Path, message: &str) -> Result<String, GitError> {
        self.run_at(dir, &["commit", "-m", message], GIT_COMMAND_TIMEOUT).await?;
        self.head(dir).await
    }

    pub async fn has_uncommitted_changes(&self, dir: &Path) -> Result<bool, GitError> {
        let status = self.run_at(dir, &["status", "--porcelain"], GIT_COMMAND_TIMEOUT).await?;
        Ok(!status.trim().is_empty())
    }

    /// Paths with uncommitted changes (staged, unstaged, or untracked).
    pub async fn dirty_files(&self, dir: &Path) -> Result<Vec<String>, GitError> {
        let status = self.run_at(dir, &["status", "--porcelain"], GIT_COMMAND_TIMEOUT).await?;
        Ok(status
            .lines()
            .filter(|l| l.len() > 3)
            .map(|l| l[3..].trim().to_string())
            .collect())
    }

    /// Unstaged diff of one file.
    pub async fn file_diff(&self, dir: &Path, file: &str) -> Result<String, GitError> {
        self.run_at(dir, &["diff", "--", file], GIT_COMMAND_TIMEOUT).await
    }

    /// Staged diff of one file.
    pub async fn staged_file_diff(&self, dir: &Path, file: &str) -> Result<String, GitError> {
        self.run_at(dir, &["diff", "--cached", "--", file], GIT_COMMAND_TIMEOUT).await
    }

    pub async fn reset_hard(&self, dir: &Path, commit: &str) -> Result<(), GitError> {
        self.run_at(dir, &["reset", "--hard", commit], GIT_COMMAND_TIMEOUT).await?;
        Ok(())
    }

    /// Discard local modifications to one file.
    pub async fn checkout_file(&self, dir: &Path, file: &str) -> Result<(), GitError> {
        self.run_at(dir, &["checkout", "--", file], GIT_COMMAND_TIMEOUT).await?;
        Ok(())
    }

    /// Point a branch ref at a commit without touching any checkout.
    pub async fn update_ref(&self, branch: &str, commit: &str) -> Result<(), GitError> {
        let refname = format!("refs/heads/{branch}");
        self.run(&["update-ref", &refname, commit]).await?;
        Ok(())
    }

    /// Stash all local changes. Returns false when there was nothing to
    /// stash.
    pub async fn stash_push(&self, dir: &Path, message: &str) -> Result<bool, GitError> {
        let out = self
            .run_at(dir, &["stash", "push", "--include-untracked", "-m", message], GIT_COMMAND_TIMEOUT)
            .await?;
        Ok(!out.contains("No local changes"))
    }

    /// Pop the top stash entry. Returns false on conflicts (stash is kept).
    pub async fn stash_pop(&self, dir: &Path) -> Result<bool, GitError> {
        let output = self.run_raw(dir, &["stash", "pop"], GIT_COMMAND_TIMEOUT).await?;
        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stderr.to_lowercase().contains("conflict") || stdout.to_lowercase().contains("conflict")
        {
            return Ok(false);
        }
        Err(GitError::Command {
            command: "stash pop".to_string(),
            stderr: stderr.trim().to_string(),
        })
    }

    pub async fn stash_drop(&self, dir: &Path) -> Result<(), GitError> {
        self.run_at(dir, &["stash", "drop"], GIT_COMMAND_TIMEOUT).await?;
        Ok(())
    }

    /// Files touched by the top stash entry.
    pub async fn stash_show_files(&self, dir: &Path) -> Result<Vec<String>, GitError> {
        let out = self
            .run_at(dir, &["stash", "show", "--name-only", "--include-untracked"], GIT_COMMAND_TIMEOUT)
            .await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Patch of the top stash entry.
    pub async fn stash_show_patch(&self, dir: &Path) -> Result<String, GitError> {
        self.run_at(dir, &["stash", "show", "-p", "--include-untracked"], GIT_COMMAND_TIMEOUT)
            .await
    }

    /// Change detail of one commit (files added/modified/deleted).
    pub async fn commit_details(&self, commit: &str) -> Result<CommitDetail, GitError> {
        let out = self
            .run(&["show", "--name-status", "--format=%H%x01%s", "--no-renames", commit])
            .await?;
        let mut detail = CommitDetail::default();
        for line in out.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if let Some((hash, subject)) = line.split_once('\u{1}') {
                detail.hash = hash.to_string();
                detail.short_hash = trellis_core::short(hash, 8).to_string();
                detail.message = subject.to_string();
                continue;
            }
            let Some((status, path)) = line.split_once('\t') else { continue };
            match status.chars().next() {
                Some('A') => detail.files_added.push(path.to_string()),
                Some('M') => detail.files_modified.push(path.to_string()),
                Some('D') => detail.files_deleted.push(path.to_string()),
                _ => detail.files_modified.push(path.to_string()),
            }
        }
        Ok(detail)
    }

    /// Aggregate summary of every commit in `base..tip`.
    pub async fn range_summary(
        &self,
        base: &str,
        tip: &str,
    ) -> Result<JobWorkSummary, GitError> {
        let range = format!("{base}..{tip}");
        let out = self.run(&["rev-list", "--reverse", &range]).await?;
        let mut summary = JobWorkSummary::default();
        for commit in out.lines().map(str::trim).filter(|l| !l.is_empty()) {
            summary.add_commit(self.commit_details(commit).await?);
        }
        Ok(summary)
    }

    /// Forward-integrate a commit into a worktree with a merge commit.
    /// On conflict the merge is aborted and the conflicting files are
    /// reported in the error.
    pub async fn merge_in_worktree(&self, dir: &Path, commit: &str) -> Result<(), GitError> {
        let output = self
            .run_raw(dir, &["merge", "--no-ff", "--no-edit", commit], GIT_COMMAND_TIMEOUT)
            .await?;
        if output.status.success() {
            return Ok(());
        }
        let conflicts = self.list_conflicts(dir).await.unwrap_or_default();
        let _ = self.run_raw(dir, &["merge", "--abort"], GIT_COMMAND_TIMEOUT).await;
        Err(GitError::Command {
            command: format!("merge --no-ff --no-edit {commit}"),
            stderr: if conflicts.is_empty() {
                String::from_utf8_lossy(&output.stderr).trim().to_string()
            } else {
                format!("conflicts in: {}", conflicts.join(", "))
            },
        })
    }
}
