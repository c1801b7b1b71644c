// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! No-checkout merges: merge-tree and commit-tree.

use crate::runner::GitError;
use crate::Git;
use std::path::Path;
use trellis_adapters::subprocess::GIT_COMMAND_TIMEOUT;

/// Outcome of a no-checkout merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Clean merge; the tree can be committed with `commit_tree`.
    Merged { tree: String },
    /// Content conflicts in these files.
    Conflicts { files: Vec<String> },
}

impl Git {
    /// Merge `theirs` into `ours` without touching any worktree.
    ///
    /// Uses `merge-tree --write-tree`: exit 0 yields the merged tree oid,
    /// exit 1 yields the conflicted file list.
    pub async fn merge_without_checkout(
        &self,
        ours: &str,
        theirs: &str,
    ) -> Result<MergeOutcome, GitError> {
        let repo = self.repo_path().to_path_buf();
        let output = self
            .run_raw(
                &repo,
                &["merge-tree", "--write-tree", "--name-only", ours, theirs],
                GIT_COMMAND_TIMEOUT,
            )
            .await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut lines = stdout.lines();

        match output.status.code() {
            Some(0) => {
                let tree = lines.next().unwrap_or_default().trim().to_string();
                if tree.is_empty() {
                    return Err(GitError::Command {
                        command: format!("merge-tree --write-tree {ours} {theirs}"),
                        stderr: "no tree oid in output".to_string(),
                    });
                }
                Ok(MergeOutcome::Merged { tree })
            }
            Some(1) => {
                // First line is the (partial) tree oid; the conflicted file
                // section follows until the first blank line.
                let _partial_tree = lines.next();
                let files: Vec<String> = lines
                    .by_ref()
                    .take_while(|l| !l.trim().is_empty())
                    .map(|l| l.trim().to_string())
                    .collect();
                Ok(MergeOutcome::Conflicts { files })
            }
            _ => Err(GitError::Command {
                command: format!("merge-tree --write-tree {ours} {theirs}"),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    /// Create a commit object for `tree` with the given parents.
    pub async fn commit_tree(
        &self,
        tree: &str,
        parents: &[&str],
        message: &str,
    ) -> Result<String, GitError> {
        let mut args: Vec<&str> = vec!["commit-tree", tree];
        for parent in parents {
            args.push("-p");
            args.push(parent);
        }
        args.push("-m");
        args.push(message);
        self.run_trimmed(&args).await
    }

    /// Files currently in conflict in a worktree.
    pub async fn list_conflicts(&self, dir: &Path) -> Result<Vec<String>, GitError> {
        let out = self
            .run_at(dir, &["diff", "--name-only", "--diff-filter=U"], GIT_COMMAND_TIMEOUT)
            .await?;
        Ok(out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect())
    }

    /// Abort an in-progress merge in a worktree.
    pub async fn abort_merge(&self, dir: &Path) -> Result<(), GitError> {
        self.run_at(dir, &["merge", "--abort"], GIT_COMMAND_TIMEOUT).await?;
        Ok(())
    }
}
