// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Branch queries and updates.

use crate::runner::GitError;
use crate::Git;
use trellis_adapters::subprocess::GIT_COMMAND_TIMEOUT;

impl Git {
    /// Branch currently checked out in the main repository, or None when
    /// HEAD is detached.
    pub async fn current_branch(&self) -> Result<Option<String>, GitError> {
        let repo = self.repo_path().to_path_buf();
        let output = self
            .run_raw(&repo, &["symbolic-ref", "--short", "-q", "HEAD"], GIT_COMMAND_TIMEOUT)
            .await?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    pub async fn branch_exists(&self, branch: &str) -> Result<bool, GitError> {
        let refname = format!("refs/heads/{branch}");
        let repo = self.repo_path().to_path_buf();
        let output = self
            .run_raw(&repo, &["show-ref", "--verify", "--quiet", &refname], GIT_COMMAND_TIMEOUT)
            .await?;
        Ok(output.status.success())
    }

    pub async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.run(&["checkout", branch]).await?;
        Ok(())
    }

    /// Create a branch at a commit without checking it out.
    pub async fn create_branch(&self, branch: &str, commit: &str) -> Result<(), GitError> {
        self.run(&["branch", branch, commit]).await?;
        Ok(())
    }

    /// Push a branch. Failures here never fail a merge; callers log and
    /// move on.
    pub async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.run(&["push", remote, branch]).await?;
        Ok(())
    }
}
