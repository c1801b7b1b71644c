// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess plumbing for git commands.

use crate::Git;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use trellis_adapters::subprocess::{run_with_timeout, SubprocessError, GIT_COMMAND_TIMEOUT};

/// Errors from git operations. `Command` carries the command text so
/// failures are actionable without re-running anything.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("`git {command}` failed: {stderr}")]
    Command { command: String, stderr: String },
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Git {
    /// Run git in `dir` and return the raw output (no status check).
    /// `GIT_DIR`/`GIT_WORK_TREE` are scrubbed so worktree commands resolve
    /// from the directory, not the caller's environment.
    pub(crate) async fn run_raw(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<std::process::Output, GitError> {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(dir)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let label = format!("git {}", args.join(" "));
        Ok(run_with_timeout(cmd, timeout, &label).await?)
    }

    /// Run git in `dir`, failing on non-zero exit.
    pub(crate) async fn run_at(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<String, GitError> {
        let output = self.run_raw(dir, args, timeout).await?;
        if !output.status.success() {
            return Err(GitError::Command {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run git in the main repository.
    pub(crate) async fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let repo = self.repo.clone();
        self.run_at(&repo, args, GIT_COMMAND_TIMEOUT).await
    }

    /// Run git in the main repository and return trimmed stdout.
    pub(crate) async fn run_trimmed(&self, args: &[&str]) -> Result<String, GitError> {
        Ok(self.run(args).await?.trim().to_string())
    }

    /// Run git in `dir` and return trimmed stdout.
    pub(crate) async fn run_at_trimmed(
        &self,
        dir: &Path,
        args: &[&str],
    ) -> Result<String, GitError> {
        Ok(self.run_at(dir, args, GIT_COMMAND_TIMEOUT).await?.trim().to_string())
    }
}
