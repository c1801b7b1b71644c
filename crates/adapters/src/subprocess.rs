// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared subprocess helper: run a command to completion with a timeout.

use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout for individual git plumbing commands.
pub const GIT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for git worktree add/remove (checkout can be slow on big repos).
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default ceiling for phase commands that carry no explicit timeout.
pub const PHASE_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Errors from the subprocess helper.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {timeout_ms}ms")]
    Timeout { label: String, timeout_ms: u64 },
    #[error("{label} failed to run: {source}")]
    Io {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion, capturing output, killing it on timeout.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<std::process::Output, SubprocessError> {
    cmd.kill_on_drop(true);
    let fut = cmd.output();
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Io { label: label.to_string(), source }),
        Err(_) => {
            tracing::warn!(label, timeout_ms = timeout.as_millis() as u64, "subprocess timeout");
            Err(SubprocessError::Timeout {
                label: label.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
