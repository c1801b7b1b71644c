// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runner seam.
//!
//! The agent is an opaque subprocess: it receives an instructions file and a
//! working directory, and reports success/failure, a session id for
//! resumption, and usage metrics. Everything the engine knows about agents
//! goes through [`AgentRunner`].

mod cli;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

pub use cli::CliAgentRunner;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use trellis_core::AgentMetrics;

/// Errors from agent runner operations.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent spawn failed: {0}")]
    SpawnFailed(String),
    #[error("agent io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Directory the agent works in (the job worktree).
    pub cwd: PathBuf,
    /// Markdown instructions file driving this run.
    pub instructions_path: PathBuf,
    /// Folders the agent may touch beyond the cwd.
    pub allowed_folders: Vec<PathBuf>,
    /// URLs the agent may fetch.
    pub allowed_urls: Vec<String>,
    /// Session to resume, when continuing earlier work.
    pub previous_session_id: Option<String>,
    pub model_tier: Option<String>,
}

impl AgentRequest {
    pub fn new(cwd: impl Into<PathBuf>, instructions_path: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            instructions_path: instructions_path.into(),
            allowed_folders: Vec::new(),
            allowed_urls: Vec::new(),
            previous_session_id: None,
            model_tier: None,
        }
    }

    trellis_core::setters! {
        allowed_folders: Vec<PathBuf>,
        allowed_urls: Vec<String>,
        opt previous_session_id: String,
        opt model_tier: String,
    }
}

/// Outcome of one agent invocation.
///
/// `error` carries `"killed by signal <NAME>"` verbatim when the agent died
/// to a signal; platform-specific crash exit codes pass through unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentRunResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub session_id: Option<String>,
    pub error: Option<String>,
    pub metrics: Option<AgentMetrics>,
    /// Agent asked the engine not to auto-heal this failure.
    pub no_auto_heal: bool,
}

impl AgentRunResult {
    /// True when the process was externally killed rather than failing on
    /// its own (the retry-same-spec signal).
    pub fn killed_by_signal(&self) -> bool {
        self.error.as_deref().is_some_and(|e| e.starts_with("killed by signal"))
    }
}

/// Runs an external agent subprocess.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run the agent to completion. `on_spawn` fires once with the PID so
    /// the caller can track liveness; cancellation kills the process.
    async fn run(
        &self,
        request: AgentRequest,
        on_spawn: &(dyn Fn(u32) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<AgentRunResult, AgentError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
