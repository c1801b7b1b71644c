// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted agent runner for tests.

use crate::agent::{AgentError, AgentRequest, AgentRunResult, AgentRunner};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One observed call, with the instructions file content captured at call
/// time (heal specs rewrite the file between runs).
#[derive(Debug, Clone)]
pub struct RecordedAgentRun {
    pub cwd: PathBuf,
    pub instructions_path: PathBuf,
    pub instructions: String,
    pub allowed_folders: Vec<PathBuf>,
    pub allowed_urls: Vec<String>,
    pub previous_session_id: Option<String>,
}

/// Agent runner that pops scripted results and records every call.
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct FakeAgentRunner {
    script: Arc<Mutex<VecDeque<AgentRunResult>>>,
    calls: Arc<Mutex<Vec<RecordedAgentRun>>>,
    /// Shell command executed in the cwd before returning each result,
    /// standing in for the agent's edits.
    side_effect: Arc<Mutex<Option<String>>>,
}

impl FakeAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next result. When the script is empty, runs succeed with
    /// a fixed session id.
    pub fn push_result(&self, result: AgentRunResult) {
        self.script.lock().push_back(result);
    }

    /// Run this shell command in the request cwd on every call (simulates
    /// the agent editing files).
    pub fn set_side_effect(&self, command: impl Into<String>) {
        *self.side_effect.lock() = Some(command.into());
    }

    pub fn calls(&self) -> Vec<RecordedAgentRun> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn run(
        &self,
        request: AgentRequest,
        on_spawn: &(dyn Fn(u32) + Send + Sync),
        _cancel: &CancellationToken,
    ) -> Result<AgentRunResult, AgentError> {
        // A live PID keeps the engine's watchdog quiet.
        on_spawn(std::process::id());

        let instructions =
            tokio::fs::read_to_string(&request.instructions_path).await.unwrap_or_default();
        self.calls.lock().push(RecordedAgentRun {
            cwd: request.cwd.clone(),
            instructions_path: request.instructions_path.clone(),
            instructions,
            allowed_folders: request.allowed_folders.clone(),
            allowed_urls: request.allowed_urls.clone(),
            previous_session_id: request.previous_session_id.clone(),
        });

        let command = self.side_effect.lock().clone();
        if let Some(command) = command {
            let mut cmd = tokio::process::Command::new("/bin/sh");
            cmd.args(["-c", &command]).current_dir(&request.cwd);
            let _ = crate::subprocess::run_with_timeout(
                cmd,
                std::time::Duration::from_secs(30),
                "fake agent side effect",
            )
            .await;
        }

        let scripted = self.script.lock().pop_front();
        Ok(scripted.unwrap_or_else(|| AgentRunResult {
            success: true,
            exit_code: Some(0),
            session_id: Some("fake-session".to_string()),
            error: None,
            metrics: None,
            no_auto_heal: false,
        }))
    }
}
