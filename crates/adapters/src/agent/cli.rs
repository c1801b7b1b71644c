// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runner backed by a local CLI executable.
//!
//! The executable is invoked with the instructions file and allowance flags;
//! it prints log lines to stdout and, as its last stdout line, a JSON result
//! object `{"sessionId": "...", "metrics": {...}, "noAutoHeal": false}`.

use crate::agent::{AgentError, AgentRequest, AgentRunResult, AgentRunner};
use crate::process::{run_streaming, ProcessRequest, StreamKind};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trellis_core::AgentMetrics;

/// Trailing JSON result line printed by the agent CLI.
#[derive(Debug, Default, Deserialize)]
struct CliResultLine {
    #[serde(default, alias = "sessionId")]
    session_id: Option<String>,
    #[serde(default)]
    metrics: Option<AgentMetrics>,
    #[serde(default, alias = "noAutoHeal")]
    no_auto_heal: bool,
}

/// Spawns a configured agent executable per request.
#[derive(Debug, Clone)]
pub struct CliAgentRunner {
    command: PathBuf,
    base_args: Vec<String>,
    /// Hard ceiling on a single agent run.
    timeout: Duration,
}

impl CliAgentRunner {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            base_args: Vec::new(),
            timeout: Duration::from_secs(2 * 3600),
        }
    }

    trellis_core::setters! {
        base_args: Vec<String>,
        timeout: Duration,
    }

    fn build_args(&self, request: &AgentRequest) -> Vec<String> {
        let mut args = self.base_args.clone();
        args.push("--instructions".to_string());
        args.push(request.instructions_path.display().to_string());
        for folder in &request.allowed_folders {
            args.push("--allow-folder".to_string());
            args.push(folder.display().to_string());
        }
        for url in &request.allowed_urls {
            args.push("--allow-url".to_string());
            args.push(url.clone());
        }
        if let Some(session) = &request.previous_session_id {
            args.push("--resume".to_string());
            args.push(session.clone());
        }
        if let Some(tier) = &request.model_tier {
            args.push("--model-tier".to_string());
            args.push(tier.clone());
        }
        args
    }
}

#[async_trait]
impl AgentRunner for CliAgentRunner {
    async fn run(
        &self,
        request: AgentRequest,
        on_spawn: &(dyn Fn(u32) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<AgentRunResult, AgentError> {
        let process = ProcessRequest::new(self.command.display().to_string(), &request.cwd)
            .args(self.build_args(&request))
            .env(HashMap::new())
            .timeout(self.timeout);

        // The last stdout line that parses as JSON wins.
        let last_json: Mutex<Option<CliResultLine>> = Mutex::new(None);
        let stderr_tail: Mutex<Vec<String>> = Mutex::new(Vec::new());
        let outcome = run_streaming(
            process,
            |kind, line| match kind {
                StreamKind::Stdout => {
                    if line.starts_with('{') {
                        if let Ok(parsed) = serde_json::from_str::<CliResultLine>(line) {
                            *last_json.lock() = Some(parsed);
                        }
                    }
                }
                StreamKind::Stderr => {
                    let mut tail = stderr_tail.lock();
                    tail.push(line.to_string());
                    if tail.len() > 20 {
                        tail.remove(0);
                    }
                }
            },
            |pid| on_spawn(pid),
            cancel,
        )
        .await
        .map_err(|e| AgentError::SpawnFailed(e.to_string()))?;

        let parsed = last_json.into_inner().unwrap_or_default();
        let mut result = AgentRunResult {
            success: outcome.success(),
            exit_code: outcome.reported_exit_code(),
            session_id: parsed.session_id,
            error: None,
            metrics: parsed.metrics,
            no_auto_heal: parsed.no_auto_heal,
        };

        if !result.success {
            result.error = Some(match &outcome.signal {
                Some(signal) if outcome.exit_code.is_none() => {
                    format!("killed by signal {signal}")
                }
                _ => {
                    let tail = stderr_tail.into_inner().join("\n");
                    if tail.is_empty() {
                        format!("agent exited with code {:?}", outcome.exit_code)
                    } else {
                        tail
                    }
                }
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
