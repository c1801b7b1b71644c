// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tagged work variants and the legacy-input normalizer.

use crate::phase::ExecutionPhase;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Prefix that marks a bare string as an agent task.
const AGENT_PREFIX: &str = "@agent";

/// What a phase actually runs: a shell command, a direct process exec,
/// or an AI agent driven by an instructions file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkSpec {
    Shell {
        command: String,
    },
    Process {
        executable: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<PathBuf>,
        #[serde(default, skip_serializing_if = "Option::is_none", alias = "timeoutMs")]
        timeout_ms: Option<u64>,
    },
    Agent {
        instructions: String,
        #[serde(default, alias = "allowedFolders")]
        allowed_folders: Vec<PathBuf>,
        #[serde(default, alias = "allowedUrls")]
        allowed_urls: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none", alias = "modelTier")]
        model_tier: Option<String>,
        #[serde(default, alias = "resumeSession")]
        resume_session: bool,
    },
}

impl WorkSpec {
    pub fn shell(command: impl Into<String>) -> Self {
        WorkSpec::Shell { command: command.into() }
    }

    pub fn agent(instructions: impl Into<String>) -> Self {
        WorkSpec::Agent {
            instructions: instructions.into(),
            allowed_folders: Vec::new(),
            allowed_urls: Vec::new(),
            model_tier: None,
            resume_session: false,
        }
    }

    /// Normalize stringly-typed legacy input into a tagged spec.
    ///
    /// - `"@agent <task>"` becomes an agent spec with `<task>` as instructions
    /// - a JSON object string is parsed as a tagged spec (snake_case or
    ///   camelCase keys)
    /// - any other bare string becomes a shell command
    pub fn normalize(input: &str) -> Result<WorkSpec, NormalizeError> {
        let trimmed = input.trim();
        if let Some(task) = trimmed.strip_prefix(AGENT_PREFIX) {
            return Ok(WorkSpec::agent(task.trim()));
        }
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed)
                .map_err(|e| NormalizeError::Json { detail: e.to_string() });
        }
        Ok(WorkSpec::shell(trimmed))
    }

    /// A spec that performs no work. No-op specs do not count against
    /// parallelism limits and are never healed.
    pub fn is_noop(&self) -> bool {
        match self {
            WorkSpec::Shell { command } => command.trim().is_empty(),
            WorkSpec::Process { executable, .. } => executable.trim().is_empty(),
            WorkSpec::Agent { instructions, .. } => instructions.trim().is_empty(),
        }
    }

    pub fn is_agent(&self) -> bool {
        matches!(self, WorkSpec::Agent { .. })
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkSpec::Shell { .. } => "shell",
            WorkSpec::Process { .. } => "process",
            WorkSpec::Agent { .. } => "agent",
        }
    }
}

/// Error normalizing a legacy work string.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("invalid work spec JSON: {detail}")]
    Json { detail: String },
}

/// Failure-handling overrides carried on a job spec.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnFailure {
    /// Fail the node immediately, bypassing all recovery.
    #[serde(default, alias = "forceFail")]
    pub force_fail: bool,
    /// Suppress the heal-swap and retry paths.
    #[serde(default, alias = "noAutoHeal")]
    pub no_auto_heal: bool,
    /// Re-execute from this phase instead of failing.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "resumeFromPhase")]
    pub resume_from_phase: Option<ExecutionPhase>,
}

#[cfg(test)]
#[path = "work_tests.rs"]
mod tests;
