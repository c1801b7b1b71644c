// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! All keys are optional; snake_case is canonical, the legacy camelCase
//! names are accepted as aliases and normalized on load.

use serde::Deserialize;
use std::path::PathBuf;

fn default_true() -> bool {
    true
}

fn default_heal_attempts() -> u32 {
    4
}

fn default_max_parallel() -> usize {
    2
}

/// Per-phase auto-heal budget.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AutoHealConfig {
    #[serde(default = "default_heal_attempts", alias = "maxAttempts")]
    pub max_attempts: u32,
}

impl Default for AutoHealConfig {
    fn default() -> Self {
        Self { max_attempts: default_heal_attempts() }
    }
}

/// Setup-phase options.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SetupConfig {
    /// Include the worktree path in the context briefing.
    #[serde(default = "default_true", alias = "projectWorktreeContext")]
    pub project_worktree_context: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self { project_worktree_context: true }
    }
}

/// Agent CLI used for agent phases and heal runs.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct AgentCliConfig {
    #[serde(default)]
    pub command: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    #[serde(alias = "autoHeal")]
    pub auto_heal: AutoHealConfig,
    pub setup: SetupConfig,
    /// Global cap on concurrently running work-performing nodes.
    #[serde(alias = "maxParallel")]
    pub max_parallel: usize,
    /// Default for plans that don't set it themselves.
    #[serde(alias = "cleanUpSuccessfulWork")]
    pub clean_up_successful_work: bool,
    /// Push the target branch after a successful reverse integration.
    /// Push failures never fail the merge.
    #[serde(alias = "pushOnSuccess")]
    pub push_on_success: bool,
    #[serde(alias = "storageRoot")]
    pub storage_root: Option<PathBuf>,
    pub agent: AgentCliConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto_heal: AutoHealConfig::default(),
            setup: SetupConfig::default(),
            max_parallel: default_max_parallel(),
            clean_up_successful_work: false,
            push_on_success: false,
            storage_root: None,
            agent: AgentCliConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Configured storage root, or `~/.trellis`.
    pub fn storage_root(&self) -> PathBuf {
        self.storage_root.clone().unwrap_or_else(|| {
            dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".trellis")
        })
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
