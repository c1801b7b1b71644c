// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Work summaries and agent usage metrics.

use serde::{Deserialize, Serialize};

/// Per-commit change detail captured after the commit phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDetail {
    pub hash: String,
    pub short_hash: String,
    pub message: String,
    #[serde(default)]
    pub files_added: Vec<String>,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_deleted: Vec<String>,
}

/// Aggregate counts of produced work, plus per-commit details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobWorkSummary {
    #[serde(default)]
    pub commits: u32,
    #[serde(default)]
    pub files_added: u32,
    #[serde(default)]
    pub files_modified: u32,
    #[serde(default)]
    pub files_deleted: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commit_details: Vec<CommitDetail>,
}

impl JobWorkSummary {
    /// Record one commit and fold its file counts into the aggregate.
    pub fn add_commit(&mut self, detail: CommitDetail) {
        self.commits += 1;
        self.files_added += detail.files_added.len() as u32;
        self.files_modified += detail.files_modified.len() as u32;
        self.files_deleted += detail.files_deleted.len() as u32;
        self.commit_details.push(detail);
    }

    /// Fold another summary into this one (plan-level aggregation).
    pub fn absorb(&mut self, other: &JobWorkSummary) {
        self.commits += other.commits;
        self.files_added += other.files_added;
        self.files_modified += other.files_modified;
        self.files_deleted += other.files_deleted;
        self.commit_details.extend(other.commit_details.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.commits == 0
    }
}

/// Usage metrics reported by an agent subprocess.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    #[serde(default, alias = "premiumRequests")]
    pub premium_requests: f64,
    #[serde(default, alias = "apiTimeSeconds")]
    pub api_time_seconds: f64,
    #[serde(default, alias = "sessionTimeSeconds")]
    pub session_time_seconds: f64,
    #[serde(default, alias = "durationMs")]
    pub duration_ms: u64,
}

impl AgentMetrics {
    /// Fold another sample into this one.
    pub fn add(&mut self, other: &AgentMetrics) {
        self.premium_requests += other.premium_requests;
        self.api_time_seconds += other.api_time_seconds;
        self.session_time_seconds += other.session_time_seconds;
        self.duration_ms += other.duration_ms;
    }
}

#[cfg(test)]
#[path = "summary_tests.rs"]
mod tests;
