// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution phases of a job attempt.

use serde::{Deserialize, Serialize};

/// The seven fixed phases of one job attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ExecutionPhase {
    /// Worktree setup + forward integration of dependency commits
    #[serde(rename = "merge-fi")]
    MergeFi,
    /// Context briefing projection into the worktree
    #[serde(rename = "setup")]
    Setup,
    #[serde(rename = "prechecks")]
    Prechecks,
    #[serde(rename = "work")]
    Work,
    /// Stage and commit the work product
    #[serde(rename = "commit")]
    Commit,
    #[serde(rename = "postchecks")]
    Postchecks,
    /// Reverse integration of a leaf commit into the target branch
    #[serde(rename = "merge-ri")]
    MergeRi,
}

impl ExecutionPhase {
    /// All phases in execution order.
    pub const ORDER: [ExecutionPhase; 7] = [
        ExecutionPhase::MergeFi,
        ExecutionPhase::Setup,
        ExecutionPhase::Prechecks,
        ExecutionPhase::Work,
        ExecutionPhase::Commit,
        ExecutionPhase::Postchecks,
        ExecutionPhase::MergeRi,
    ];

    /// Position within [`ExecutionPhase::ORDER`].
    pub fn index(self) -> usize {
        match self {
            ExecutionPhase::MergeFi => 0,
            ExecutionPhase::Setup => 1,
            ExecutionPhase::Prechecks => 2,
            ExecutionPhase::Work => 3,
            ExecutionPhase::Commit => 4,
            ExecutionPhase::Postchecks => 5,
            ExecutionPhase::MergeRi => 6,
        }
    }

    /// Phases whose failure is eligible for the heal-swap-to-agent path.
    pub fn is_healable(self) -> bool {
        matches!(
            self,
            ExecutionPhase::Prechecks | ExecutionPhase::Work | ExecutionPhase::Postchecks
        )
    }
}

crate::as_str_display! {
    ExecutionPhase {
        MergeFi => "merge-fi",
        Setup => "setup",
        Prechecks => "prechecks",
        Work => "work",
        Commit => "commit",
        Postchecks => "postchecks",
        MergeRi => "merge-ri",
    }
}

/// Status of a single phase within an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

crate::as_str_display! {
    PhaseStatus {
        Pending => "pending",
        Running => "running",
        Success => "success",
        Failed => "failed",
        Skipped => "skipped",
    }
}

/// Wall-clock timing of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
}

impl PhaseTiming {
    pub fn elapsed_ms(&self) -> Option<u64> {
        self.ended_at_ms.map(|end| end.saturating_sub(self.started_at_ms))
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
