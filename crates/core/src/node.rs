// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-node execution state and attempt records.

use crate::id::NodeId;
use crate::phase::{ExecutionPhase, PhaseStatus, PhaseTiming};
use crate::summary::{AgentMetrics, JobWorkSummary};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Node status alphabet of the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    Blocked,
    Canceled,
}

impl NodeStatus {
    /// Terminal for scheduling purposes. `Failed` can still be reset to
    /// `Pending` by an explicit retry.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeStatus::Succeeded | NodeStatus::Failed | NodeStatus::Blocked | NodeStatus::Canceled
        )
    }
}

crate::as_str_display! {
    NodeStatus {
        Pending => "pending",
        Ready => "ready",
        Scheduled => "scheduled",
        Running => "running",
        Succeeded => "succeeded",
        Failed => "failed",
        Blocked => "blocked",
        Canceled => "canceled",
    }
}

/// What started an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerType {
    #[serde(rename = "initial")]
    Initial,
    #[serde(rename = "retry")]
    Retry,
    #[serde(rename = "auto-heal")]
    AutoHeal,
}

crate::as_str_display! {
    TriggerType {
        Initial => "initial",
        Retry => "retry",
        AutoHeal => "auto-heal",
    }
}

/// Status of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Running,
    Succeeded,
    Failed,
    Canceled,
}

/// A bulky attempt field: inline while the attempt is running, a filesystem
/// ref once it completes. The two are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InlineOrRef<T> {
    Inline(T),
    Ref(PathBuf),
}

impl<T> InlineOrRef<T> {
    pub fn inline(&self) -> Option<&T> {
        match self {
            InlineOrRef::Inline(v) => Some(v),
            InlineOrRef::Ref(_) => None,
        }
    }

    pub fn ref_path(&self) -> Option<&PathBuf> {
        match self {
            InlineOrRef::Inline(_) => None,
            InlineOrRef::Ref(p) => Some(p),
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, InlineOrRef::Ref(_))
    }
}

/// Record of one attempt at executing a node's phases.
///
/// Sub-attempts (retry-same-spec after an external kill) reuse the record of
/// the attempt they continue, so `attempt_number` stays user-visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub trigger: TriggerType,
    pub status: AttemptStatus,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<ExecutionPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_statuses: Option<HashMap<ExecutionPhase, PhaseStatus>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_timing: Option<HashMap<ExecutionPhase, PhaseTiming>>,
    /// Inline while running, flattened to a ref at completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<InlineOrRef<Vec<String>>>,
    /// Inline while running, flattened to a ref at completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_used: Option<InlineOrRef<JobWorkSummary>>,
    /// Full raw log file for this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_metrics: Option<HashMap<ExecutionPhase, AgentMetrics>>,
    /// Node-status transitions observed during this attempt.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_history: Vec<String>,
}

impl AttemptRecord {
    /// Running placeholder appended when an attempt starts.
    pub fn running(attempt_number: u32, trigger: TriggerType, started_at_ms: u64) -> Self {
        Self {
            attempt_number,
            trigger,
            status: AttemptStatus::Running,
            started_at_ms,
            ended_at_ms: None,
            failed_phase: None,
            error: None,
            exit_code: None,
            step_statuses: None,
            phase_timing: None,
            logs: Some(InlineOrRef::Inline(Vec::new())),
            work_used: None,
            log_file: None,
            base_commit: None,
            completed_commit: None,
            metrics: None,
            phase_metrics: None,
            state_history: Vec::new(),
        }
    }
}

/// Mutable execution state of one node, persisted with the plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecutionState {
    pub status: NodeStatus,
    /// User-visible attempt count. Equals `attempt_history.len()` whenever
    /// no attempt is running.
    #[serde(default)]
    pub attempts: u32,
    /// Bumped on every transition; optimistic concurrency token.
    #[serde(default)]
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at_ms: Option<u64>,
    /// Live per-phase statuses of the current (or last) attempt.
    #[serde(default)]
    pub step_statuses: HashMap<ExecutionPhase, PhaseStatus>,
    #[serde(default)]
    pub attempt_history: Vec<AttemptRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_summary: Option<JobWorkSummary>,
    /// Leaf only: summary of `base_branch..completed_commit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_work_summary: Option<JobWorkSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AgentMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_metrics: Option<HashMap<ExecutionPhase, AgentMetrics>>,
    /// Session id of the last agent run, for resumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
    /// PID of the currently running subprocess, for the liveness watchdog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from_phase: Option<ExecutionPhase>,
    /// Per-phase auto-heal budget spent.
    #[serde(default)]
    pub auto_heal_attempted: HashMap<ExecutionPhase, u32>,
    /// Dependents that have forward-integrated this node's commit.
    /// The only cross-node mutation in the system; append-only, deduplicated.
    #[serde(default)]
    pub consumed_by_dependents: Vec<NodeId>,
    #[serde(default)]
    pub merged_to_target: bool,
    #[serde(default)]
    pub worktree_cleaned_up: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub force_fail_message: Option<String>,
    #[serde(default)]
    pub force_failed: bool,
}

impl Default for NodeExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeExecutionState {
    pub fn new() -> Self {
        Self {
            status: NodeStatus::Pending,
            attempts: 0,
            version: 0,
            worktree_path: None,
            base_commit: None,
            completed_commit: None,
            error: None,
            last_attempt_at_ms: None,
            step_statuses: HashMap::new(),
            attempt_history: Vec::new(),
            work_summary: None,
            aggregated_work_summary: None,
            metrics: None,
            phase_metrics: None,
            agent_session_id: None,
            pid: None,
            resume_from_phase: None,
            auto_heal_attempted: HashMap::new(),
            consumed_by_dependents: Vec::new(),
            merged_to_target: false,
            worktree_cleaned_up: false,
            force_fail_message: None,
            force_failed: false,
        }
    }

    /// The running placeholder record, if an attempt is in flight.
    pub fn running_attempt_mut(&mut self) -> Option<&mut AttemptRecord> {
        self.attempt_history.iter_mut().rev().find(|r| r.status == AttemptStatus::Running)
    }

    /// Replace the running placeholder with the completed record. If no
    /// placeholder exists (crash recovery) the record is appended instead.
    pub fn finish_attempt(&mut self, record: AttemptRecord) {
        match self.attempt_history.iter_mut().rev().find(|r| r.status == AttemptStatus::Running) {
            Some(slot) => *slot = record,
            None => self.attempt_history.push(record),
        }
    }

    /// Record that `consumer` has forward-integrated this node's commit.
    /// Idempotent.
    pub fn ack_consumer(&mut self, consumer: &NodeId) {
        if !self.consumed_by_dependents.contains(consumer) {
            self.consumed_by_dependents.push(consumer.clone());
        }
    }

    /// Auto-heal budget already spent on a phase.
    pub fn heal_count(&self, phase: ExecutionPhase) -> u32 {
        self.auto_heal_attempted.get(&phase).copied().unwrap_or(0)
    }

    pub fn record_heal_attempt(&mut self, phase: ExecutionPhase) {
        *self.auto_heal_attempted.entry(phase).or_insert(0) += 1;
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
