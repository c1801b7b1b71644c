// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan instances and their node graph.

use crate::dag;
use crate::id::{NodeId, PlanId};
use crate::node::NodeExecutionState;
use crate::spec::{PlanSpec, SpecError};
use crate::summary::JobWorkSummary;
use crate::work::{OnFailure, WorkSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Overall status of a plan, derived from node statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Succeeded,
    /// Some nodes succeeded and some failed.
    Partial,
    Failed,
    Canceled,
}

crate::as_str_display! {
    PlanStatus {
        Pending => "pending",
        Running => "running",
        Succeeded => "succeeded",
        Partial => "partial",
        Failed => "failed",
        Canceled => "canceled",
    }
}

/// One node of the plan graph. Immutable after plan construction apart from
/// `work`, which auto-heal swaps for an agent spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: NodeId,
    /// Stable user identity from the job spec.
    pub producer_id: String,
    pub name: String,
    pub task: String,
    /// Node ids of dependencies, resolved from producer ids.
    #[serde(default)]
    pub dependencies: Vec<NodeId>,
    /// Node ids of dependents, derived from dependencies at build time.
    #[serde(default)]
    pub dependents: Vec<NodeId>,
    pub work: WorkSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prechecks: Option<WorkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postchecks: Option<WorkSpec>,
    #[serde(default)]
    pub expects_no_changes: bool,
    #[serde(default)]
    pub auto_heal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_failure: Option<OnFailure>,
    /// Pre-assigned worktree (snapshot-validation node); everyone else gets
    /// a path derived from the node id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_worktree_path: Option<PathBuf>,
    /// Position in the original spec's job list; stable scheduling key.
    #[serde(default)]
    pub ordinal: usize,
}

impl PlanNode {
    pub fn is_leaf(&self) -> bool {
        self.dependents.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.dependencies.is_empty()
    }
}

/// Snapshot-validation context for chained validation plans. The snapshot
/// node runs in this dedicated worktree, whose lifecycle the engine never
/// manages through normal cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Producer id of the snapshot-validation node.
    pub producer_id: String,
    pub worktree_path: PathBuf,
    pub base_commit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// Creation-time options beyond the spec itself.
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Create paused (used with `resume_after_plan` for chained plans).
    pub is_paused: bool,
    /// Wait for this plan to succeed before becoming schedulable.
    pub resume_after_plan: Option<PlanId>,
    pub snapshot: Option<PlanSnapshot>,
}

/// A mutable, persisted plan: the node graph plus all execution state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanInstance {
    pub id: PlanId,
    pub repo_path: PathBuf,
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub clean_up_successful_work: bool,
    /// Captured once, on the first fresh worktree of the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_commit_at_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<PlanSnapshot>,
    #[serde(default)]
    pub roots: Vec<NodeId>,
    #[serde(default)]
    pub leaves: Vec<NodeId>,
    /// Node id → node. Maps are keyed by id; no back-pointers.
    #[serde(default)]
    pub nodes: HashMap<String, PlanNode>,
    #[serde(default)]
    pub node_states: HashMap<String, NodeExecutionState>,
    #[serde(default)]
    pub work_summary: JobWorkSummary,
    #[serde(default)]
    pub is_paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_after_plan: Option<PlanId>,
    /// Root directory for this plan's worktrees (flat layout).
    pub worktree_root: PathBuf,
    #[serde(default)]
    pub created_at_ms: u64,
    /// Set by `cancel`; folded into the derived plan status.
    #[serde(default)]
    pub canceled: bool,
}

impl PlanInstance {
    /// Build a plan instance from a validated spec. Node ids are freshly
    /// generated; dependencies are resolved from producer ids.
    pub fn from_spec(
        spec: PlanSpec,
        worktree_root: PathBuf,
        options: PlanOptions,
        created_at_ms: u64,
    ) -> Result<Self, SpecError> {
        spec.validate()?;

        let id = PlanId::new();
        let ids_by_producer: HashMap<String, NodeId> =
            spec.jobs.iter().map(|j| (j.producer_id.clone(), NodeId::new())).collect();

        let mut nodes: HashMap<String, PlanNode> = HashMap::new();
        for (ordinal, job) in spec.jobs.iter().enumerate() {
            let node_id = ids_by_producer[&job.producer_id].clone();
            let dependencies: Vec<NodeId> =
                job.dependencies.iter().map(|d| ids_by_producer[d].clone()).collect();
            let assigned_worktree_path = options
                .snapshot
                .as_ref()
                .filter(|s| s.producer_id == job.producer_id)
                .map(|s| s.worktree_path.clone());
            nodes.insert(
                node_id.to_string(),
                PlanNode {
                    id: node_id,
                    producer_id: job.producer_id.clone(),
                    name: job.display_name().to_string(),
                    task: job.task.clone(),
                    dependencies,
                    dependents: Vec::new(),
                    work: job.work.clone(),
                    prechecks: job.prechecks.clone(),
                    postchecks: job.postchecks.clone(),
                    expects_no_changes: job.expects_no_changes,
                    auto_heal: job.auto_heal,
                    group: job.group.clone(),
                    on_failure: job.on_failure.clone(),
                    assigned_worktree_path,
                    ordinal,
                },
            );
        }

        let reverse = dag::dependents(&nodes);
        for (node_id, dependents) in reverse {
            if let Some(node) = nodes.get_mut(&node_id) {
                node.dependents = dependents;
            }
        }

        let roots = dag::roots(&nodes);
        let leaves = dag::leaves(&nodes);
        let node_states =
            nodes.keys().map(|id| (id.clone(), NodeExecutionState::new())).collect();

        Ok(Self {
            id,
            repo_path: spec.repo_path,
            base_branch: spec.base_branch,
            target_branch: spec.target_branch,
            max_parallel: spec.max_parallel,
            clean_up_successful_work: spec.clean_up_successful_work,
            base_commit_at_start: None,
            snapshot: options.snapshot,
            roots,
            leaves,
            nodes,
            node_states,
            work_summary: JobWorkSummary::default(),
            is_paused: options.is_paused,
            resume_after_plan: options.resume_after_plan,
            worktree_root,
            created_at_ms,
            canceled: false,
        })
    }

    pub fn node(&self, id: &str) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    pub fn state(&self, id: &str) -> Option<&NodeExecutionState> {
        self.node_states.get(id)
    }

    pub fn state_mut(&mut self, id: &str) -> Option<&mut NodeExecutionState> {
        self.node_states.get_mut(id)
    }

    /// Find a node by its stable producer id.
    pub fn node_by_producer(&self, producer_id: &str) -> Option<&PlanNode> {
        self.nodes.values().find(|n| n.producer_id == producer_id)
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.leaves.iter().any(|l| l.as_str() == id)
    }

    /// The worktree a node runs in: its pre-assigned path, or a flat
    /// directory named by the first 8 characters of the node id.
    pub fn worktree_path_for(&self, node: &PlanNode) -> PathBuf {
        node.assigned_worktree_path
            .clone()
            .unwrap_or_else(|| self.worktree_root.join(node.id.short(8)))
    }

    /// Whether the node runs in the plan's snapshot worktree.
    pub fn is_snapshot_node(&self, node: &PlanNode) -> bool {
        match (&self.snapshot, &node.assigned_worktree_path) {
            (Some(snapshot), Some(assigned)) => &snapshot.worktree_path == assigned,
            _ => false,
        }
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
