// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree cleanup once every consumer has consumed.
//!
//! A leaf's consumer is the target branch (or nobody); a non-leaf's
//! consumers are its dependents, tracked through `consumed_by_dependents`.
//! The snapshot worktree is never touched here. Everything is best-effort.

use crate::executor::{ExecutionEngine, PlanHandle};
use std::path::PathBuf;
use std::sync::Arc;
use trellis_adapters::agent::AgentRunner;
use trellis_core::{Clock, NodeId, NodeStatus};
use trellis_git::Git;

/// True when every consumer of this node has consumed its commit.
fn all_consumers_consumed(plan: &trellis_core::PlanInstance, node_id: &str) -> bool {
    let Some(node) = plan.node(node_id) else { return false };
    let Some(state) = plan.state(node_id) else { return false };

    if node.is_leaf() {
        match plan.target_branch {
            Some(_) => state.merged_to_target,
            None => true,
        }
    } else {
        node.dependents.iter().all(|d| state.consumed_by_dependents.contains(d))
    }
}

/// Remove every eligible successful worktree. Failures are logged and never
/// propagate.
pub(crate) async fn cleanup_eligible_worktrees<A: AgentRunner, C: Clock>(
    git: &Git,
    handle: &Arc<PlanHandle>,
    engine: &ExecutionEngine<A, C>,
) {
    let eligible: Vec<(NodeId, PathBuf)> = handle.with_plan(|plan| {
        plan.nodes
            .values()
            .filter(|node| {
                // The snapshot worktree's lifecycle belongs to the snapshot
                // node itself.
                !plan.is_snapshot_node(node)
            })
            .filter_map(|node| {
                let state = plan.state(node.id.as_str())?;
                if state.status != NodeStatus::Succeeded
                    || state.worktree_cleaned_up
                    || state.worktree_path.is_none()
                {
                    return None;
                }
                if !all_consumers_consumed(plan, node.id.as_str()) {
                    return None;
                }
                Some((node.id.clone(), state.worktree_path.clone()?))
            })
            .collect()
    });

    for (node_id, path) in eligible {
        tracing::debug!(node_id = %node_id, path = %path.display(), "cleaning up worktree");
        git.remove_worktree(&path).await;
        handle.with_plan(|plan| {
            if let Some(state) = plan.state_mut(node_id.as_str()) {
                state.worktree_cleaned_up = true;
            }
        });
        engine.persist(handle);
    }
}
