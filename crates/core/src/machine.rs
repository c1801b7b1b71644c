// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-plan node state machine: transition gating, dependency readiness,
//! failure propagation, and plan-status derivation.
//!
//! All methods take `&mut PlanInstance`; the caller holds the plan lock.
//! Transitions on a single node are serialized through the version CAS:
//! a caller that observed a stale version loses.

use crate::event::{Event, EventBus};
use crate::id::NodeId;
use crate::node::NodeStatus;
use crate::plan::{PlanInstance, PlanStatus};
use crate::dag;
use thiserror::Error;

/// Rejected transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("invalid transition {from} -> {to}")]
    Invalid { from: NodeStatus, to: NodeStatus },
    #[error("stale node version: expected {expected}, found {actual}")]
    Stale { expected: u64, actual: u64 },
}

/// Errors from non-transition state-machine queries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MachineError {
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("dependency {0} has no completed commit")]
    MissingDependencyCommit(String),
}

/// The node state machine. Stateless apart from the event bus handle.
#[derive(Clone)]
pub struct StateMachine {
    bus: EventBus,
}

impl StateMachine {
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    fn allowed(prev: NodeStatus, next: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (prev, next),
            (Pending, Ready | Blocked | Canceled)
                | (Ready, Scheduled | Blocked | Canceled)
                | (Scheduled, Running | Canceled)
                | (Running, Succeeded | Failed | Canceled)
                | (Failed, Pending)
        )
    }

    /// Transition one node. `expected_version` enables compare-and-set for
    /// callers racing on the same node; `None` skips the check (internal
    /// recomputation under the plan lock).
    pub fn transition(
        &self,
        plan: &mut PlanInstance,
        node_id: &NodeId,
        expected_version: Option<u64>,
        next: NodeStatus,
        reason: &str,
    ) -> Result<(), TransitionError> {
        let state = plan
            .node_states
            .get_mut(node_id.as_str())
            .ok_or_else(|| TransitionError::UnknownNode(node_id.to_string()))?;

        if let Some(expected) = expected_version {
            if state.version != expected {
                return Err(TransitionError::Stale { expected, actual: state.version });
            }
        }

        let prev = state.status;
        if !Self::allowed(prev, next) {
            return Err(TransitionError::Invalid { from: prev, to: next });
        }

        state.status = next;
        state.version += 1;
        if let Some(attempt) = state.running_attempt_mut() {
            attempt.state_history.push(format!("{prev}->{next}"));
        }

        tracing::debug!(
            plan_id = %plan.id,
            node_id = %node_id,
            %prev,
            %next,
            reason,
            "node transition"
        );
        self.bus.publish(Event::NodeTransition {
            plan_id: plan.id.clone(),
            node_id: node_id.clone(),
            prev,
            next,
            reason: reason.to_string(),
        });

        if next.is_terminal() && self.is_complete(plan) {
            let status = self.plan_status(plan);
            self.bus.publish(Event::PlanCompleted { plan_id: plan.id.clone(), status });
        }

        Ok(())
    }

    /// Promote pending nodes whose dependencies all succeeded to `ready`;
    /// block pending/ready nodes with a failed or blocked dependency.
    /// Blocking propagates transitively through the fixpoint loop.
    pub fn recompute_readiness(&self, plan: &mut PlanInstance) {
        loop {
            let mut promote: Vec<NodeId> = Vec::new();
            let mut block: Vec<NodeId> = Vec::new();

            for node in plan.nodes.values() {
                let Some(state) = plan.state(node.id.as_str()) else { continue };
                if !matches!(state.status, NodeStatus::Pending | NodeStatus::Ready) {
                    continue;
                }

                let mut all_succeeded = true;
                let mut any_blocking = false;
                for dep in &node.dependencies {
                    match plan.state(dep.as_str()).map(|s| s.status) {
                        Some(NodeStatus::Succeeded) => {}
                        Some(NodeStatus::Failed) | Some(NodeStatus::Blocked) => {
                            any_blocking = true;
                            all_succeeded = false;
                        }
                        _ => all_succeeded = false,
                    }
                }

                if any_blocking {
                    block.push(node.id.clone());
                } else if all_succeeded && state.status == NodeStatus::Pending {
                    promote.push(node.id.clone());
                }
            }

            if promote.is_empty() && block.is_empty() {
                break;
            }
            for id in promote {
                let _ = self.transition(plan, &id, None, NodeStatus::Ready, "dependencies satisfied");
            }
            for id in block {
                let _ = self.transition(plan, &id, None, NodeStatus::Blocked, "dependency failed");
            }
        }
    }

    /// Completed dependency commits in deterministic order: topological
    /// order of the DAG, ties broken by producer id. The first element is
    /// the FI base; the rest are additional FI sources.
    pub fn base_commits_for_node(
        &self,
        plan: &PlanInstance,
        node_id: &str,
    ) -> Result<Vec<String>, MachineError> {
        let node = plan
            .node(node_id)
            .ok_or_else(|| MachineError::UnknownNode(node_id.to_string()))?;

        let order = dag::topo_order(&plan.nodes);
        let mut commits = Vec::with_capacity(node.dependencies.len());
        for id in &order {
            if !node.dependencies.contains(id) {
                continue;
            }
            let commit = plan
                .state(id.as_str())
                .and_then(|s| s.completed_commit.clone())
                .ok_or_else(|| {
                    let producer = plan
                        .node(id.as_str())
                        .map(|n| n.producer_id.clone())
                        .unwrap_or_else(|| id.to_string());
                    MachineError::MissingDependencyCommit(producer)
                })?;
            commits.push(commit);
        }
        Ok(commits)
    }

    /// True when every node is in a terminal status.
    pub fn is_complete(&self, plan: &PlanInstance) -> bool {
        plan.node_states.values().all(|s| s.status.is_terminal())
    }

    /// Derive the plan status from node statuses and the cancel flag.
    pub fn plan_status(&self, plan: &PlanInstance) -> PlanStatus {
        if plan.canceled {
            return PlanStatus::Canceled;
        }
        let mut any_active = false;
        let mut any_succeeded = false;
        let mut any_failed = false;
        for state in plan.node_states.values() {
            match state.status {
                NodeStatus::Scheduled | NodeStatus::Running => any_active = true,
                NodeStatus::Succeeded => any_succeeded = true,
                NodeStatus::Failed => any_failed = true,
                _ => {}
            }
        }
        if any_active {
            PlanStatus::Running
        } else if any_succeeded && any_failed {
            PlanStatus::Partial
        } else if any_failed {
            PlanStatus::Failed
        } else if any_succeeded && plan.node_states.values().all(|s| s.status == NodeStatus::Succeeded)
        {
            PlanStatus::Succeeded
        } else {
            PlanStatus::Pending
        }
    }
}

#[cfg(test)]
#[path = "machine_tests.rs"]
mod tests;
