// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ready-node selection under per-plan and global parallelism caps.

use trellis_core::{NodeId, NodeStatus, PlanInstance};

/// Pure scheduling policy; the pump owns all state.
#[derive(Debug, Clone)]
pub struct Scheduler {
    /// Global cap on concurrently running work-performing nodes.
    pub global_max_parallel: usize,
}

impl Scheduler {
    pub fn new(global_max_parallel: usize) -> Self {
        Self { global_max_parallel }
    }

    /// Nodes of `plan` currently occupying a parallelism slot: scheduled or
    /// running, with real (non-no-op) work.
    pub fn running_work_count(plan: &PlanInstance) -> usize {
        plan.nodes
            .values()
            .filter(|node| !node.work.is_noop())
            .filter(|node| {
                matches!(
                    plan.state(node.id.as_str()).map(|s| s.status),
                    Some(NodeStatus::Scheduled) | Some(NodeStatus::Running)
                )
            })
            .count()
    }

    /// Scheduling key: (group priority, producer id). A group's priority is
    /// the spec-order index of its first member; ungrouped nodes sort after
    /// every group, by producer id. Gives a stable total order across pump
    /// ticks.
    fn group_priority(plan: &PlanInstance, node: &trellis_core::PlanNode) -> usize {
        match &node.group {
            Some(group) => plan
                .nodes
                .values()
                .filter(|n| n.group.as_deref() == Some(group.as_str()))
                .map(|n| n.ordinal)
                .min()
                .unwrap_or(node.ordinal),
            None => usize::MAX,
        }
    }

    /// Pick ready nodes to schedule. Paused and chained plans yield nothing.
    /// No-op nodes are admitted without consuming a slot.
    pub fn select_nodes(
        &self,
        plan: &PlanInstance,
        running_local: usize,
        running_global: usize,
    ) -> Vec<NodeId> {
        if plan.is_paused || plan.resume_after_plan.is_some() || plan.canceled {
            return Vec::new();
        }

        let mut ready: Vec<&trellis_core::PlanNode> = plan
            .nodes
            .values()
            .filter(|n| plan.state(n.id.as_str()).map(|s| s.status) == Some(NodeStatus::Ready))
            .collect();
        ready.sort_by(|a, b| {
            Self::group_priority(plan, a)
                .cmp(&Self::group_priority(plan, b))
                .then_with(|| a.producer_id.cmp(&b.producer_id))
        });

        let mut local_slots = plan
            .max_parallel
            .map(|max| max.saturating_sub(running_local))
            .unwrap_or(usize::MAX);
        let mut global_slots = self.global_max_parallel.saturating_sub(running_global);

        let mut selected = Vec::new();
        for node in ready {
            if node.work.is_noop() {
                selected.push(node.id.clone());
                continue;
            }
            if local_slots == 0 || global_slots == 0 {
                continue;
            }
            local_slots -= 1;
            global_slots -= 1;
            selected.push(node.id.clone());
        }
        selected
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
