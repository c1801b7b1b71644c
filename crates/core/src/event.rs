// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed events describing every observable plan change.

use crate::id::{NodeId, PlanId};
use crate::node::NodeStatus;
use crate::plan::PlanStatus;
use serde::{Deserialize, Serialize};

/// Events published on the bus for UI and chaining consumers.
///
/// Serializes with `{"type": "plan:created", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- plan --
    #[serde(rename = "plan:created")]
    PlanCreated { plan_id: PlanId },

    #[serde(rename = "plan:started")]
    PlanStarted { plan_id: PlanId },

    #[serde(rename = "plan:completed")]
    PlanCompleted { plan_id: PlanId, status: PlanStatus },

    #[serde(rename = "plan:deleted")]
    PlanDeleted { plan_id: PlanId },

    #[serde(rename = "plan:updated")]
    PlanUpdated { plan_id: PlanId },

    // -- node --
    #[serde(rename = "node:transition")]
    NodeTransition {
        plan_id: PlanId,
        node_id: NodeId,
        prev: NodeStatus,
        next: NodeStatus,
        reason: String,
    },

    #[serde(rename = "node:started")]
    NodeStarted { plan_id: PlanId, node_id: NodeId, attempt: u32 },

    #[serde(rename = "node:completed")]
    NodeCompleted { plan_id: PlanId, node_id: NodeId, success: bool },

    #[serde(rename = "node:retry")]
    NodeRetry { plan_id: PlanId, node_id: NodeId, attempt: u32 },

    #[serde(rename = "node:updated")]
    NodeUpdated { plan_id: PlanId, node_id: NodeId },
}

impl Event {
    /// Short tag for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Event::PlanCreated { .. } => "plan:created",
            Event::PlanStarted { .. } => "plan:started",
            Event::PlanCompleted { .. } => "plan:completed",
            Event::PlanDeleted { .. } => "plan:deleted",
            Event::PlanUpdated { .. } => "plan:updated",
            Event::NodeTransition { .. } => "node:transition",
            Event::NodeStarted { .. } => "node:started",
            Event::NodeCompleted { .. } => "node:completed",
            Event::NodeRetry { .. } => "node:retry",
            Event::NodeUpdated { .. } => "node:updated",
        }
    }

    pub fn plan_id(&self) -> &PlanId {
        match self {
            Event::PlanCreated { plan_id }
            | Event::PlanStarted { plan_id }
            | Event::PlanCompleted { plan_id, .. }
            | Event::PlanDeleted { plan_id }
            | Event::PlanUpdated { plan_id }
            | Event::NodeTransition { plan_id, .. }
            | Event::NodeStarted { plan_id, .. }
            | Event::NodeCompleted { plan_id, .. }
            | Event::NodeRetry { plan_id, .. }
            | Event::NodeUpdated { plan_id, .. } => plan_id,
        }
    }
}

/// Broadcast bus for [`Event`]s. Publishing never blocks; subscribers that
/// fall behind miss events (the durable record is the persisted plan, not
/// the bus).
#[derive(Clone)]
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish an event. A send error only means there are no subscribers.
    pub fn publish(&self, event: Event) {
        tracing::debug!(event = event.name(), plan_id = %event.plan_id(), "event");
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
