// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-core: plan model, DAG utilities, and the node state machine.

pub mod macros;

pub mod clock;
pub mod dag;
pub mod event;
pub mod id;
pub mod machine;
pub mod node;
pub mod phase;
pub mod plan;
pub mod spec;
pub mod summary;
pub mod work;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use dag::DagError;
pub use event::{Event, EventBus};
pub use id::{short, NodeId, PlanId};
pub use machine::{MachineError, StateMachine, TransitionError};
pub use node::{
    AttemptRecord, AttemptStatus, InlineOrRef, NodeExecutionState, NodeStatus, TriggerType,
};
pub use phase::{ExecutionPhase, PhaseStatus, PhaseTiming};
pub use plan::{PlanInstance, PlanNode, PlanOptions, PlanSnapshot, PlanStatus};
pub use spec::{JobSpec, PlanSpec, SpecError};
pub use summary::{AgentMetrics, CommitDetail, JobWorkSummary};
pub use work::{OnFailure, WorkSpec};

#[cfg(any(test, feature = "test-support"))]
pub use spec::JobSpecBuilder;
