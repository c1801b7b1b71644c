// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-storage: durable plan state, spec snapshots, and execution logs.

mod logs;
mod store;

pub use logs::{ExecutionLog, LogOffsets};
pub use store::{PlanStore, StoreError};
