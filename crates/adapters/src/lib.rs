// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! trellis-adapters: subprocess plumbing, the process supervisor, the agent
//! runner seam, and the evidence validator.

pub mod agent;
pub mod evidence;
pub mod process;
pub mod subprocess;

pub use agent::{AgentError, AgentRequest, AgentRunResult, AgentRunner, CliAgentRunner};
pub use evidence::{validate_evidence, EvidenceReport};
pub use process::{ProcessRequest, ProcessResult, StreamKind};
pub use subprocess::{run_with_timeout, SubprocessError};

#[cfg(any(test, feature = "test-support"))]
pub use agent::fake::{FakeAgentRunner, RecordedAgentRun};
