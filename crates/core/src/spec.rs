// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validated plan input: job specs and the plan spec.

use crate::dag::{self, DagError};
use crate::work::{OnFailure, WorkSpec};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

fn default_true() -> bool {
    true
}

/// One job in a plan, identified by its stable `producer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    #[serde(alias = "producerId")]
    pub producer_id: String,
    /// Display name; falls back to the producer id when empty.
    #[serde(default)]
    pub name: String,
    /// Human description of what the job is supposed to accomplish.
    #[serde(default)]
    pub task: String,
    pub work: WorkSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prechecks: Option<WorkSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postchecks: Option<WorkSpec>,
    /// Producer ids of jobs whose commits are forward-integrated first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Verification job: a dirty worktree after `work` fails the commit phase.
    #[serde(default, alias = "expectsNoChanges")]
    pub expects_no_changes: bool,
    #[serde(default = "default_true", alias = "autoHeal")]
    pub auto_heal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "onFailure")]
    pub on_failure: Option<OnFailure>,
}

impl JobSpec {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.producer_id
        } else {
            &self.name
        }
    }
}

/// Test builder wrapping a [`JobSpec`] with workable defaults: producer
/// "job-a" running shell `true`, auto-heal on.
#[cfg(any(test, feature = "test-support"))]
pub struct JobSpecBuilder {
    spec: JobSpec,
}

#[cfg(any(test, feature = "test-support"))]
impl JobSpecBuilder {
    pub fn producer_id(mut self, value: impl Into<String>) -> Self {
        self.spec.producer_id = value.into();
        self
    }

    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.spec.name = value.into();
        self
    }

    pub fn task(mut self, value: impl Into<String>) -> Self {
        self.spec.task = value.into();
        self
    }

    pub fn work(mut self, value: WorkSpec) -> Self {
        self.spec.work = value;
        self
    }

    pub fn prechecks(mut self, value: WorkSpec) -> Self {
        self.spec.prechecks = Some(value);
        self
    }

    pub fn postchecks(mut self, value: WorkSpec) -> Self {
        self.spec.postchecks = Some(value);
        self
    }

    pub fn dependencies(mut self, value: Vec<String>) -> Self {
        self.spec.dependencies = value;
        self
    }

    pub fn expects_no_changes(mut self, value: bool) -> Self {
        self.spec.expects_no_changes = value;
        self
    }

    pub fn auto_heal(mut self, value: bool) -> Self {
        self.spec.auto_heal = value;
        self
    }

    pub fn group(mut self, value: impl Into<String>) -> Self {
        self.spec.group = Some(value.into());
        self
    }

    pub fn on_failure(mut self, value: OnFailure) -> Self {
        self.spec.on_failure = Some(value);
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

#[cfg(any(test, feature = "test-support"))]
impl JobSpec {
    /// Create a builder with test defaults.
    pub fn builder() -> JobSpecBuilder {
        JobSpecBuilder {
            spec: JobSpec {
                producer_id: "job-a".to_string(),
                name: String::new(),
                task: String::new(),
                work: WorkSpec::shell("true"),
                prechecks: None,
                postchecks: None,
                dependencies: Vec::new(),
                expects_no_changes: false,
                auto_heal: true,
                group: None,
                on_failure: None,
            },
        }
    }
}

/// Immutable plan input, validated before a plan instance is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    pub jobs: Vec<JobSpec>,
    #[serde(alias = "repoPath")]
    pub repo_path: PathBuf,
    #[serde(alias = "baseBranch")]
    pub base_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "targetBranch")]
    pub target_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "maxParallel")]
    pub max_parallel: Option<usize>,
    #[serde(default, alias = "cleanUpSuccessfulWork")]
    pub clean_up_successful_work: bool,
}

impl PlanSpec {
    /// Validate the plan: non-empty, well-formed producer ids, acyclic
    /// dependency graph with no dangling references.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.jobs.is_empty() {
            return Err(SpecError::Empty);
        }
        if self.base_branch.trim().is_empty() {
            return Err(SpecError::MissingBaseBranch);
        }
        for job in &self.jobs {
            if job.producer_id.trim().is_empty() {
                return Err(SpecError::MissingProducerId);
            }
        }
        dag::validate(&self.jobs)?;
        Ok(())
    }
}

/// Errors rejecting a plan spec at creation time. These never reach the
/// execution engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    #[error("plan has no jobs")]
    Empty,
    #[error("plan has no base branch")]
    MissingBaseBranch,
    #[error("job with empty producer id")]
    MissingProducerId,
    #[error(transparent)]
    Dag(#[from] DagError),
}

#[cfg(test)]
#[path = "spec_tests.rs"]
mod tests;
