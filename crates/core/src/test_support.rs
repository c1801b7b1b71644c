// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for tests in this crate and downstream crates.

use crate::plan::{PlanInstance, PlanOptions};
use crate::spec::{JobSpec, PlanSpec};

/// A one-job plan spec running the given shell command.
pub fn single_shell_spec(command: &str) -> PlanSpec {
    PlanSpec {
        jobs: vec![JobSpec::builder()
            .producer_id("only")
            .work(crate::WorkSpec::shell(command))
            .build()],
        repo_path: "/repo".into(),
        base_branch: "main".to_string(),
        target_branch: None,
        max_parallel: None,
        clean_up_successful_work: false,
    }
}

/// The classic diamond: a -> {b, c} -> d, with a target branch.
pub fn diamond_spec() -> PlanSpec {
    PlanSpec {
        jobs: vec![
            JobSpec::builder().producer_id("a").build(),
            JobSpec::builder().producer_id("b").dependencies(vec!["a".into()]).build(),
            JobSpec::builder().producer_id("c").dependencies(vec!["a".into()]).build(),
            JobSpec::builder()
                .producer_id("d")
                .dependencies(vec!["b".into(), "c".into()])
                .build(),
        ],
        repo_path: "/repo".into(),
        base_branch: "main".to_string(),
        target_branch: Some("feature/x".to_string()),
        max_parallel: None,
        clean_up_successful_work: false,
    }
}

/// A diamond plan instance with default options.
#[allow(clippy::unwrap_used)]
pub fn diamond_plan() -> PlanInstance {
    PlanInstance::from_spec(diamond_spec(), "/tmp/worktrees".into(), PlanOptions::default(), 1_000)
        .unwrap()
}
