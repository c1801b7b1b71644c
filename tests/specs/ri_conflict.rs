// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A reverse-integration conflict without a resolver fails the leaf
//! and preserves its worktree.

use crate::helpers::{sh, Fixture};
use trellis_core::{ExecutionPhase, PhaseStatus, PlanStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ri_conflict_fails_the_leaf_and_keeps_the_worktree() {
    let fx = Fixture::new();
    // Seed a file on main, then let the target branch diverge on it.
    sh(&fx.repo, "printf base > shared.txt && git add -A && git commit -qm shared");
    sh(&fx.repo, "git checkout -qb feature/x");
    sh(&fx.repo, "printf theirs > shared.txt && git add -A && git commit -qm theirs");
    sh(&fx.repo, "git checkout -q main");

    let mut spec = fx.spec(vec![fx.shell_job("leaf", "printf mine > shared.txt", &[])]);
    spec.target_branch = Some("feature/x".to_string());
    spec.clean_up_successful_work = true;

    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Failed);

    let state = fx.node_state(&plan_id, "leaf");
    assert_eq!(
        state.step_statuses.get(&ExecutionPhase::MergeRi),
        Some(&PhaseStatus::Failed)
    );
    assert!(!state.merged_to_target);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("Reverse integration")));
    assert!(state.error.as_deref().is_some_and(|e| e.contains("shared.txt")));

    // Worktree preserved for manual retry despite clean_up_successful_work.
    let worktree = state.worktree_path.expect("worktree path");
    assert!(worktree.exists());
    assert!(!state.worktree_cleaned_up);

    // The work itself completed; only the integration failed.
    assert!(state.completed_commit.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ri_onto_the_checked_out_target_resets_the_checkout() {
    let fx = Fixture::new();
    // The user sits on the target branch itself; the engine's .gitignore
    // lines are the only dirt and get discarded before the reset.
    sh(&fx.repo, "git checkout -qb feature/x");

    let mut spec = fx.spec(vec![fx.shell_job("leaf", "printf l > leaf.txt", &[])]);
    spec.target_branch = Some("feature/x".to_string());
    let (plan_id, status) = fx.run(spec).await;

    assert_eq!(status, PlanStatus::Succeeded);
    assert!(fx.node_state(&plan_id, "leaf").merged_to_target);
    // The checkout advanced to the merge commit and contains the work.
    assert_eq!(
        crate::helpers::sh_out(&fx.repo, "git symbolic-ref --short HEAD"),
        "feature/x"
    );
    assert!(fx.repo.join("leaf.txt").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clean_ri_moves_the_ref_from_an_unrelated_checkout() {
    let fx = Fixture::new();
    fx.create_branch("feature/x");
    // User sits on an unrelated branch; RI must not touch their checkout.
    sh(&fx.repo, "git checkout -qb scratch");

    let mut spec = fx.spec(vec![fx.shell_job("leaf", "printf l > leaf.txt", &[])]);
    spec.target_branch = Some("feature/x".to_string());
    let (plan_id, status) = fx.run(spec).await;

    assert_eq!(status, PlanStatus::Succeeded);
    assert!(fx.node_state(&plan_id, "leaf").merged_to_target);
    let current = crate::helpers::sh_out(&fx.repo, "git symbolic-ref --short HEAD");
    assert_eq!(current, "scratch", "user checkout untouched");
}
