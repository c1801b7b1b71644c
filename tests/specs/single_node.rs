// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A single shell job runs to success in its own worktree.

use crate::helpers::Fixture;
use trellis_core::{AttemptStatus, PlanStatus, TriggerType};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_shell_job_succeeds_and_cleans_up() {
    let fx = Fixture::new();
    let mut spec =
        fx.spec(vec![fx.shell_job("only", "printf hello > out.txt", &[])]);
    spec.clean_up_successful_work = true;

    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let state = fx.node_state(&plan_id, "only");
    assert!(state.completed_commit.is_some());
    assert_ne!(state.completed_commit, state.base_commit, "job produced a commit");
    assert_eq!(state.attempts, 1);
    assert_eq!(state.attempt_history.len(), 1);
    let attempt = &state.attempt_history[0];
    assert_eq!(attempt.status, AttemptStatus::Succeeded);
    assert_eq!(attempt.trigger, TriggerType::Initial);
    assert!(attempt.logs.as_ref().is_some_and(|l| l.is_ref()), "logs flattened to a ref");

    let summary = state.work_summary.expect("work summary");
    assert!(summary.commits >= 1);
    assert!(summary
        .commit_details
        .iter()
        .any(|d| d.files_added.contains(&"out.txt".to_string())));

    // Leaf with no target branch: worktree cleanup needs no consumer.
    fx.wait_until(|| fx.node_state(&plan_id, "only").worktree_cleaned_up).await;
    let worktree = fx.node_state(&plan_id, "only").worktree_path.expect("worktree path");
    assert!(!worktree.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn plan_base_commit_is_captured_once() {
    let fx = Fixture::new();
    let spec = fx.spec(vec![
        fx.shell_job("a", "printf a > a.txt", &[]),
        fx.shell_job("b", "printf b > b.txt", &["a"]),
    ]);
    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let plan = fx.manager.plan_snapshot(plan_id.as_str()).unwrap();
    let base = plan.base_commit_at_start.expect("base commit captured");
    assert_eq!(Some(base), fx.node_state(&plan_id, "a").base_commit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_change_job_carries_base_commit_forward() {
    let fx = Fixture::new();
    let spec = fx.spec(vec![fx.shell_job("only", "true", &[])]);
    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let state = fx.node_state(&plan_id, "only");
    assert_eq!(state.completed_commit, state.base_commit);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn expects_no_changes_fails_on_a_dirty_worktree() {
    let fx = Fixture::new();
    let mut job = fx.shell_job("verify", "printf oops > unexpected.txt", &[]);
    job.expects_no_changes = true;
    job.auto_heal = false;
    let (plan_id, status) = fx.run(fx.spec(vec![job])).await;

    assert_eq!(status, PlanStatus::Failed);
    let state = fx.node_state(&plan_id, "verify");
    assert!(state.error.as_deref().is_some_and(|e| e.contains("expected no changes")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn persisted_plan_is_a_json_object_keyed_by_node_id() {
    let fx = Fixture::new();
    let (plan_id, _) = fx.run(fx.spec(vec![fx.shell_job("only", "true", &[])])).await;

    let path = fx
        .manager
        .engine()
        .store()
        .plan_dir(plan_id.as_str())
        .join("plan.json");
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let nodes = raw["nodes"].as_object().expect("nodes serialized as an object");
    assert_eq!(nodes.len(), 1);
    let states = raw["node_states"].as_object().expect("states keyed by id");
    assert_eq!(states.keys().collect::<Vec<_>>(), nodes.keys().collect::<Vec<_>>());
}
