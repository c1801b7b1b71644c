// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A failed shell step is swapped for a heal agent.

use crate::helpers::Fixture;
use trellis_core::{AttemptStatus, PlanStatus, TriggerType};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shell_failure_heals_through_an_agent() {
    let fx = Fixture::new();
    // The agent "fixes" the worktree; the scripted default result succeeds.
    fx.agents.set_side_effect("printf healed > healed.txt");

    let (plan_id, status) = fx.run(fx.spec(vec![fx.shell_job("job", "exit 1", &[])])).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.attempts, 2, "heal is a user-visible attempt");
    assert_eq!(state.attempt_history.len(), 2);
    assert_eq!(state.attempt_history[0].status, AttemptStatus::Failed);
    assert_eq!(state.attempt_history[0].trigger, TriggerType::Initial);
    assert_eq!(state.attempt_history[1].status, AttemptStatus::Succeeded);
    assert_eq!(state.attempt_history[1].trigger, TriggerType::AutoHeal);
    assert_eq!(state.heal_count(trellis_core::ExecutionPhase::Work), 1);

    // The heal swapped the node's work spec for an agent.
    let plan = fx.manager.plan_snapshot(plan_id.as_str()).unwrap();
    let node = plan.node_by_producer("job").unwrap();
    assert!(node.work.is_agent());

    let calls = fx.agents.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].instructions.contains("Fix the error"));
    assert!(calls[0].instructions.contains("exit 1"), "instructions name the failed command");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn heal_that_changes_nothing_fails_the_node() {
    let fx = Fixture::new();
    // Agent reports success but never touches the worktree.
    let (plan_id, status) = fx.run(fx.spec(vec![fx.shell_job("job", "exit 1", &[])])).await;

    assert_eq!(status, PlanStatus::Failed);
    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.attempts, 2);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("no changes")));
    assert_eq!(state.attempt_history[1].status, AttemptStatus::Failed);
    assert_eq!(fx.agents.call_count(), 1, "a no-op heal is not healed again");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn auto_heal_disabled_fails_without_an_agent() {
    let fx = Fixture::new();
    let mut job = fx.shell_job("job", "exit 1", &[]);
    job.auto_heal = false;
    let (plan_id, status) = fx.run(fx.spec(vec![job])).await;

    assert_eq!(status, PlanStatus::Failed);
    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.attempts, 1);
    assert_eq!(state.attempt_history.len(), 1);
    assert_eq!(fx.agents.call_count(), 0);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("exit code 1")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn postchecks_failure_heals_and_reruns_postchecks() {
    let fx = Fixture::new();
    // Postchecks require a file that only the heal agent creates.
    fx.agents.set_side_effect("printf fixed > required.txt");
    let mut job = fx.shell_job("job", "printf w > w.txt", &[]);
    job.postchecks = Some(trellis_core::WorkSpec::shell("test -f required.txt"));
    let (plan_id, status) = fx.run(fx.spec(vec![job])).await;

    assert_eq!(status, PlanStatus::Succeeded);
    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.attempts, 2);
    assert_eq!(state.heal_count(trellis_core::ExecutionPhase::Postchecks), 1);
    let calls = fx.agents.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].instructions.contains("Diagnose the failure first"));
}
