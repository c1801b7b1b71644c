// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! An externally-killed agent retries the same spec as a sub-attempt.

use crate::helpers::Fixture;
use trellis_core::{AgentMetrics, AttemptStatus, JobSpec, PlanStatus, TriggerType, WorkSpec};

fn agent_job(producer: &str) -> JobSpec {
    JobSpec::builder()
        .producer_id(producer)
        .work(WorkSpec::agent("implement the feature"))
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn killed_agent_retries_same_spec_without_new_attempt() {
    let fx = Fixture::new();
    fx.agents.set_side_effect("printf done > done.txt");
    fx.agents.push_result(trellis_adapters::AgentRunResult {
        success: false,
        exit_code: Some(137),
        session_id: Some("sess-1".to_string()),
        error: Some("killed by signal SIGTERM".to_string()),
        metrics: None,
        no_auto_heal: false,
    });
    // Second (scripted default) run succeeds.

    let (plan_id, status) = fx.run(fx.spec(vec![agent_job("job")])).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.attempts, 1, "sub-attempt does not increment the attempt count");
    assert_eq!(state.attempt_history.len(), 1);
    assert_eq!(state.attempt_history[0].status, AttemptStatus::Succeeded);
    assert_eq!(state.attempt_history[0].trigger, TriggerType::Initial);

    let calls = fx.agents.calls();
    assert_eq!(calls.len(), 2, "the same spec ran twice");
    assert_eq!(calls[0].instructions, calls[1].instructions);
    // The second run resumed the first run's session.
    assert_eq!(calls[1].previous_session_id.as_deref(), Some("sess-1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ordinary_agent_failure_is_not_retried() {
    let fx = Fixture::new();
    fx.agents.push_result(trellis_adapters::AgentRunResult {
        success: false,
        exit_code: Some(1),
        session_id: None,
        error: Some("the tests are failing".to_string()),
        metrics: None,
        no_auto_heal: false,
    });

    let (plan_id, status) = fx.run(fx.spec(vec![agent_job("job")])).await;
    assert_eq!(status, PlanStatus::Failed);
    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.attempts, 1);
    assert_eq!(fx.agents.call_count(), 1);
    assert!(state.error.as_deref().is_some_and(|e| e.contains("tests are failing")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn agent_metrics_are_aggregated() {
    let fx = Fixture::new();
    fx.agents.set_side_effect("printf done > done.txt");
    fx.agents.push_result(trellis_adapters::AgentRunResult {
        success: true,
        exit_code: Some(0),
        session_id: Some("sess-9".to_string()),
        error: None,
        metrics: Some(AgentMetrics {
            premium_requests: 1.5,
            api_time_seconds: 10.0,
            session_time_seconds: 20.0,
            duration_ms: 900,
        }),
        no_auto_heal: false,
    });

    let (plan_id, status) = fx.run(fx.spec(vec![agent_job("job")])).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let state = fx.node_state(&plan_id, "job");
    assert_eq!(state.agent_session_id.as_deref(), Some("sess-9"));
    let metrics = state.metrics.expect("metrics recorded");
    assert_eq!(metrics.premium_requests, 1.5);
    assert_eq!(metrics.duration_ms, 900);
    let phase_metrics = state.phase_metrics.expect("phase metrics");
    assert!(phase_metrics.contains_key(&trellis_core::ExecutionPhase::Work));
}
