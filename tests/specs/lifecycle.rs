// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle operations: failure propagation, retry, force-fail, cancel,
//! and restart recovery.

use crate::helpers::{sh, Fixture};
use std::sync::Arc;
use trellis_core::{
    EventBus, NodeStatus, PlanOptions, PlanStatus, StateMachine, SystemClock, WorkSpec,
};
use trellis_engine::{
    EngineError, ExecutionEngine, OrchestratorConfig, PlanLifecycleManager, RetryOptions,
};
use trellis_storage::PlanStore;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn root_failure_blocks_the_rest_of_the_graph() {
    let fx = Fixture::new();
    let mut failing = fx.shell_job("root", "exit 1", &[]);
    failing.auto_heal = false;
    let spec = fx.spec(vec![
        failing,
        fx.shell_job("mid", "true", &["root"]),
        fx.shell_job("leaf", "true", &["mid"]),
    ]);

    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Failed);
    assert_eq!(fx.node_state(&plan_id, "root").status, NodeStatus::Failed);
    assert_eq!(fx.node_state(&plan_id, "mid").status, NodeStatus::Blocked);
    assert_eq!(fx.node_state(&plan_id, "leaf").status, NodeStatus::Blocked);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn retry_refuses_to_discard_upstream_work() {
    let fx = Fixture::new();
    let mut failing = fx.shell_job("child", "exit 1", &["parent"]);
    failing.auto_heal = false;
    let spec = fx.spec(vec![fx.shell_job("parent", "printf p > p.txt", &[]), failing]);

    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Partial);

    let plan = fx.manager.plan_snapshot(plan_id.as_str()).unwrap();
    let child_id = plan.node_by_producer("child").unwrap().id.clone();

    let refused = fx
        .manager
        .retry_node(
            plan_id.as_str(),
            child_id.as_str(),
            RetryOptions { clear_worktree: true, ..RetryOptions::default() },
        )
        .await;
    assert!(matches!(refused, Err(EngineError::WouldDiscardUpstreamWork(dep)) if dep == "parent"));

    // A retry with a fixed spec succeeds in the preserved worktree.
    fx.manager
        .retry_node(
            plan_id.as_str(),
            child_id.as_str(),
            RetryOptions {
                new_work: Some(WorkSpec::shell("printf c > c.txt")),
                ..RetryOptions::default()
            },
        )
        .await
        .unwrap();
    let status = fx.manager.await_plan_complete(plan_id.as_str(), crate::helpers::WAIT).await;
    assert_eq!(status, Some(PlanStatus::Succeeded));

    let state = fx.node_state(&plan_id, "child");
    assert_eq!(state.attempts, 2);
    assert_eq!(
        state.attempt_history.last().map(|a| a.trigger),
        Some(trellis_core::TriggerType::Retry)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn force_fail_kills_a_running_node() {
    let fx = Fixture::new();
    let spec = fx.spec(vec![fx.shell_job("slow", "sleep 30", &[])]);
    let plan_id = fx.manager.create(spec, PlanOptions::default()).unwrap();
    fx.manager.start(plan_id.as_str()).unwrap();

    fx.wait_until(|| fx.node_state(&plan_id, "slow").status == NodeStatus::Running).await;
    let node_id = {
        let plan = fx.manager.plan_snapshot(plan_id.as_str()).unwrap();
        plan.node_by_producer("slow").unwrap().id.clone()
    };

    fx.manager
        .force_fail_node(plan_id.as_str(), node_id.as_str(), Some("operator abort".to_string()))
        .await
        .unwrap();

    for _ in 0..20 {
        let s = fx.node_state(&plan_id, "slow");
        eprintln!("DEBUG status={:?} pid={:?} force_failed={:?}", s.status, s.pid, s.force_failed);
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    }
    fx.wait_until(|| fx.node_state(&plan_id, "slow").status == NodeStatus::Failed).await;
    let state = fx.node_state(&plan_id, "slow");
    assert!(state.force_failed);
    assert_eq!(state.force_fail_message.as_deref(), Some("operator abort"));
    assert!(!state.attempt_history.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn force_fail_is_rejected_for_succeeded_nodes() {
    let fx = Fixture::new();
    let (plan_id, status) = fx.run(fx.spec(vec![fx.shell_job("done", "true", &[])])).await;
    assert_eq!(status, PlanStatus::Succeeded);

    let plan = fx.manager.plan_snapshot(plan_id.as_str()).unwrap();
    let node_id = plan.node_by_producer("done").unwrap().id.clone();
    let refused = fx.manager.force_fail_node(plan_id.as_str(), node_id.as_str(), None).await;
    assert!(matches!(refused, Err(EngineError::NotForceFailable { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_terminates_running_work() {
    let fx = Fixture::new();
    let spec = fx.spec(vec![fx.shell_job("slow", "sleep 30", &[])]);
    let plan_id = fx.manager.create(spec, PlanOptions::default()).unwrap();
    fx.manager.start(plan_id.as_str()).unwrap();
    fx.wait_until(|| fx.node_state(&plan_id, "slow").status == NodeStatus::Running).await;

    fx.manager.cancel(plan_id.as_str()).await.unwrap();

    fx.wait_until(|| fx.node_state(&plan_id, "slow").status == NodeStatus::Canceled).await;
    assert_eq!(fx.manager.plan_status(plan_id.as_str()), Some(PlanStatus::Canceled));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn plans_survive_a_restart() {
    let tmp = tempfile::TempDir::new().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    sh(&repo, "git init -q -b main");
    sh(&repo, "git config user.name t && git config user.email t@t");
    sh(&repo, "printf s > s.txt && git add -A && git commit -qm s");
    let storage = tmp.path().join("store");

    let plan_id;
    {
        let store = Arc::new(PlanStore::open(&storage).unwrap());
        let engine = ExecutionEngine::new(
            Arc::new(trellis_adapters::FakeAgentRunner::new()),
            store,
            StateMachine::new(EventBus::default()),
            OrchestratorConfig::default(),
            SystemClock,
        );
        let manager = PlanLifecycleManager::new(engine, SystemClock);
        let spec = trellis_core::PlanSpec {
            jobs: vec![trellis_core::JobSpec::builder()
                .producer_id("only")
                .work(WorkSpec::shell("true"))
                .build()],
            repo_path: repo.clone(),
            base_branch: "main".to_string(),
            target_branch: None,
            max_parallel: None,
            clean_up_successful_work: false,
        };
        plan_id = manager.create(spec, PlanOptions::default()).unwrap();
        manager.shutdown();
    }

    // New process: the store lock is free again and the plan loads.
    let store = Arc::new(PlanStore::open(&storage).unwrap());
    let engine = ExecutionEngine::new(
        Arc::new(trellis_adapters::FakeAgentRunner::new()),
        store,
        StateMachine::new(EventBus::default()),
        OrchestratorConfig::default(),
        SystemClock,
    );
    let manager = PlanLifecycleManager::new(engine, SystemClock);
    let restored = manager.restore().unwrap();
    assert_eq!(restored, vec![plan_id.clone()]);

    let plan = manager.plan_snapshot(plan_id.as_str()).unwrap();
    assert_eq!(plan.nodes.len(), 1);
    for state in plan.node_states.values() {
        assert_eq!(state.status, NodeStatus::Pending);
    }
}
