// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chained plans: a paused plan waiting on another resumes when the
//! dependency succeeds, and is released (but not resumed) on cancel.

use crate::helpers::Fixture;
use trellis_core::{PlanOptions, PlanStatus};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn successor_resumes_when_the_dependency_succeeds() {
    let fx = Fixture::new();

    let plan_a = fx
        .manager
        .create(fx.spec(vec![fx.shell_job("a", "printf a > a.txt", &[])]), PlanOptions::default())
        .unwrap();
    let plan_b = fx
        .manager
        .create(
            fx.spec(vec![fx.shell_job("b", "printf b > b.txt", &[])]),
            PlanOptions {
                is_paused: true,
                resume_after_plan: Some(plan_a.clone()),
                snapshot: None,
            },
        )
        .unwrap();
    fx.manager.start(plan_b.as_str()).unwrap();
    fx.manager.start(plan_a.as_str()).unwrap();

    let status_a = fx.manager.await_plan_complete(plan_a.as_str(), crate::helpers::WAIT).await;
    assert_eq!(status_a, Some(PlanStatus::Succeeded));

    // B is released, unpaused, and runs to completion on its own.
    let status_b = fx.manager.await_plan_complete(plan_b.as_str(), crate::helpers::WAIT).await;
    assert_eq!(status_b, Some(PlanStatus::Succeeded));
    let plan = fx.manager.plan_snapshot(plan_b.as_str()).unwrap();
    assert!(plan.resume_after_plan.is_none());
    assert!(!plan.is_paused);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_releases_but_does_not_resume_the_successor() {
    let fx = Fixture::new();

    let plan_a = fx
        .manager
        .create(fx.spec(vec![fx.shell_job("a", "sleep 30", &[])]), PlanOptions::default())
        .unwrap();
    let plan_b = fx
        .manager
        .create(
            fx.spec(vec![fx.shell_job("b", "printf b > b.txt", &[])]),
            PlanOptions {
                is_paused: true,
                resume_after_plan: Some(plan_a.clone()),
                snapshot: None,
            },
        )
        .unwrap();
    fx.manager.start(plan_b.as_str()).unwrap();

    fx.manager.cancel(plan_a.as_str()).await.unwrap();

    fx.wait_until(|| {
        fx.manager
            .plan_snapshot(plan_b.as_str())
            .is_some_and(|p| p.resume_after_plan.is_none())
    })
    .await;

    let plan = fx.manager.plan_snapshot(plan_b.as_str()).unwrap();
    assert!(plan.is_paused, "cancel must not auto-resume the successor");
    assert_eq!(fx.manager.plan_status(plan_a.as_str()), Some(PlanStatus::Canceled));

    // Nothing of B ran.
    let state = fx.node_state(&plan_b, "b");
    assert_eq!(state.attempts, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_dependency_leaves_the_chain_intact() {
    let fx = Fixture::new();

    let mut failing = fx.shell_job("a", "exit 1", &[]);
    failing.auto_heal = false;
    let plan_a =
        fx.manager.create(fx.spec(vec![failing]), PlanOptions::default()).unwrap();
    let plan_b = fx
        .manager
        .create(
            fx.spec(vec![fx.shell_job("b", "true", &[])]),
            PlanOptions {
                is_paused: true,
                resume_after_plan: Some(plan_a.clone()),
                snapshot: None,
            },
        )
        .unwrap();
    fx.manager.start(plan_b.as_str()).unwrap();
    fx.manager.start(plan_a.as_str()).unwrap();

    let status_a = fx.manager.await_plan_complete(plan_a.as_str(), crate::helpers::WAIT).await;
    assert_eq!(status_a, Some(PlanStatus::Failed));

    // The dependency may still be retried: the chain stays in place.
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    let plan = fx.manager.plan_snapshot(plan_b.as_str()).unwrap();
    assert_eq!(plan.resume_after_plan.as_deref(), Some(plan_a.as_str()));
    assert!(plan.is_paused);
}
