// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use trellis_core::{JobSpec, PlanInstance, PlanOptions, PlanSpec, WorkSpec};

fn plan_with_jobs(jobs: Vec<JobSpec>) -> PlanInstance {
    let spec = PlanSpec {
        jobs,
        repo_path: "/repo".into(),
        base_branch: "main".to_string(),
        target_branch: None,
        max_parallel: None,
        clean_up_successful_work: false,
    };
    PlanInstance::from_spec(spec, "/tmp".into(), PlanOptions::default(), 0).unwrap()
}

fn mark_ready(plan: &mut PlanInstance, producer: &str) {
    let id = plan.node_by_producer(producer).unwrap().id.clone();
    plan.state_mut(id.as_str()).unwrap().status = NodeStatus::Ready;
}

fn mark_running(plan: &mut PlanInstance, producer: &str) {
    let id = plan.node_by_producer(producer).unwrap().id.clone();
    plan.state_mut(id.as_str()).unwrap().status = NodeStatus::Running;
}

fn producers(plan: &PlanInstance, ids: &[trellis_core::NodeId]) -> Vec<String> {
    ids.iter().map(|id| plan.nodes[id.as_str()].producer_id.clone()).collect()
}

#[test]
fn selects_ready_nodes_in_producer_order() {
    let mut plan = plan_with_jobs(vec![
        JobSpec::builder().producer_id("zeta").build(),
        JobSpec::builder().producer_id("alpha").build(),
        JobSpec::builder().producer_id("mid").build(),
    ]);
    for p in ["zeta", "alpha", "mid"] {
        mark_ready(&mut plan, p);
    }

    let scheduler = Scheduler::new(10);
    let selected = scheduler.select_nodes(&plan, 0, 0);
    assert_eq!(producers(&plan, &selected), vec!["alpha", "mid", "zeta"]);
}

#[test]
fn group_priority_orders_before_producer_id() {
    // zz-job is in the group anchored at spec index 0, so it sorts ahead
    // of the ungrouped aa-job at index 1.
    let mut plan = plan_with_jobs(vec![
        JobSpec::builder().producer_id("anchor").group("early").build(),
        JobSpec::builder().producer_id("aa-job").build(),
        JobSpec::builder().producer_id("zz-job").group("early").build(),
    ]);
    for p in ["anchor", "aa-job", "zz-job"] {
        mark_ready(&mut plan, p);
    }

    let scheduler = Scheduler::new(10);
    let selected = scheduler.select_nodes(&plan, 0, 0);
    assert_eq!(producers(&plan, &selected), vec!["anchor", "zz-job", "aa-job"]);
}

#[test]
fn respects_plan_max_parallel() {
    let mut plan = plan_with_jobs(vec![
        JobSpec::builder().producer_id("a").build(),
        JobSpec::builder().producer_id("b").build(),
        JobSpec::builder().producer_id("c").build(),
    ]);
    plan.max_parallel = Some(2);
    for p in ["a", "b", "c"] {
        mark_ready(&mut plan, p);
    }

    let scheduler = Scheduler::new(10);
    assert_eq!(scheduler.select_nodes(&plan, 0, 0).len(), 2);
    assert_eq!(scheduler.select_nodes(&plan, 1, 1).len(), 1);
    assert!(scheduler.select_nodes(&plan, 2, 2).is_empty());
}

#[test]
fn respects_global_cap_across_plans() {
    let mut plan = plan_with_jobs(vec![
        JobSpec::builder().producer_id("a").build(),
        JobSpec::builder().producer_id("b").build(),
    ]);
    for p in ["a", "b"] {
        mark_ready(&mut plan, p);
    }

    let scheduler = Scheduler::new(3);
    assert_eq!(scheduler.select_nodes(&plan, 0, 2).len(), 1);
    assert!(scheduler.select_nodes(&plan, 0, 3).is_empty());
}

#[test]
fn noop_nodes_do_not_consume_slots() {
    let mut plan = plan_with_jobs(vec![
        JobSpec::builder().producer_id("noop").work(WorkSpec::shell("")).build(),
        JobSpec::builder().producer_id("real").build(),
    ]);
    plan.max_parallel = Some(1);
    mark_ready(&mut plan, "noop");
    mark_ready(&mut plan, "real");

    let scheduler = Scheduler::new(1);
    let selected = scheduler.select_nodes(&plan, 0, 0);
    assert_eq!(selected.len(), 2);
}

#[test]
fn running_work_count_ignores_noops() {
    let mut plan = plan_with_jobs(vec![
        JobSpec::builder().producer_id("noop").work(WorkSpec::shell(" ")).build(),
        JobSpec::builder().producer_id("real").build(),
    ]);
    mark_running(&mut plan, "noop");
    mark_running(&mut plan, "real");
    assert_eq!(Scheduler::running_work_count(&plan), 1);
}

#[test]
fn paused_and_chained_plans_yield_nothing() {
    let mut plan = plan_with_jobs(vec![JobSpec::builder().producer_id("a").build()]);
    mark_ready(&mut plan, "a");
    let scheduler = Scheduler::new(10);

    plan.is_paused = true;
    assert!(scheduler.select_nodes(&plan, 0, 0).is_empty());

    plan.is_paused = false;
    plan.resume_after_plan = Some(trellis_core::PlanId::from_string("other"));
    assert!(scheduler.select_nodes(&plan, 0, 0).is_empty());
}
