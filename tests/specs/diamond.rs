// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A diamond plan forward-integrates through the graph and the leaf
//! reverse-integrates into the target branch.

use crate::helpers::{sh_out, Fixture};
use trellis_core::PlanStatus;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn diamond_with_leaf_reverse_integration() {
    let fx = Fixture::new();
    fx.create_branch("feature/x");

    let mut spec = fx.spec(vec![
        fx.shell_job("a", "printf a > a.txt", &[]),
        fx.shell_job("b", "printf b > b.txt", &["a"]),
        fx.shell_job("c", "printf c > c.txt", &["a"]),
        fx.shell_job("d", "printf d > d.txt", &["b", "c"]),
    ]);
    spec.target_branch = Some("feature/x".to_string());

    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Succeeded);

    for producer in ["a", "b", "c", "d"] {
        let state = fx.node_state(&plan_id, producer);
        assert!(state.completed_commit.is_some(), "{producer} has a completed commit");
    }
    assert!(fx.node_state(&plan_id, "d").merged_to_target);

    // The merge commit on feature/x reflects D's final tree: every job's
    // file is present, FI'd all the way down.
    for file in ["a.txt", "b.txt", "c.txt", "d.txt", "README.md"] {
        let listed = sh_out(&fx.repo, "git ls-tree -r --name-only feature/x");
        assert!(listed.lines().any(|l| l == file), "{file} missing from feature/x");
    }
    let parents = sh_out(&fx.repo, "git rev-list --parents -n 1 feature/x");
    assert_eq!(parents.split_whitespace().count(), 3, "merge commit with two parents");

    // Consumption acks: A was consumed by both B and C.
    let a = fx.node_state(&plan_id, "a");
    assert_eq!(a.consumed_by_dependents.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_leaves_both_land_on_the_target() {
    let fx = Fixture::new();
    fx.create_branch("feature/x");

    let mut spec = fx.spec(vec![
        fx.shell_job("root", "printf r > root.txt", &[]),
        fx.shell_job("left", "printf l > left.txt", &["root"]),
        fx.shell_job("right", "printf r > right.txt", &["root"]),
    ]);
    spec.target_branch = Some("feature/x".to_string());

    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Succeeded);

    assert!(fx.node_state(&plan_id, "left").merged_to_target);
    assert!(fx.node_state(&plan_id, "right").merged_to_target);

    // Serialized RI: neither merge overwrote the other.
    let listed = sh_out(&fx.repo, "git ls-tree -r --name-only feature/x");
    assert!(listed.lines().any(|l| l == "left.txt"));
    assert!(listed.lines().any(|l| l == "right.txt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependents_see_upstream_work_through_fi() {
    let fx = Fixture::new();
    // b reads the file a produced; it only succeeds if FI delivered it.
    let spec = fx.spec(vec![
        fx.shell_job("a", "printf payload > a.txt", &[]),
        fx.shell_job("b", "grep -q payload a.txt && printf ok > b.txt", &["a"]),
    ]);
    let (plan_id, status) = fx.run(spec).await;
    assert_eq!(status, PlanStatus::Succeeded);
    assert!(fx.node_state(&plan_id, "b").completed_commit.is_some());
}
