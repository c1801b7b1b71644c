// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use trellis_core::test_support::diamond_plan;

fn sample_node() -> PlanNode {
    let mut plan = diamond_plan();
    let id = plan.node_by_producer("a").unwrap().id.clone();
    let node = plan.nodes.get_mut(id.as_str()).unwrap();
    node.prechecks = Some(WorkSpec::Agent {
        instructions: "check".to_string(),
        allowed_folders: vec![PathBuf::from("/shared/cache")],
        allowed_urls: vec!["https://docs.example.com".to_string()],
        model_tier: None,
        resume_session: false,
    });
    node.clone()
}

#[test]
fn work_heal_instructs_fix_and_rerun() {
    let node = sample_node();
    let spec = build_heal_spec(
        &node,
        ExecutionPhase::Work,
        &WorkSpec::shell("make build"),
        "exit status 1",
        Some(1),
        Path::new("/logs/p/n/1.log"),
        Path::new("/wt"),
        Path::new("/store/specs"),
    );
    let WorkSpec::Agent { instructions, allowed_folders, allowed_urls, resume_session, .. } = spec
    else {
        panic!("heal spec must be an agent");
    };
    assert!(instructions.contains("make build"));
    assert!(instructions.contains("exit code 1"));
    assert!(instructions.contains("/logs/p/n/1.log"));
    assert!(instructions.contains("Fix the error"));
    assert!(!resume_session);
    // Union of agent allowances plus worktree and specs dir.
    assert!(allowed_folders.contains(&PathBuf::from("/wt")));
    assert!(allowed_folders.contains(&PathBuf::from("/store/specs")));
    assert!(allowed_folders.contains(&PathBuf::from("/shared/cache")));
    assert_eq!(allowed_urls, vec!["https://docs.example.com".to_string()]);
}

#[test]
fn postchecks_heal_is_diagnosis_first() {
    let node = sample_node();
    let spec = build_heal_spec(
        &node,
        ExecutionPhase::Postchecks,
        &WorkSpec::shell("cargo test"),
        "2 tests failed",
        Some(101),
        Path::new("/logs/1.log"),
        Path::new("/wt"),
        Path::new("/specs"),
    );
    let WorkSpec::Agent { instructions, .. } = spec else {
        panic!("heal spec must be an agent");
    };
    assert!(instructions.contains("Diagnose the failure first"));
    assert!(instructions.contains("exit with a failure status"));
    assert!(instructions.contains("cargo test"));
}

#[test]
fn allowances_deduplicate() {
    let mut node = sample_node();
    node.postchecks = node.prechecks.clone();
    let (folders, urls) = heal_allowances(&node, Path::new("/wt"), Path::new("/specs"));
    assert_eq!(folders.iter().filter(|f| **f == PathBuf::from("/shared/cache")).count(), 1);
    assert_eq!(urls.len(), 1);
}

#[test]
fn retry_instructions_reference_the_error() {
    let node = sample_node();
    let with_error = build_retry_instructions(&node, Some("tests are red"));
    assert!(with_error.contains("tests are red"));
    assert!(with_error.contains("Fix the previous error"));
    let without = build_retry_instructions(&node, None);
    assert!(without.contains("Complete the original task"));
}
