// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a real git repository plus a running lifecycle manager
//! with a scripted agent runner.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use trellis_adapters::FakeAgentRunner;
use trellis_core::{
    EventBus, JobSpec, PlanId, PlanOptions, PlanSpec, PlanStatus, StateMachine, SystemClock,
    WorkSpec,
};
use trellis_engine::{ExecutionEngine, OrchestratorConfig, PlanLifecycleManager};
use trellis_storage::PlanStore;

/// Generous ceiling; scenarios finish in well under a second each.
pub const WAIT: Duration = Duration::from_secs(60);

pub fn sh(dir: &Path, script: &str) {
    let output = Command::new("sh")
        .args(["-c", script])
        .current_dir(dir)
        .output()
        .expect("spawn sh");
    assert!(
        output.status.success(),
        "script failed: {script}\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn sh_out(dir: &Path, script: &str) -> String {
    let output = Command::new("sh")
        .args(["-c", script])
        .current_dir(dir)
        .output()
        .expect("spawn sh");
    assert!(output.status.success(), "script failed: {script}");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub struct Fixture {
    _tmp: TempDir,
    pub repo: PathBuf,
    pub agents: FakeAgentRunner,
    pub manager: Arc<PlanLifecycleManager<FakeAgentRunner, SystemClock>>,
    pump: tokio::task::JoinHandle<()>,
}

impl Fixture {
    /// Repo with one commit on `main` and a running pump.
    pub fn new() -> Self {
        let config = OrchestratorConfig { max_parallel: 8, ..Default::default() };
        let tmp = TempDir::new().expect("tempdir");
        let repo = tmp.path().join("repo");
        std::fs::create_dir_all(&repo).expect("mkdir repo");
        sh(&repo, "git init -q -b main");
        sh(&repo, "git config user.name trellis-test && git config user.email test@trellis.local");
        sh(&repo, "printf 'seed\\n' > README.md && git add -A && git commit -qm 'initial'");

        let store = Arc::new(PlanStore::open(tmp.path().join("store")).expect("store"));
        let sm = StateMachine::new(EventBus::default());
        let agents = FakeAgentRunner::new();
        let engine =
            ExecutionEngine::new(Arc::new(agents.clone()), store, sm, config, SystemClock);
        let manager = PlanLifecycleManager::new(engine, SystemClock);
        let pump = manager.clone().spawn();

        Self { _tmp: tmp, repo, agents, manager, pump }
    }

    pub fn spec(&self, jobs: Vec<JobSpec>) -> PlanSpec {
        PlanSpec {
            jobs,
            repo_path: self.repo.clone(),
            base_branch: "main".to_string(),
            target_branch: None,
            max_parallel: None,
            clean_up_successful_work: false,
        }
    }

    pub fn shell_job(&self, producer: &str, command: &str, deps: &[&str]) -> JobSpec {
        JobSpec::builder()
            .producer_id(producer)
            .work(WorkSpec::shell(command))
            .dependencies(deps.iter().map(|d| d.to_string()).collect())
            .build()
    }

    /// Create a branch at the current main tip.
    pub fn create_branch(&self, name: &str) {
        sh(&self.repo, &format!("git branch {name}"));
    }

    pub async fn run(&self, spec: PlanSpec) -> (PlanId, PlanStatus) {
        let plan_id = self.manager.create(spec, PlanOptions::default()).expect("create");
        self.manager.start(plan_id.as_str()).expect("start");
        let status = self
            .manager
            .await_plan_complete(plan_id.as_str(), WAIT)
            .await
            .expect("plan did not complete in time");
        (plan_id, status)
    }

    /// Node state snapshot by producer id.
    pub fn node_state(
        &self,
        plan_id: &PlanId,
        producer: &str,
    ) -> trellis_core::NodeExecutionState {
        let plan = self.manager.plan_snapshot(plan_id.as_str()).expect("plan");
        let node = plan.node_by_producer(producer).expect("node");
        plan.state(node.id.as_str()).expect("state").clone()
    }

    pub async fn wait_until(&self, mut condition: impl FnMut() -> bool) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while !condition() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        self.manager.shutdown();
        self.pump.abort();
    }
}
