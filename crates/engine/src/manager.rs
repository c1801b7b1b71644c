// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan lifecycle: create/start/pause/resume/cancel/delete, node-level
//! force-fail and retry, the scheduling pump, the PID watchdog, and
//! cross-plan chaining.

use crate::executor::{ExecutionEngine, PlanHandle};
use crate::heal;
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use trellis_adapters::agent::AgentRunner;
use trellis_adapters::process;
use trellis_core::{
    AttemptRecord, AttemptStatus, Clock, Event, NodeId, NodeStatus, PlanId, PlanInstance,
    PlanOptions, PlanSpec, PlanStatus, SpecError, TriggerType, WorkSpec,
};
use trellis_git::Git;
use trellis_storage::StoreError;

/// Pump period. The watchdog counts in pump ticks.
const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Pump cycles a known PID may be dead before the node is force-failed.
const WATCHDOG_DEAD_TICKS: u32 = 10;

/// Grace given to SIGTERM before SIGKILL when tearing processes down.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Errors from lifecycle operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("unknown plan: {0}")]
    UnknownPlan(String),
    #[error("unknown node: {0}")]
    UnknownNode(String),
    #[error("node {node} cannot be retried from status {status}")]
    NotRetryable { node: String, status: NodeStatus },
    #[error("node {node} cannot be force-failed from status {status}")]
    NotForceFailable { node: String, status: NodeStatus },
    #[error(
        "retry cannot clear the worktree: dependency {0} has completed work that would be lost"
    )]
    WouldDiscardUpstreamWork(String),
}

/// Options for retrying a failed node.
#[derive(Debug, Clone, Default)]
pub struct RetryOptions {
    pub new_work: Option<WorkSpec>,
    pub new_prechecks: Option<WorkSpec>,
    pub new_postchecks: Option<WorkSpec>,
    /// Start over in a fresh worktree. Refused when a dependency has a
    /// completed commit (its FI work would be discarded).
    pub clear_worktree: bool,
}

/// Owns every registered plan and the scheduling pump.
pub struct PlanLifecycleManager<A: AgentRunner + 'static, C: Clock + 'static> {
    engine: ExecutionEngine<A, C>,
    scheduler: Scheduler,
    clock: C,
    plans: Mutex<HashMap<String, Arc<PlanHandle>>>,
    /// (plan id, node id) -> consecutive pump ticks the PID was dead.
    watchdog: Mutex<HashMap<(String, String), u32>>,
    shutdown: CancellationToken,
}

impl<A: AgentRunner + 'static, C: Clock + 'static> PlanLifecycleManager<A, C> {
    pub fn new(engine: ExecutionEngine<A, C>, clock: C) -> Arc<Self> {
        let scheduler = Scheduler::new(engine.config().max_parallel);
        Arc::new(Self {
            engine,
            scheduler,
            clock,
            plans: Mutex::new(HashMap::new()),
            watchdog: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn engine(&self) -> &ExecutionEngine<A, C> {
        &self.engine
    }

    pub fn bus(&self) -> &trellis_core::EventBus {
        self.engine.state_machine().bus()
    }

    fn handle(&self, plan_id: &str) -> Result<Arc<PlanHandle>, EngineError> {
        self.plans
            .lock()
            .get(plan_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownPlan(plan_id.to_string()))
    }

    /// Read-only snapshot of a plan.
    pub fn plan_snapshot(&self, plan_id: &str) -> Option<PlanInstance> {
        self.handle(plan_id).ok().map(|h| h.with_plan(|plan| plan.clone()))
    }

    pub fn plan_status(&self, plan_id: &str) -> Option<PlanStatus> {
        self.handle(plan_id)
            .ok()
            .map(|h| h.with_plan(|plan| self.engine.state_machine().plan_status(plan)))
    }

    /// Load persisted plans at startup. Nodes interrupted mid-flight are
    /// failed so a retry can restart them cleanly.
    pub fn restore(&self) -> Result<Vec<PlanId>, EngineError> {
        let plans = self.engine.store().load_all()?;
        let mut restored = Vec::new();
        for mut plan in plans {
            let sm = self.engine.state_machine();
            let interrupted: Vec<NodeId> = plan
                .node_states
                .iter()
                .filter(|(_, s)| {
                    matches!(s.status, NodeStatus::Scheduled | NodeStatus::Running)
                })
                .map(|(id, _)| NodeId::from_string(id.clone()))
                .collect();
            for node_id in interrupted {
                if plan.state(node_id.as_str()).map(|s| s.status) == Some(NodeStatus::Scheduled) {
                    let _ = sm.transition(&mut plan, &node_id, None, NodeStatus::Running, "restore");
                }
                let _ = sm.transition(
                    &mut plan,
                    &node_id,
                    None,
                    NodeStatus::Failed,
                    "interrupted by restart",
                );
                if let Some(state) = plan.state_mut(node_id.as_str()) {
                    state.error = Some("interrupted by restart".to_string());
                    state.pid = None;
                    if let Some(record) = state.running_attempt_mut() {
                        record.status = AttemptStatus::Failed;
                        record.error = Some("interrupted by restart".to_string());
                    }
                }
                sm.recompute_readiness(&mut plan);
            }

            let plan_id = plan.id.clone();
            let handle = PlanHandle::new(plan);
            self.engine.persist(&handle);
            self.plans.lock().insert(plan_id.to_string(), handle);
            restored.push(plan_id);
        }
        Ok(restored)
    }

    /// Validate a spec and register the plan. The plan stays inert until
    /// `start`.
    pub fn create(&self, spec: PlanSpec, options: PlanOptions) -> Result<PlanId, EngineError> {
        let worktree_base = spec.repo_path.join(".trellis-worktrees");
        let mut plan =
            PlanInstance::from_spec(spec, worktree_base.clone(), options, self.clock.epoch_ms())?;
        plan.worktree_root = worktree_base.join(plan.id.short(8));
        let plan_id = plan.id.clone();

        for node in plan.nodes.values() {
            self.engine.store().save_node_specs(
                plan_id.as_str(),
                node.id.as_str(),
                &node.work,
                node.prechecks.as_ref(),
                node.postchecks.as_ref(),
            )?;
        }
        self.engine.store().save_plan(&plan)?;

        self.plans.lock().insert(plan_id.to_string(), PlanHandle::new(plan));
        self.bus().publish(Event::PlanCreated { plan_id: plan_id.clone() });
        Ok(plan_id)
    }

    pub fn start(&self, plan_id: &str) -> Result<(), EngineError> {
        let handle = self.handle(plan_id)?;
        handle.started.store(true, Ordering::SeqCst);
        handle.with_plan(|plan| {
            self.engine.state_machine().recompute_readiness(plan);
        });
        self.engine.persist(&handle);
        self.bus().publish(Event::PlanStarted { plan_id: PlanId::from_string(plan_id) });
        Ok(())
    }

    /// Stop scheduling new nodes; running nodes finish.
    pub fn pause(&self, plan_id: &str) -> Result<(), EngineError> {
        let handle = self.handle(plan_id)?;
        handle.with_plan(|plan| plan.is_paused = true);
        self.engine.persist(&handle);
        self.bus().publish(Event::PlanUpdated { plan_id: PlanId::from_string(plan_id) });
        Ok(())
    }

    pub fn resume(&self, plan_id: &str) -> Result<(), EngineError> {
        let handle = self.handle(plan_id)?;
        handle.with_plan(|plan| plan.is_paused = false);
        self.engine.persist(&handle);
        self.bus().publish(Event::PlanUpdated { plan_id: PlanId::from_string(plan_id) });
        Ok(())
    }

    /// Cancel every non-terminal node, kill processes, and release any
    /// plans chained on this one (without resuming them).
    pub async fn cancel(&self, plan_id: &str) -> Result<(), EngineError> {
        let handle = self.handle(plan_id)?;
        handle.cancel.cancel();

        let pids: Vec<u32> = handle.with_plan(|plan| {
            plan.node_states.values().filter_map(|s| s.pid).collect()
        });
        for pid in pids {
            process::terminate(pid, TERMINATE_GRACE).await;
        }

        handle.with_plan(|plan| {
            plan.canceled = true;
            let sm = self.engine.state_machine();
            let ids: Vec<NodeId> = plan
                .node_states
                .iter()
                .filter(|(_, s)| !s.status.is_terminal())
                .map(|(id, _)| NodeId::from_string(id.clone()))
                .collect();
            for node_id in ids {
                let _ =
                    sm.transition(plan, &node_id, None, NodeStatus::Canceled, "plan canceled");
            }
        });
        self.engine.persist(&handle);

        self.release_chained_plans(plan_id);
        self.bus().publish(Event::PlanUpdated { plan_id: PlanId::from_string(plan_id) });
        Ok(())
    }

    /// Cancel, unregister, and remove persisted state.
    pub async fn delete(&self, plan_id: &str) -> Result<(), EngineError> {
        if let Ok(handle) = self.handle(plan_id) {
            let done =
                handle.with_plan(|plan| self.engine.state_machine().is_complete(plan));
            if !done {
                self.cancel(plan_id).await?;
            }
        }
        self.plans.lock().remove(plan_id);
        self.engine.store().delete_plan(plan_id)?;
        self.release_chained_plans(plan_id);
        self.bus().publish(Event::PlanDeleted { plan_id: PlanId::from_string(plan_id) });
        Ok(())
    }

    /// Clear `resume_after_plan` on every plan waiting for `plan_id`,
    /// without resuming them.
    fn release_chained_plans(&self, plan_id: &str) {
        let waiting: Vec<Arc<PlanHandle>> = self
            .plans
            .lock()
            .values()
            .filter(|h| {
                h.with_plan(|plan| plan.resume_after_plan.as_deref() == Some(plan_id))
            })
            .cloned()
            .collect();
        for handle in waiting {
            let waiting_id = handle.with_plan(|plan| {
                plan.resume_after_plan = None;
                plan.id.clone()
            });
            self.engine.persist(&handle);
            self.bus().publish(Event::PlanUpdated { plan_id: waiting_id });
        }
    }

    /// A plan succeeded: auto-resume every plan chained on it.
    fn on_plan_succeeded(&self, plan_id: &str) {
        let waiting: Vec<Arc<PlanHandle>> = self
            .plans
            .lock()
            .values()
            .filter(|h| {
                h.with_plan(|plan| plan.resume_after_plan.as_deref() == Some(plan_id))
            })
            .cloned()
            .collect();
        for handle in waiting {
            let waiting_id = handle.with_plan(|plan| {
                plan.resume_after_plan = None;
                plan.is_paused = false;
                plan.id.clone()
            });
            self.engine.persist(&handle);
            self.bus().publish(Event::PlanUpdated { plan_id: waiting_id.clone() });
            tracing::info!(plan_id = %waiting_id, resumed_after = plan_id, "chained plan resumed");
        }
    }

    /// Force a node to failed from pending/scheduled/running. Kills the
    /// node's process and cancels its executor.
    pub async fn force_fail_node(
        &self,
        plan_id: &str,
        node_id: &str,
        reason: Option<String>,
    ) -> Result<(), EngineError> {
        let handle = self.handle(plan_id)?;
        let reason = reason.unwrap_or_else(|| "force-failed by user".to_string());

        let (status, pid) = handle.with_plan(|plan| {
            let state = plan.state(node_id);
            (state.map(|s| s.status), state.and_then(|s| s.pid))
        });
        let status = status.ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;
        if !matches!(status, NodeStatus::Pending | NodeStatus::Scheduled | NodeStatus::Running) {
            return Err(EngineError::NotForceFailable { node: node_id.to_string(), status });
        }

        handle.node_token(node_id).cancel();
        if let Some(pid) = pid {
            process::terminate(pid, TERMINATE_GRACE).await;
        }

        let node_id = NodeId::from_string(node_id);
        handle.with_plan(|plan| {
            let sm = self.engine.state_machine();
            let now = self.clock.epoch_ms();
            if let Some(state) = plan.state_mut(node_id.as_str()) {
                state.force_failed = true;
                state.force_fail_message = Some(reason.clone());
                state.error = Some(reason.clone());
                state.pid = None;
                match state.running_attempt_mut() {
                    Some(record) => {
                        record.status = AttemptStatus::Failed;
                        record.ended_at_ms = Some(now);
                        record.error = Some(reason.clone());
                    }
                    None => {
                        state.attempts += 1;
                        let mut record =
                            AttemptRecord::running(state.attempts, TriggerType::Retry, now);
                        record.status = AttemptStatus::Failed;
                        record.ended_at_ms = Some(now);
                        record.error = Some(reason.clone());
                        record.logs = None;
                        state.attempt_history.push(record);
                    }
                }
            }
            // Walk legal transitions down to failed.
            let route: &[NodeStatus] = match status {
                NodeStatus::Pending => &[
                    NodeStatus::Ready,
                    NodeStatus::Scheduled,
                    NodeStatus::Running,
                    NodeStatus::Failed,
                ],
                NodeStatus::Scheduled => &[NodeStatus::Running, NodeStatus::Failed],
                _ => &[NodeStatus::Failed],
            };
            for next in route {
                let _ = sm.transition(plan, &node_id, None, *next, &reason);
            }
            sm.recompute_readiness(plan);
        });
        self.engine.persist(&handle);
        self.bus().publish(Event::NodeCompleted {
            plan_id: PlanId::from_string(plan_id),
            node_id,
            success: false,
        });
        Ok(())
    }

    /// Reset a failed node to pending, optionally with new specs or a
    /// fresh worktree.
    pub async fn retry_node(
        &self,
        plan_id: &str,
        node_id: &str,
        options: RetryOptions,
    ) -> Result<(), EngineError> {
        let handle = self.handle(plan_id)?;

        let (status, worktree) = handle.with_plan(|plan| {
            let state = plan.state(node_id);
            (state.map(|s| s.status), state.and_then(|s| s.worktree_path.clone()))
        });
        let status = status.ok_or_else(|| EngineError::UnknownNode(node_id.to_string()))?;
        if status != NodeStatus::Failed {
            return Err(EngineError::NotRetryable { node: node_id.to_string(), status });
        }

        if options.clear_worktree {
            // Refuse when upstream FI work would be discarded with it.
            let blocking_dep = handle.with_plan(|plan| {
                plan.node(node_id).and_then(|node| {
                    node.dependencies.iter().find_map(|dep| {
                        let has_commit = plan
                            .state(dep.as_str())
                            .is_some_and(|s| s.completed_commit.is_some());
                        has_commit.then(|| {
                            plan.node(dep.as_str())
                                .map(|n| n.producer_id.clone())
                                .unwrap_or_else(|| dep.to_string())
                        })
                    })
                })
            });
            if let Some(dep) = blocking_dep {
                return Err(EngineError::WouldDiscardUpstreamWork(dep));
            }
            if let Some(worktree) = worktree {
                let repo = handle.with_plan(|plan| plan.repo_path.clone());
                Git::new(repo).remove_worktree(&worktree).await;
            }
        }

        handle.reset_node_token(node_id);
        let node_id = NodeId::from_string(node_id);
        let attempts = handle.with_plan(|plan| {
            let last_error =
                plan.node_states.get(node_id.as_str()).and_then(|s| s.error.clone());
            if let Some(node) = plan.nodes.get_mut(node_id.as_str()) {
                if let Some(work) = options.new_work.clone() {
                    node.work = work;
                } else if node.work.is_agent() {
                    // Agent jobs retried as-is get fresh fix instructions.
                    let instructions =
                        heal::build_retry_instructions(node, last_error.as_deref());
                    if let WorkSpec::Agent { instructions: slot, .. } = &mut node.work {
                        *slot = instructions;
                    }
                }
                if let Some(prechecks) = options.new_prechecks.clone() {
                    node.prechecks = Some(prechecks);
                }
                if let Some(postchecks) = options.new_postchecks.clone() {
                    node.postchecks = Some(postchecks);
                }
            }

            if let Some(state) = plan.state_mut(node_id.as_str()) {
                state.error = None;
                state.force_failed = false;
                state.force_fail_message = None;
                if options.clear_worktree {
                    state.worktree_path = None;
                    state.base_commit = None;
                    state.resume_from_phase = None;
                    state.step_statuses.clear();
                    state.worktree_cleaned_up = false;
                }
            }
            let sm = self.engine.state_machine();
            let _ = sm.transition(plan, &node_id, None, NodeStatus::Pending, "retry");
            sm.recompute_readiness(plan);
            plan.state(node_id.as_str()).map(|s| s.attempts).unwrap_or_default()
        });

        let node_specs = handle.with_plan(|plan| plan.node(node_id.as_str()).cloned());
        if let Some(node) = node_specs {
            self.engine.store().save_node_specs(
                plan_id,
                node_id.as_str(),
                &node.work,
                node.prechecks.as_ref(),
                node.postchecks.as_ref(),
            )?;
        }
        self.engine.persist(&handle);
        self.bus().publish(Event::NodeRetry {
            plan_id: PlanId::from_string(plan_id),
            node_id,
            attempt: attempts,
        });
        Ok(())
    }

    /// One pump cycle: watchdog, then schedule ready nodes within the
    /// local and global parallelism budgets.
    pub async fn tick(&self) {
        self.watchdog_tick().await;

        let handles: Vec<Arc<PlanHandle>> = self
            .plans
            .lock()
            .values()
            .filter(|h| h.started.load(Ordering::SeqCst))
            .cloned()
            .collect();

        let mut global_running: usize = handles
            .iter()
            .map(|h| h.with_plan(|plan| Scheduler::running_work_count(plan)))
            .sum();

        for handle in handles {
            let selected = handle.with_plan(|plan| {
                let local = Scheduler::running_work_count(plan);
                self.scheduler.select_nodes(plan, local, global_running)
            });
            if selected.is_empty() {
                continue;
            }

            for node_id in selected {
                let scheduled = handle.with_plan(|plan| {
                    let version = plan.state(node_id.as_str()).map(|s| s.version)?;
                    let is_work =
                        plan.node(node_id.as_str()).map(|n| !n.work.is_noop()).unwrap_or(false);
                    self.engine
                        .state_machine()
                        .transition(
                            plan,
                            &node_id,
                            Some(version),
                            NodeStatus::Scheduled,
                            "selected by scheduler",
                        )
                        .ok()?;
                    Some(is_work)
                });
                let Some(is_work) = scheduled else { continue };
                if is_work {
                    global_running += 1;
                }
                self.engine.persist(&handle);

                let engine = self.engine.clone();
                let handle = handle.clone();
                tokio::spawn(async move {
                    engine.execute_job_node(handle, node_id).await;
                });
            }
        }
    }

    /// Force-fail running nodes whose PID has been dead for
    /// [`WATCHDOG_DEAD_TICKS`] consecutive ticks.
    async fn watchdog_tick(&self) {
        let mut expired: Vec<(String, String, u32)> = Vec::new();
        {
            let handles: Vec<(String, Arc<PlanHandle>)> = self
                .plans
                .lock()
                .iter()
                .filter(|(_, h)| h.started.load(Ordering::SeqCst))
                .map(|(id, h)| (id.clone(), h.clone()))
                .collect();
            let mut watchdog = self.watchdog.lock();

            for (plan_id, handle) in handles {
                let running: Vec<(String, Option<u32>)> = handle.with_plan(|plan| {
                    plan.node_states
                        .iter()
                        .filter(|(_, s)| s.status == NodeStatus::Running)
                        .map(|(id, s)| (id.clone(), s.pid))
                        .collect()
                });
                for (node_id, pid) in running {
                    let key = (plan_id.clone(), node_id.clone());
                    let Some(pid) = pid else {
                        watchdog.remove(&key);
                        continue;
                    };
                    if process::is_alive(pid) {
                        watchdog.remove(&key);
                        continue;
                    }
                    let ticks = watchdog.entry(key.clone()).or_insert(0);
                    *ticks += 1;
                    if *ticks >= WATCHDOG_DEAD_TICKS {
                        watchdog.remove(&key);
                        expired.push((plan_id.clone(), node_id, pid));
                    }
                }
            }
        }

        for (plan_id, node_id, pid) in expired {
            tracing::warn!(plan_id, node_id, pid, "watchdog: process lost; force-failing node");
            let _ = self
                .force_fail_node(
                    &plan_id,
                    &node_id,
                    Some(format!("process {pid} is no longer alive")),
                )
                .await;
        }
    }

    /// Run the pump and event routing until `shutdown`.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = self;
        tokio::spawn(async move {
            let mut events = manager.bus().subscribe();
            let mut interval = tokio::time::interval(PUMP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = manager.shutdown.cancelled() => break,
                    _ = interval.tick() => manager.tick().await,
                    event = events.recv() => {
                        if let Ok(Event::PlanCompleted { plan_id, status }) = event {
                            if status == PlanStatus::Succeeded {
                                manager.on_plan_succeeded(plan_id.as_str());
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Test/ops helper: wait until the plan has no non-terminal nodes.
    pub async fn await_plan_complete(
        &self,
        plan_id: &str,
        timeout: Duration,
    ) -> Option<PlanStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let handle = self.handle(plan_id).ok()?;
            let done = handle.with_plan(|plan| self.engine.state_machine().is_complete(plan));
            if done {
                return self.plan_status(plan_id);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}
