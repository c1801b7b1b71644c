// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end execution of one job node: forward integration, the phase
//! pipeline, recovery policy, reverse integration, and bookkeeping.
//!
//! Nothing escapes `execute_job_node`: every failure becomes a structured
//! attempt record, a state transition, an event, and a persisted save.

use crate::config::OrchestratorConfig;
use crate::heal;
use crate::pipeline::{self, AttemptContext, PipelineOutcome, CRASH_EXIT_CODES};
use crate::ri::ConflictResolver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use trellis_adapters::agent::AgentRunner;
use trellis_core::{
    AttemptRecord, AttemptStatus, Clock, ExecutionPhase, InlineOrRef, NodeId, NodeStatus,
    PhaseStatus, PhaseTiming, PlanId, PlanInstance, StateMachine, TriggerType,
};
use trellis_git::Git;
use trellis_storage::{ExecutionLog, PlanStore};

/// Shared runtime state of one registered plan.
pub struct PlanHandle {
    plan: Mutex<PlanInstance>,
    /// Serializes reverse-integration merges within the plan.
    pub(crate) ri_lock: tokio::sync::Mutex<()>,
    /// Plan-level cancellation; node tokens are children of this.
    pub cancel: CancellationToken,
    node_tokens: Mutex<HashMap<String, CancellationToken>>,
    /// Set by `start`; the pump only schedules started plans.
    pub started: AtomicBool,
}

impl PlanHandle {
    pub fn new(plan: PlanInstance) -> Arc<Self> {
        Arc::new(Self {
            plan: Mutex::new(plan),
            ri_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            node_tokens: Mutex::new(HashMap::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Run a closure under the plan lock.
    pub fn with_plan<R>(&self, f: impl FnOnce(&mut PlanInstance) -> R) -> R {
        f(&mut self.plan.lock())
    }

    /// Cancellation token for one node, created on first use as a child of
    /// the plan token.
    pub fn node_token(&self, node_id: &str) -> CancellationToken {
        self.node_tokens
            .lock()
            .entry(node_id.to_string())
            .or_insert_with(|| self.cancel.child_token())
            .clone()
    }

    /// Drop a node's token so a retry gets a fresh one.
    pub fn reset_node_token(&self, node_id: &str) {
        self.node_tokens.lock().remove(node_id);
    }
}

/// What the failure handler decided to do next.
enum Recovery {
    Fail,
    /// Case B: re-run the same spec from the failed phase (sub-attempt).
    RetrySameSpec(ExecutionPhase),
    /// Case A: swap the failed spec for a heal agent.
    HealSwap(ExecutionPhase),
    /// Case C: re-execute from an override phase.
    ResumeOverride(ExecutionPhase),
}

/// The per-node execution engine.
pub struct ExecutionEngine<A: AgentRunner, C: Clock> {
    agents: Arc<A>,
    store: Arc<PlanStore>,
    sm: StateMachine,
    config: OrchestratorConfig,
    clock: C,
    resolver: Option<Arc<dyn ConflictResolver>>,
}

impl<A: AgentRunner, C: Clock> Clone for ExecutionEngine<A, C> {
    fn clone(&self) -> Self {
        Self {
            agents: self.agents.clone(),
            store: self.store.clone(),
            sm: self.sm.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<A: AgentRunner, C: Clock> ExecutionEngine<A, C> {
    pub fn new(
        agents: Arc<A>,
        store: Arc<PlanStore>,
        sm: StateMachine,
        config: OrchestratorConfig,
        clock: C,
    ) -> Self {
        Self { agents, store, sm, config, clock, resolver: None }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub(crate) fn agents(&self) -> &A {
        &self.agents
    }

    pub(crate) fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub(crate) fn resolver(&self) -> Option<&dyn ConflictResolver> {
        self.resolver.as_deref()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.sm
    }

    pub fn store(&self) -> &Arc<PlanStore> {
        &self.store
    }

    pub(crate) fn epoch_ms(&self) -> u64 {
        self.clock.epoch_ms()
    }

    /// Save the plan, surfacing but never propagating storage failures;
    /// in-memory state stays authoritative.
    pub(crate) fn persist(&self, handle: &Arc<PlanHandle>) {
        let result = handle.with_plan(|plan| self.store.save_plan(plan));
        if let Err(e) = result {
            tracing::error!(error = %e, "plan save failed; in-memory state remains authoritative");
        }
    }

    /// Mirror a live phase status into the node state and the running
    /// attempt record, then persist and notify.
    pub(crate) fn record_phase_status(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        phase: ExecutionPhase,
        status: PhaseStatus,
    ) {
        let (plan_id, changed) = handle.with_plan(|plan| {
            let plan_id = plan.id.clone();
            let Some(state) = plan.state_mut(node_id.as_str()) else {
                return (plan_id, false);
            };
            state.step_statuses.insert(phase, status);
            if let Some(record) = state.running_attempt_mut() {
                record.step_statuses.get_or_insert_with(Default::default).insert(phase, status);
            }
            (plan_id, true)
        });
        if changed {
            self.persist(handle);
            self.sm.bus().publish(trellis_core::Event::NodeUpdated {
                plan_id,
                node_id: node_id.clone(),
            });
        }
    }

    pub(crate) fn record_phase_timing(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        phase: ExecutionPhase,
        timing: PhaseTiming,
    ) {
        handle.with_plan(|plan| {
            if let Some(state) = plan.state_mut(node_id.as_str()) {
                if let Some(record) = state.running_attempt_mut() {
                    record.phase_timing.get_or_insert_with(Default::default).insert(phase, timing);
                }
            }
        });
    }

    /// Execute one scheduled node to completion. Mutates plan state,
    /// persists, and emits events; never returns an error.
    pub async fn execute_job_node(&self, handle: Arc<PlanHandle>, node_id: NodeId) {
        let cancel = handle.node_token(node_id.as_str());

        let Some(setup) = self.begin_attempt(&handle, &node_id) else {
            return;
        };
        let git = Git::new(&setup.repo_path);

        // Snapshot the specs this attempt will run with.
        if let Err(e) = self.snapshot_specs(&handle, &node_id, setup.attempt) {
            tracing::warn!(error = %e, "could not snapshot attempt specs");
        }
        self.persist(&handle);

        let log = match ExecutionLog::open(self.store.log_path(
            setup.plan_id.as_str(),
            node_id.as_str(),
            setup.attempt,
        )) {
            Ok(log) => log,
            Err(e) => {
                self.finish_failed(
                    &handle,
                    &node_id,
                    None,
                    Some(ExecutionPhase::MergeFi),
                    format!("could not open execution log: {e}"),
                    None,
                );
                return;
            }
        };

        // Resolve the FI base and additional sources.
        let (base_commit, additional_sources) =
            match self.resolve_base_commits(&handle, &node_id, &git).await {
                Ok(resolved) => resolved,
                Err(error) => {
                    self.finish_failed(
                        &handle,
                        &node_id,
                        Some(&Mutex::new(log)),
                        Some(ExecutionPhase::MergeFi),
                        error,
                        None,
                    );
                    return;
                }
            };

        let ctx = AttemptContext {
            engine: self,
            handle: &handle,
            git: git.clone(),
            plan_id: setup.plan_id.clone(),
            node_id: node_id.clone(),
            attempt: setup.attempt,
            worktree: setup.worktree.clone(),
            base_commit,
            additional_sources,
            base_branch: setup.base_branch.clone(),
            target_branch: setup.target_branch.clone(),
            log: Mutex::new(log),
            cancel: cancel.clone(),
        };

        let mut resume_from = setup.resume_from;
        // After a heal pass: HEAD before the heal, for the no-op check.
        let mut heal_baseline: Option<String> = None;

        loop {
            let outcome = pipeline::run_attempt(&ctx, resume_from).await;

            if outcome.canceled {
                self.finish_canceled(&handle, &node_id, &ctx, outcome).await;
                return;
            }

            if outcome.success {
                if let Some(before) = heal_baseline.take() {
                    if self.heal_was_noop(&ctx, &before).await {
                        let mut noop = outcome;
                        noop.error = Some(
                            "auto-heal produced no changes; not healing a no-op again".to_string(),
                        );
                        noop.no_auto_heal = true;
                        noop.failed_phase = Some(ExecutionPhase::Work);
                        noop.success = false;
                        self.finish_failed_outcome(&handle, &node_id, &ctx, noop);
                        return;
                    }
                }
                self.finish_succeeded(&handle, &node_id, &ctx, outcome).await;
                return;
            }

            match self.decide_recovery(&handle, &node_id, &outcome) {
                Recovery::Fail => {
                    self.finish_failed_outcome(&handle, &node_id, &ctx, outcome);
                    return;
                }
                Recovery::RetrySameSpec(phase) => {
                    // Sub-attempt: same record, same attempt number; a new
                    // log slice starts here.
                    handle.with_plan(|plan| {
                        if let Some(state) = plan.state_mut(node_id.as_str()) {
                            state.record_heal_attempt(phase);
                        }
                    });
                    ctx.log.lock().append(
                        phase.as_str(),
                        "info",
                        "externally killed; retrying the same spec",
                    );
                    self.persist(&handle);
                    resume_from = Some(phase);
                }
                Recovery::ResumeOverride(phase) => {
                    self.start_recovery_attempt(&handle, &node_id, TriggerType::AutoHeal);
                    handle.with_plan(|plan| {
                        if let Some(state) = plan.state_mut(node_id.as_str()) {
                            state.record_heal_attempt(
                                outcome.failed_phase.unwrap_or(ExecutionPhase::Work),
                            );
                        }
                    });
                    self.persist(&handle);
                    resume_from = Some(phase);
                }
                Recovery::HealSwap(failed_phase) => {
                    let baseline = ctx.git.head(&ctx.worktree).await.unwrap_or_default();
                    self.install_heal_spec(&handle, &node_id, &ctx, failed_phase, &outcome);
                    self.start_recovery_attempt(&handle, &node_id, TriggerType::AutoHeal);
                    let attempt = handle.with_plan(|plan| {
                        plan.state(node_id.as_str()).map(|s| s.attempts).unwrap_or_default()
                    });
                    if let Err(e) = self.snapshot_specs(&handle, &node_id, attempt) {
                        tracing::warn!(error = %e, "could not snapshot heal specs");
                    }
                    self.persist(&handle);
                    heal_baseline = Some(baseline);
                    // The heal agent owns fixing the failed check; the
                    // pipeline re-enters at the work phase.
                    resume_from = Some(ExecutionPhase::Work);
                }
            }
        }
    }

    /// Attempt preamble under the plan lock: transition to running, bump
    /// the attempt counter, append the running record.
    fn begin_attempt(&self, handle: &Arc<PlanHandle>, node_id: &NodeId) -> Option<AttemptSetup> {
        let now = self.epoch_ms();
        let setup = handle.with_plan(|plan| {
            let state = plan.state(node_id.as_str())?;
            let version = state.version;
            if self
                .sm
                .transition(plan, node_id, Some(version), NodeStatus::Running, "executor start")
                .is_err()
            {
                return None;
            }

            let node = plan.node(node_id.as_str())?.clone();
            let worktree = plan.worktree_path_for(&node);
            let is_ri_node = plan.is_leaf(node_id.as_str()) || plan.is_snapshot_node(&node);
            let target_branch =
                if is_ri_node { plan.target_branch.clone() } else { None };
            let plan_id = plan.id.clone();
            let base_branch = plan.base_branch.clone();
            let repo_path = plan.repo_path.clone();

            let state = plan.state_mut(node_id.as_str())?;
            state.attempts += 1;
            state.error = None;
            state.last_attempt_at_ms = Some(now);
            state.pid = None;
            let trigger =
                if state.attempts == 1 { TriggerType::Initial } else { TriggerType::Retry };
            let mut resume_from = state.resume_from_phase.take();
            if state.worktree_path.is_none() {
                resume_from = None;
            }
            let attempt = state.attempts;
            let mut record = AttemptRecord::running(attempt, trigger, now);
            record.base_commit = state.base_commit.clone();
            record.log_file =
                Some(self.store.log_path(plan_id.as_str(), node_id.as_str(), attempt));
            state.attempt_history.push(record);
            // A fresh attempt starts with a clean phase board.
            state.step_statuses.retain(|_, status| *status == PhaseStatus::Success);

            Some(AttemptSetup {
                plan_id,
                repo_path,
                base_branch,
                target_branch,
                worktree,
                attempt,
                resume_from,
            })
        })?;

        self.sm.bus().publish(trellis_core::Event::NodeStarted {
            plan_id: setup.plan_id.clone(),
            node_id: node_id.clone(),
            attempt: setup.attempt,
        });
        Some(setup)
    }

    fn snapshot_specs(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        attempt: u32,
    ) -> Result<(), trellis_storage::StoreError> {
        let (plan_id, node) = handle.with_plan(|plan| {
            (plan.id.clone(), plan.node(node_id.as_str()).cloned())
        });
        let Some(node) = node else { return Ok(()) };
        self.store.save_node_specs(
            plan_id.as_str(),
            node_id.as_str(),
            &node.work,
            node.prechecks.as_ref(),
            node.postchecks.as_ref(),
        )?;
        self.store.snapshot_attempt_specs(plan_id.as_str(), node_id.as_str(), attempt)?;
        Ok(())
    }

    /// Resolve the FI base commit and the additional FI sources for a node.
    async fn resolve_base_commits(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        git: &Git,
    ) -> Result<(String, Vec<String>), String> {
        enum Resolution {
            Snapshot(String, Vec<String>),
            Rootless(Option<String>, String),
            Dependent(String, Vec<String>),
        }

        let resolution = handle.with_plan(|plan| {
            let node = plan
                .node(node_id.as_str())
                .cloned()
                .ok_or_else(|| "node disappeared from plan".to_string())?;
            let commits = self
                .sm
                .base_commits_for_node(plan, node_id.as_str())
                .map_err(|e| e.to_string())?;

            if plan.is_snapshot_node(&node) {
                let snapshot = plan
                    .snapshot
                    .as_ref()
                    .ok_or_else(|| "snapshot node without plan snapshot".to_string())?;
                // The snapshot worktree integrates every dependency commit.
                Ok::<Resolution, String>(Resolution::Snapshot(snapshot.base_commit.clone(), commits))
            } else if node.dependencies.is_empty() {
                let snapshot_base = plan.snapshot.as_ref().map(|s| s.base_commit.clone());
                Ok(Resolution::Rootless(snapshot_base, plan.base_branch.clone()))
            } else {
                let mut commits = commits;
                let base = commits.remove(0);
                Ok(Resolution::Dependent(base, commits))
            }
        })?;

        match resolution {
            Resolution::Snapshot(base, sources) => Ok((base, sources)),
            Resolution::Dependent(base, sources) => Ok((base, sources)),
            Resolution::Rootless(Some(snapshot_base), _) => Ok((snapshot_base, Vec::new())),
            Resolution::Rootless(None, base_branch) => {
                let base = git
                    .resolve_ref(&base_branch)
                    .await
                    .map_err(|e| format!("could not resolve base branch {base_branch}: {e}"))?;
                Ok((base, Vec::new()))
            }
        }
    }

    /// Decide the recovery action for a failed pipeline pass.
    fn decide_recovery(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        outcome: &PipelineOutcome,
    ) -> Recovery {
        let failed_phase = outcome.failed_phase.unwrap_or(ExecutionPhase::Work);
        let (auto_heal, force_fail, heal_count) = handle.with_plan(|plan| {
            let node = plan.node(node_id.as_str());
            let auto_heal = node.map(|n| n.auto_heal).unwrap_or(false);
            let force_fail = node
                .and_then(|n| n.on_failure.as_ref())
                .map(|f| f.force_fail)
                .unwrap_or(false);
            let heal_count = plan
                .state(node_id.as_str())
                .map(|s| s.heal_count(failed_phase))
                .unwrap_or(u32::MAX);
            (auto_heal, force_fail, heal_count)
        });

        if force_fail {
            return Recovery::Fail;
        }
        let budget_left = heal_count < self.config.auto_heal.max_attempts;

        // Case C: an override resume phase wins when the budget allows and
        // nothing suppressed auto-recovery.
        if let Some(override_phase) = outcome.override_resume {
            if budget_left && !outcome.no_auto_heal {
                return Recovery::ResumeOverride(override_phase);
            }
        }

        if outcome.no_auto_heal || !auto_heal || !failed_phase.is_healable() || !budget_left {
            return Recovery::Fail;
        }

        match outcome.failed_spec_kind {
            // Case B: an externally-killed agent retries the same spec.
            Some("agent") => {
                let externally_killed = outcome.killed_by_signal
                    || outcome.exit_code.is_some_and(|c| CRASH_EXIT_CODES.contains(&c));
                if externally_killed {
                    Recovery::RetrySameSpec(failed_phase)
                } else {
                    Recovery::Fail
                }
            }
            // Case A: shell/process failures swap to a heal agent.
            Some("shell") | Some("process") => Recovery::HealSwap(failed_phase),
            _ => Recovery::Fail,
        }
    }

    /// Swap the node's work spec for the heal agent spec.
    fn install_heal_spec(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        ctx: &AttemptContext<'_, A, C>,
        failed_phase: ExecutionPhase,
        outcome: &PipelineOutcome,
    ) {
        let log_path = ctx.log_path();
        handle.with_plan(|plan| {
            let specs_dir = self.store.plan_specs_dir(plan.id.as_str());
            let Some(node) = plan.nodes.get_mut(node_id.as_str()) else { return };
            let failed_spec = match failed_phase {
                ExecutionPhase::Prechecks => node.prechecks.clone(),
                ExecutionPhase::Postchecks => node.postchecks.clone(),
                _ => Some(node.work.clone()),
            }
            .unwrap_or_else(|| node.work.clone());

            let heal_spec = heal::build_heal_spec(
                node,
                failed_phase,
                &failed_spec,
                outcome.error.as_deref().unwrap_or("unknown error"),
                outcome.exit_code,
                &log_path,
                &ctx.worktree,
                &specs_dir,
            );
            // Subsequent heals build on the last.
            node.work = heal_spec;
            if let Some(state) = plan.node_states.get_mut(node_id.as_str()) {
                state.record_heal_attempt(failed_phase);
            }
        });
    }

    /// Bump attempts and append a fresh running record for a recovery pass.
    fn start_recovery_attempt(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        trigger: TriggerType,
    ) {
        let now = self.epoch_ms();
        let (plan_id, attempt) = handle.with_plan(|plan| {
            let plan_id = plan.id.clone();
            let log_root = self.store.clone();
            let Some(state) = plan.state_mut(node_id.as_str()) else { return (plan_id, 0) };

            // Close out the previous running record as failed.
            if let Some(record) = state.running_attempt_mut() {
                record.status = AttemptStatus::Failed;
                record.ended_at_ms = Some(now);
            }
            state.attempts += 1;
            state.error = None;
            let mut record = AttemptRecord::running(state.attempts, trigger, now);
            record.base_commit = state.base_commit.clone();
            record.log_file =
                Some(log_root.log_path(plan_id.as_str(), node_id.as_str(), state.attempts));
            state.attempt_history.push(record);
            (plan_id, state.attempts)
        });
        if attempt > 0 {
            self.sm.bus().publish(trellis_core::Event::NodeRetry {
                plan_id,
                node_id: node_id.clone(),
                attempt,
            });
        }
    }

    /// After a heal pass: no new HEAD and no uncommitted changes means the
    /// heal did nothing.
    async fn heal_was_noop(&self, ctx: &AttemptContext<'_, A, C>, baseline: &str) -> bool {
        let head = match ctx.git.head(&ctx.worktree).await {
            Ok(head) => head,
            Err(_) => return false,
        };
        if head != baseline {
            return false;
        }
        !ctx.git.has_uncommitted_changes(&ctx.worktree).await.unwrap_or(true)
    }

    async fn finish_succeeded(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        ctx: &AttemptContext<'_, A, C>,
        outcome: PipelineOutcome,
    ) {
        let now = self.epoch_ms();
        let completed = outcome.completed_commit.clone().unwrap_or_default();
        if completed.is_empty() {
            self.finish_failed_outcome(handle, node_id, ctx, PipelineOutcome {
                failed_phase: Some(ExecutionPhase::Commit),
                error: Some("pipeline succeeded without a completed commit".to_string()),
                ..PipelineOutcome::default()
            });
            return;
        }

        // A leaf that should have merged but didn't is a failure, with the
        // worktree preserved for manual retry.
        let ri_not_merged = handle.with_plan(|plan| {
            let is_ri_node = plan.is_leaf(node_id.as_str())
                || plan.node(node_id.as_str()).is_some_and(|n| plan.is_snapshot_node(n));
            if !is_ri_node || plan.target_branch.is_none() {
                return None;
            }
            match plan.state(node_id.as_str()).and_then(|s| s.step_statuses.get(&ExecutionPhase::MergeRi).copied())
            {
                Some(PhaseStatus::Success) => None,
                other => Some(format!(
                    "Reverse integration did not complete (status {:?}); retry the node",
                    other
                )),
            }
        });
        if let Some(error) = ri_not_merged {
            self.finish_failed_outcome(handle, node_id, ctx, PipelineOutcome {
                failed_phase: Some(ExecutionPhase::MergeRi),
                error: Some(error),
                ..PipelineOutcome::default()
            });
            return;
        }

        // Aggregated summary for leaves, best-effort.
        let aggregated = {
            let is_leaf = handle.with_plan(|plan| plan.is_leaf(node_id.as_str()));
            if is_leaf {
                match ctx.git.range_summary(&ctx.base_branch, &completed).await {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        tracing::warn!(error = %e, "aggregated work summary failed (ignored)");
                        None
                    }
                }
            } else {
                None
            }
        };

        let summary_ref = self.write_attempt_summary(handle, node_id, ctx, &outcome);
        let log_path = ctx.log_path();

        handle.with_plan(|plan| {
            let plan_work_detail = outcome.commit_detail.clone();
            if let Some(detail) = plan_work_detail.clone() {
                plan.work_summary.add_commit(detail);
            }
            if let Some(state) = plan.state_mut(node_id.as_str()) {
                state.completed_commit = Some(completed.clone());
                state.pid = None;
                state.resume_from_phase = None;
                if let Some(detail) = plan_work_detail {
                    state.work_summary.get_or_insert_with(Default::default).add_commit(detail);
                }
                if aggregated.is_some() {
                    state.aggregated_work_summary = aggregated.clone();
                }
                let statuses = state.step_statuses.clone();
                let work_summary = state.work_summary.clone();
                if let Some(record) = state.running_attempt_mut() {
                    record.status = AttemptStatus::Succeeded;
                    record.ended_at_ms = Some(now);
                    record.completed_commit = Some(completed.clone());
                    record.step_statuses = Some(statuses);
                    record.logs = Some(InlineOrRef::Ref(log_path.clone()));
                    record.work_used = match (&summary_ref, work_summary) {
                        (Some(path), _) => Some(InlineOrRef::Ref(path.clone())),
                        (None, Some(summary)) => Some(InlineOrRef::Inline(summary)),
                        (None, None) => None,
                    };
                }
            }
            let _ = self.sm.transition(
                plan,
                node_id,
                None,
                NodeStatus::Succeeded,
                "all phases completed",
            );
            self.sm.recompute_readiness(plan);
        });
        self.persist(handle);

        let plan_id = handle.with_plan(|plan| plan.id.clone());
        self.sm.bus().publish(trellis_core::Event::NodeCompleted {
            plan_id,
            node_id: node_id.clone(),
            success: true,
        });

        let clean_up = handle.with_plan(|plan| plan.clean_up_successful_work);
        if clean_up {
            crate::cleanup::cleanup_eligible_worktrees(&ctx.git, handle, self).await;
        }
    }

    /// Persist the attempt's work summary next to its spec snapshot and
    /// return the ref path.
    fn write_attempt_summary(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        ctx: &AttemptContext<'_, A, C>,
        outcome: &PipelineOutcome,
    ) -> Option<std::path::PathBuf> {
        let detail = outcome.commit_detail.as_ref()?;
        let plan_id = handle.with_plan(|plan| plan.id.clone());
        let dir = self
            .store
            .plan_specs_dir(plan_id.as_str())
            .join(node_id.as_str())
            .join("attempts")
            .join(ctx.attempt.to_string());
        if std::fs::create_dir_all(&dir).is_err() {
            return None;
        }
        let path = dir.join("work_summary.json");
        let json = serde_json::to_vec_pretty(detail).ok()?;
        std::fs::write(&path, json).ok()?;
        Some(path)
    }

    fn finish_failed_outcome(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        ctx: &AttemptContext<'_, A, C>,
        outcome: PipelineOutcome,
    ) {
        // Work completed before a late-phase failure stays recorded so a
        // retry can resume from the failed phase.
        if let Some(completed) = &outcome.completed_commit {
            handle.with_plan(|plan| {
                if let Some(state) = plan.state_mut(node_id.as_str()) {
                    state.completed_commit = Some(completed.clone());
                }
            });
        }
        self.finish_failed(
            handle,
            node_id,
            Some(&ctx.log),
            outcome.failed_phase,
            outcome.error.unwrap_or_else(|| "unknown failure".to_string()),
            outcome.exit_code,
        );
    }

    /// Record a failed attempt, transition, notify, persist.
    fn finish_failed(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        log: Option<&Mutex<ExecutionLog>>,
        failed_phase: Option<ExecutionPhase>,
        error: String,
        exit_code: Option<i32>,
    ) {
        let now = self.epoch_ms();
        let failed_phase = failed_phase.unwrap_or(ExecutionPhase::Work);
        let log_path = log.map(|l| l.lock().path().to_path_buf());

        handle.with_plan(|plan| {
            if let Some(state) = plan.state_mut(node_id.as_str()) {
                state.error = Some(error.clone());
                state.pid = None;
                state.resume_from_phase = Some(failed_phase);
                let statuses = state.step_statuses.clone();
                let completed = state.completed_commit.clone();
                if let Some(record) = state.running_attempt_mut() {
                    record.status = AttemptStatus::Failed;
                    record.ended_at_ms = Some(now);
                    record.failed_phase = Some(failed_phase);
                    record.error = Some(error.clone());
                    record.exit_code = exit_code;
                    record.step_statuses = Some(statuses);
                    record.completed_commit = completed;
                    if let Some(path) = &log_path {
                        record.logs = Some(InlineOrRef::Ref(path.clone()));
                    }
                }
            }
            let _ = self.sm.transition(plan, node_id, None, NodeStatus::Failed, &error);
            self.sm.recompute_readiness(plan);
        });
        self.persist(handle);

        let plan_id = handle.with_plan(|plan| plan.id.clone());
        self.sm.bus().publish(trellis_core::Event::NodeCompleted {
            plan_id,
            node_id: node_id.clone(),
            success: false,
        });
    }

    async fn finish_canceled(
        &self,
        handle: &Arc<PlanHandle>,
        node_id: &NodeId,
        ctx: &AttemptContext<'_, A, C>,
        outcome: PipelineOutcome,
    ) {
        let now = self.epoch_ms();
        let log_path = ctx.log_path();
        handle.with_plan(|plan| {
            if let Some(state) = plan.state_mut(node_id.as_str()) {
                state.pid = None;
                // A force-fail may already have recorded its own reason.
                if state.error.is_none() {
                    state.error =
                        Some(outcome.error.clone().unwrap_or_else(|| "canceled".to_string()));
                }
                if let Some(record) = state.running_attempt_mut() {
                    record.status = AttemptStatus::Canceled;
                    record.ended_at_ms = Some(now);
                    record.failed_phase = outcome.failed_phase;
                    record.error = Some("canceled".to_string());
                    record.logs = Some(InlineOrRef::Ref(log_path.clone()));
                }
            }
            let _ = self.sm.transition(plan, node_id, None, NodeStatus::Canceled, "canceled");
        });
        self.persist(handle);

        let plan_id = handle.with_plan(|plan| plan.id.clone());
        self.sm.bus().publish(trellis_core::Event::NodeCompleted {
            plan_id,
            node_id: node_id.clone(),
            success: false,
        });
    }
}

/// Data resolved at attempt start, outside the pipeline.
struct AttemptSetup {
    plan_id: PlanId,
    repo_path: std::path::PathBuf,
    base_branch: String,
    target_branch: Option<String>,
    worktree: std::path::PathBuf,
    attempt: u32,
    resume_from: Option<ExecutionPhase>,
}
