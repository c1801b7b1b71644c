// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seven-phase pipeline of one job attempt.
//!
//! Phases run in a fixed order inside one worktree. Failure stops the
//! pipeline and reports the failed phase; the executor decides recovery.
//! `resume_from` re-enters a later phase: earlier phases keep their prior
//! `success` status or are marked `skipped`.

use crate::executor::{ExecutionEngine, PlanHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use trellis_adapters::agent::{AgentRequest, AgentRunner};
use trellis_adapters::process::{run_streaming, ProcessRequest};
use trellis_adapters::validate_evidence;
use trellis_core::{
    Clock, CommitDetail, ExecutionPhase, NodeId, PhaseStatus, PhaseTiming, PlanId, PlanNode,
    WorkSpec,
};
use trellis_git::Git;
use trellis_storage::ExecutionLog;

/// Windows crash codes treated as an external kill (access violation,
/// stack overflow, heap corruption). Other platform codes are normal
/// failures.
pub(crate) const CRASH_EXIT_CODES: [i32; 3] =
    [0xC0000005_u32 as i32, 0xC00000FD_u32 as i32, 0xC0000374_u32 as i32];

/// Everything one attempt needs, resolved up front by the executor.
pub(crate) struct AttemptContext<'e, A: AgentRunner, C: Clock> {
    pub engine: &'e ExecutionEngine<A, C>,
    pub handle: &'e Arc<PlanHandle>,
    pub git: Git,
    pub plan_id: PlanId,
    pub node_id: NodeId,
    pub attempt: u32,
    pub worktree: PathBuf,
    pub base_commit: String,
    pub additional_sources: Vec<String>,
    pub base_branch: String,
    /// Present only when this node performs reverse integration.
    pub target_branch: Option<String>,
    pub log: Mutex<ExecutionLog>,
    pub cancel: CancellationToken,
}

/// Result of one pipeline pass.
#[derive(Debug, Default)]
pub(crate) struct PipelineOutcome {
    pub success: bool,
    pub canceled: bool,
    pub failed_phase: Option<ExecutionPhase>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub no_auto_heal: bool,
    pub override_resume: Option<ExecutionPhase>,
    pub killed_by_signal: bool,
    /// Kind tag of the failed phase's spec ("shell" | "process" | "agent").
    pub failed_spec_kind: Option<&'static str>,
    pub completed_commit: Option<String>,
    pub commit_detail: Option<CommitDetail>,
}

impl PipelineOutcome {
    fn failed(phase: ExecutionPhase, error: impl Into<String>) -> Self {
        Self {
            failed_phase: Some(phase),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Outcome of a single work-spec step.
struct StepRun {
    success: bool,
    canceled: bool,
    exit_code: Option<i32>,
    error: Option<String>,
    no_auto_heal: bool,
    killed_by_signal: bool,
    spec_kind: &'static str,
}

impl<'e, A: AgentRunner, C: Clock> AttemptContext<'e, A, C> {
    /// Fresh node snapshot; heal swaps mutate `work` between passes.
    fn node(&self) -> Option<PlanNode> {
        self.handle.with_plan(|plan| plan.node(self.node_id.as_str()).cloned())
    }

    fn log(&self, phase: ExecutionPhase, kind: &str, message: &str) {
        self.log.lock().append(phase.as_str(), kind, message);
    }

    fn set_phase_status(&self, phase: ExecutionPhase, status: PhaseStatus) {
        self.engine.record_phase_status(self.handle, &self.node_id, phase, status);
    }

    fn record_timing(&self, phase: ExecutionPhase, timing: PhaseTiming) {
        self.engine.record_phase_timing(self.handle, &self.node_id, phase, timing);
    }

    fn set_pid(&self, pid: Option<u32>) {
        self.handle.with_plan(|plan| {
            if let Some(state) = plan.state_mut(self.node_id.as_str()) {
                state.pid = pid;
            }
        });
    }

    /// Instructions file for agent phases; heals overwrite the same file.
    fn instructions_path(&self) -> PathBuf {
        self.worktree
            .join(".github")
            .join("instructions")
            .join(format!("trellis-{}.md", self.node_id.short(8)))
    }

    pub(crate) fn log_path(&self) -> PathBuf {
        self.log.lock().path().to_path_buf()
    }
}

/// Run the phases of one attempt, starting at `resume_from` when set.
pub(crate) async fn run_attempt<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    resume_from: Option<ExecutionPhase>,
) -> PipelineOutcome {
    let Some(node) = ctx.node() else {
        return PipelineOutcome::failed(ExecutionPhase::Work, "node disappeared from plan");
    };
    let previous: HashMap<ExecutionPhase, PhaseStatus> = ctx.handle.with_plan(|plan| {
        plan.state(ctx.node_id.as_str()).map(|s| s.step_statuses.clone()).unwrap_or_default()
    });

    let mut outcome = PipelineOutcome::default();
    // Resuming past the commit phase: the completed commit of the prior
    // pass carries over.
    if resume_from.is_some_and(|r| r.index() > ExecutionPhase::Commit.index()) {
        outcome.completed_commit = ctx.handle.with_plan(|plan| {
            plan.state(ctx.node_id.as_str()).and_then(|s| s.completed_commit.clone())
        });
    }
    for phase in ExecutionPhase::ORDER {
        if ctx.cancel.is_cancelled() {
            outcome.canceled = true;
            outcome.failed_phase = Some(phase);
            outcome.error = Some("canceled".to_string());
            return outcome;
        }

        // Resume: earlier phases keep a prior success or are skipped.
        if let Some(resume) = resume_from {
            if phase.index() < resume.index() {
                let kept = previous.get(&phase) == Some(&PhaseStatus::Success);
                ctx.set_phase_status(
                    phase,
                    if kept { PhaseStatus::Success } else { PhaseStatus::Skipped },
                );
                continue;
            }
        }

        let started_at = ctx.engine.epoch_ms();
        ctx.set_phase_status(phase, PhaseStatus::Running);

        let result = run_phase(ctx, &node, phase, &mut outcome).await;
        ctx.record_timing(
            phase,
            PhaseTiming { started_at_ms: started_at, ended_at_ms: Some(ctx.engine.epoch_ms()) },
        );

        match result {
            PhaseResult::Success => ctx.set_phase_status(phase, PhaseStatus::Success),
            PhaseResult::Skipped => ctx.set_phase_status(phase, PhaseStatus::Skipped),
            PhaseResult::Canceled => {
                ctx.set_phase_status(phase, PhaseStatus::Failed);
                outcome.canceled = true;
                outcome.failed_phase = Some(phase);
                outcome.error.get_or_insert_with(|| "canceled".to_string());
                return outcome;
            }
            PhaseResult::Failed => {
                ctx.set_phase_status(phase, PhaseStatus::Failed);
                outcome.failed_phase = Some(phase);
                return outcome;
            }
        }
    }

    outcome.success = true;
    outcome
}

enum PhaseResult {
    Success,
    Skipped,
    Failed,
    Canceled,
}

async fn run_phase<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    phase: ExecutionPhase,
    outcome: &mut PipelineOutcome,
) -> PhaseResult {
    match phase {
        ExecutionPhase::MergeFi => merge_fi(ctx, node, outcome).await,
        ExecutionPhase::Setup => setup(ctx, node, outcome).await,
        ExecutionPhase::Prechecks => match &node.prechecks {
            Some(spec) => checked_step(ctx, node, phase, spec, outcome).await,
            None => PhaseResult::Skipped,
        },
        ExecutionPhase::Work => checked_step(ctx, node, phase, &node.work, outcome).await,
        ExecutionPhase::Commit => commit(ctx, node, outcome).await,
        ExecutionPhase::Postchecks => match &node.postchecks {
            Some(spec) => checked_step(ctx, node, phase, spec, outcome).await,
            None => PhaseResult::Skipped,
        },
        ExecutionPhase::MergeRi => merge_ri(ctx, node, outcome).await,
    }
}

/// merge-fi: acquire the worktree at the base commit, then forward-integrate
/// the remaining dependency commits. Consumption is acknowledged on success.
async fn merge_fi<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    outcome: &mut PipelineOutcome,
) -> PhaseResult {
    let phase = ExecutionPhase::MergeFi;
    let acquisition = match ctx.git.create_or_reuse_detached(&ctx.worktree, &ctx.base_commit).await
    {
        Ok(acquisition) => acquisition,
        Err(e) => {
            outcome.error = Some(format!("worktree setup failed: {e}"));
            ctx.log(phase, "error", &format!("worktree setup failed: {e}"));
            return PhaseResult::Failed;
        }
    };
    if acquisition.total_ms > 500 {
        tracing::warn!(
            plan_id = %ctx.plan_id,
            node_id = %ctx.node_id,
            total_ms = acquisition.total_ms,
            "slow worktree acquisition"
        );
    }
    ctx.log(
        phase,
        "info",
        &format!(
            "worktree {} at {} ({}ms)",
            if acquisition.reused { "reused" } else { "created" },
            ctx.worktree.display(),
            acquisition.total_ms
        ),
    );

    ctx.handle.with_plan(|plan| {
        // base_commit_at_start is written exactly once, on the first fresh
        // worktree of the plan.
        if !acquisition.reused && plan.base_commit_at_start.is_none() {
            plan.base_commit_at_start = Some(acquisition.base_commit.clone());
        }
        if let Some(state) = plan.state_mut(ctx.node_id.as_str()) {
            state.worktree_path = Some(ctx.worktree.clone());
            if !acquisition.reused {
                state.base_commit = Some(acquisition.base_commit.clone());
            } else if state.base_commit.is_none() {
                state.base_commit = Some(acquisition.base_commit.clone());
            }
        }
    });

    // The worktree root lives under the repository; keep it ignored in the
    // main checkout. A dirty .gitignore holding only these lines is safe to
    // discard during reverse integration.
    if let Err(e) = ctx.git.ensure_orchestrator_gitignore(ctx.git.repo_path()).await {
        tracing::warn!(error = %e, "could not ensure orchestrator gitignore");
    }
    // Projected files (context briefing, instructions, evidence) must never
    // be committed with job work.
    if let Err(e) = ctx.git.ensure_orchestrator_excludes().await {
        tracing::warn!(error = %e, "could not ensure orchestrator excludes");
    }

    for source in &ctx.additional_sources {
        ctx.log(phase, "info", &format!("merging dependency commit {source}"));
        if let Err(e) = ctx.git.merge_in_worktree(&ctx.worktree, source).await {
            outcome.error = Some(format!("forward integration of {source} failed: {e}"));
            ctx.log(phase, "error", &format!("forward integration failed: {e}"));
            return PhaseResult::Failed;
        }
    }

    // Acknowledge consumption of every dependency's commit, then let the
    // owner clean up worktrees whose consumers are all done.
    let clean_up = ctx.handle.with_plan(|plan| {
        for dep in &node.dependencies {
            if let Some(dep_state) = plan.state_mut(dep.as_str()) {
                dep_state.ack_consumer(&ctx.node_id);
            }
        }
        plan.clean_up_successful_work
    });
    ctx.engine.persist(ctx.handle);
    if clean_up {
        crate::cleanup::cleanup_eligible_worktrees(&ctx.git, ctx.handle, ctx.engine).await;
    }

    PhaseResult::Success
}

/// setup: project the context briefing into the worktree. Idempotent.
async fn setup<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    outcome: &mut PipelineOutcome,
) -> PhaseResult {
    let phase = ExecutionPhase::Setup;
    let mut content = format!("# Job briefing\n\nJob: {}\n", node.name);
    if !node.task.is_empty() {
        content.push_str(&format!("Task: {}\n", node.task));
    }
    if ctx.engine.config().setup.project_worktree_context {
        content.push_str(&format!("Worktree: {}\n", ctx.worktree.display()));
    }

    let dir = ctx.worktree.join(".github").join("instructions");
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        outcome.error = Some(format!("setup failed: {e}"));
        return PhaseResult::Failed;
    }
    if let Err(e) = tokio::fs::write(dir.join("context.md"), content).await {
        outcome.error = Some(format!("setup failed: {e}"));
        return PhaseResult::Failed;
    }
    ctx.log(phase, "info", "context briefing projected");
    PhaseResult::Success
}

/// prechecks / work / postchecks: dispatch the phase's work spec and fold
/// the step result into the outcome.
async fn checked_step<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    phase: ExecutionPhase,
    spec: &WorkSpec,
    outcome: &mut PipelineOutcome,
) -> PhaseResult {
    if spec.is_noop() {
        return PhaseResult::Skipped;
    }
    let run = dispatch_work(ctx, node, phase, spec).await;

    if run.canceled {
        return PhaseResult::Canceled;
    }
    if run.success {
        return PhaseResult::Success;
    }

    outcome.error = run.error.clone();
    outcome.exit_code = run.exit_code;
    outcome.killed_by_signal = run.killed_by_signal;
    outcome.failed_spec_kind = Some(run.spec_kind);
    outcome.no_auto_heal = run.no_auto_heal
        || node.on_failure.as_ref().is_some_and(|f| f.no_auto_heal);
    outcome.override_resume =
        node.on_failure.as_ref().and_then(|f| f.resume_from_phase);
    PhaseResult::Failed
}

async fn dispatch_work<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    phase: ExecutionPhase,
    spec: &WorkSpec,
) -> StepRun {
    match spec {
        WorkSpec::Shell { command } => {
            ctx.log(phase, "info", &format!("$ {command}"));
            let request = ProcessRequest::shell(command, &ctx.worktree);
            run_process_step(ctx, phase, request, "shell").await
        }
        WorkSpec::Process { executable, args, env, cwd, timeout_ms } => {
            ctx.log(phase, "info", &format!("exec {executable} {}", args.join(" ")));
            let mut request = ProcessRequest::new(
                executable.clone(),
                cwd.clone().unwrap_or_else(|| ctx.worktree.clone()),
            )
            .args(args.clone())
            .env(env.clone());
            if let Some(ms) = timeout_ms {
                request = request.timeout(Duration::from_millis(*ms));
            }
            run_process_step(ctx, phase, request, "process").await
        }
        WorkSpec::Agent {
            instructions,
            allowed_folders,
            allowed_urls,
            model_tier,
            resume_session,
        } => {
            run_agent_step(
                ctx,
                node,
                phase,
                instructions,
                allowed_folders.clone(),
                allowed_urls.clone(),
                model_tier.clone(),
                *resume_session,
            )
            .await
        }
    }
}

async fn run_process_step<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    phase: ExecutionPhase,
    request: ProcessRequest,
    spec_kind: &'static str,
) -> StepRun {
    let result = run_streaming(
        request,
        |kind, line| ctx.log(phase, kind.as_str(), line),
        |pid| ctx.set_pid(Some(pid)),
        &ctx.cancel,
    )
    .await;
    ctx.set_pid(None);

    match result {
        Ok(result) => {
            let error = if result.success() {
                None
            } else if result.timed_out {
                Some("timed out".to_string())
            } else if let Some(signal) = result.signal.as_deref() {
                Some(format!("killed by signal {signal}"))
            } else {
                Some(format!("exit code {}", result.exit_code.unwrap_or(-1)))
            };
            if let Some(error) = &error {
                ctx.log(phase, "error", error);
            }
            StepRun {
                success: result.success(),
                canceled: result.canceled,
                exit_code: result.reported_exit_code(),
                killed_by_signal: result.exit_code.is_none() && result.signal.is_some(),
                error,
                no_auto_heal: false,
                spec_kind,
            }
        }
        Err(e) => {
            ctx.log(phase, "error", &e.to_string());
            StepRun {
                success: false,
                canceled: false,
                exit_code: None,
                killed_by_signal: false,
                error: Some(e.to_string()),
                no_auto_heal: false,
                spec_kind,
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_agent_step<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    phase: ExecutionPhase,
    instructions: &str,
    mut allowed_folders: Vec<PathBuf>,
    allowed_urls: Vec<String>,
    model_tier: Option<String>,
    resume_session: bool,
) -> StepRun {
    let spec_kind = "agent";
    let path = ctx.instructions_path();
    if let Some(parent) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return StepRun {
                success: false,
                canceled: false,
                exit_code: None,
                killed_by_signal: false,
                error: Some(format!("could not create instructions dir: {e}")),
                no_auto_heal: false,
                spec_kind,
            };
        }
    }
    let content = format!("# {}\n\n{}\n", node.name, instructions);
    if let Err(e) = tokio::fs::write(&path, content).await {
        return StepRun {
            success: false,
            canceled: false,
            exit_code: None,
            killed_by_signal: false,
            error: Some(format!("could not write instructions: {e}")),
            no_auto_heal: false,
            spec_kind,
        };
    }

    if !allowed_folders.contains(&ctx.worktree) {
        allowed_folders.push(ctx.worktree.clone());
    }
    let previous_session = ctx.handle.with_plan(|plan| {
        plan.state(ctx.node_id.as_str()).and_then(|s| s.agent_session_id.clone())
    });

    let mut request = AgentRequest::new(&ctx.worktree, &path)
        .allowed_folders(allowed_folders)
        .allowed_urls(allowed_urls);
    if let Some(tier) = model_tier {
        request = request.model_tier(tier);
    }
    if resume_session || previous_session.is_some() {
        if let Some(session) = previous_session {
            request = request.previous_session_id(session);
        }
    }

    ctx.log(phase, "info", &format!("agent run ({})", path.display()));
    let result = ctx
        .engine
        .agents()
        .run(request, &|pid| ctx.set_pid(Some(pid)), &ctx.cancel)
        .await;
    ctx.set_pid(None);

    match result {
        Ok(result) => {
            ctx.handle.with_plan(|plan| {
                if let Some(state) = plan.state_mut(ctx.node_id.as_str()) {
                    if result.session_id.is_some() {
                        state.agent_session_id = result.session_id.clone();
                    }
                    if let Some(metrics) = &result.metrics {
                        state.metrics.get_or_insert_with(Default::default).add(metrics);
                        state
                            .phase_metrics
                            .get_or_insert_with(Default::default)
                            .entry(phase)
                            .or_default()
                            .add(metrics);
                        if let Some(record) = state.running_attempt_mut() {
                            record.metrics = Some(*metrics);
                            record
                                .phase_metrics
                                .get_or_insert_with(Default::default)
                                .entry(phase)
                                .or_default()
                                .add(metrics);
                        }
                    }
                }
            });
            if let Some(error) = &result.error {
                ctx.log(phase, "error", error);
            }
            StepRun {
                success: result.success,
                canceled: ctx.cancel.is_cancelled(),
                exit_code: result.exit_code,
                killed_by_signal: result.killed_by_signal(),
                error: result.error,
                no_auto_heal: result.no_auto_heal,
                spec_kind,
            }
        }
        Err(e) => StepRun {
            success: false,
            canceled: false,
            exit_code: None,
            killed_by_signal: false,
            error: Some(e.to_string()),
            no_auto_heal: false,
            spec_kind,
        },
    }
}

/// commit: stage everything and produce a single commit. With no changes the
/// worktree HEAD (base plus any FI merges) carries forward so downstream
/// consumers still see upstream work.
async fn commit<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    outcome: &mut PipelineOutcome,
) -> PhaseResult {
    let phase = ExecutionPhase::Commit;
    if let Err(e) = ctx.git.stage_all(&ctx.worktree).await {
        outcome.error = Some(format!("staging failed: {e}"));
        return PhaseResult::Failed;
    }
    let has_changes = match ctx.git.has_uncommitted_changes(&ctx.worktree).await {
        Ok(changed) => changed,
        Err(e) => {
            outcome.error = Some(format!("status check failed: {e}"));
            return PhaseResult::Failed;
        }
    };

    if has_changes && node.expects_no_changes {
        let dirty = ctx.git.dirty_files(&ctx.worktree).await.unwrap_or_default();
        outcome.error = Some(format!(
            "expected no changes but the worktree has modifications: {}",
            dirty.join(", ")
        ));
        ctx.log(phase, "error", outcome.error.as_deref().unwrap_or_default());
        return PhaseResult::Failed;
    }

    let completed = if has_changes {
        let message = if node.task.is_empty() {
            node.name.clone()
        } else {
            let task_line = node.task.lines().next().unwrap_or_default();
            format!("{}: {}", node.name, task_line)
        };
        match ctx.git.commit(&ctx.worktree, &message).await {
            Ok(commit) => {
                match ctx.git.commit_details(&commit).await {
                    Ok(detail) => outcome.commit_detail = Some(detail),
                    Err(e) => tracing::warn!(error = %e, "could not read commit details"),
                }
                ctx.log(phase, "info", &format!("committed {commit}"));
                commit
            }
            Err(e) => {
                outcome.error = Some(format!("commit failed: {e}"));
                return PhaseResult::Failed;
            }
        }
    } else {
        match ctx.git.head(&ctx.worktree).await {
            Ok(head) => {
                ctx.log(phase, "info", "no changes; carrying base commit forward");
                head
            }
            Err(e) => {
                outcome.error = Some(format!("head resolution failed: {e}"));
                return PhaseResult::Failed;
            }
        }
    };

    // Jobs may leave evidence describing what they did; validation results
    // are informational.
    let evidence_path = ctx
        .worktree
        .join(".trellis")
        .join("evidence")
        .join(format!("{}.json", ctx.node_id));
    if evidence_path.exists() {
        let report = validate_evidence(&evidence_path, ctx.node_id.as_str());
        if report.valid {
            ctx.log(phase, "info", &format!("evidence: {}", report.summary.unwrap_or_default()));
        } else {
            ctx.log(phase, "warn", &format!("invalid evidence: {}", report.reasons.join("; ")));
        }
    }

    outcome.completed_commit = Some(completed);
    PhaseResult::Success
}

/// merge-ri: leaf nodes with a target branch merge their completed commit
/// into it, strictly serialized per plan.
async fn merge_ri<A: AgentRunner, C: Clock>(
    ctx: &AttemptContext<'_, A, C>,
    node: &PlanNode,
    outcome: &mut PipelineOutcome,
) -> PhaseResult {
    let phase = ExecutionPhase::MergeRi;
    let Some(target) = ctx.target_branch.as_deref() else {
        return PhaseResult::Skipped;
    };
    let Some(completed) = outcome.completed_commit.clone() else {
        outcome.error = Some("no completed commit to integrate".to_string());
        return PhaseResult::Failed;
    };

    // Serialize RI merges across the plan so every merge observes the
    // latest target tip.
    let _ri_guard = ctx.handle.ri_lock.lock().await;

    let message = format!("Merge {} into {target}", node.name);
    let result = crate::ri::merge_to_target(
        &ctx.git,
        target,
        &completed,
        &message,
        ctx.engine.resolver(),
    )
    .await;

    match result {
        Ok(crate::ri::RiOutcome::Merged { merge_commit, ref_updated }) => {
            ctx.log(phase, "info", &format!("merged into {target} as {merge_commit}"));
            ctx.handle.with_plan(|plan| {
                if let Some(state) = plan.state_mut(ctx.node_id.as_str()) {
                    state.merged_to_target = ref_updated;
                }
            });
            if !ref_updated {
                ctx.log(
                    phase,
                    "warn",
                    "merge commit created but the branch ref was not moved; reset manually",
                );
            }
            if ctx.engine.config().push_on_success && ref_updated {
                if let Err(e) = ctx.git.push("origin", target).await {
                    tracing::warn!(error = %e, "push after merge failed (ignored)");
                    ctx.log(phase, "warn", &format!("push failed: {e}"));
                }
            }
            PhaseResult::Success
        }
        Ok(crate::ri::RiOutcome::Conflicts { files }) => {
            outcome.error = Some(format!(
                "Reverse integration into {target} failed: conflicts in {}. The worktree is \
                 preserved; resolve and retry the node.",
                files.join(", ")
            ));
            ctx.log(phase, "error", outcome.error.as_deref().unwrap_or_default());
            PhaseResult::Failed
        }
        Err(e) => {
            outcome.error = Some(format!("Reverse integration into {target} failed: {e}"));
            ctx.log(phase, "error", outcome.error.as_deref().unwrap_or_default());
            PhaseResult::Failed
        }
    }
}
