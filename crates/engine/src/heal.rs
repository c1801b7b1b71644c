// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-heal spec construction: swap a failed non-agent phase for an agent
//! with diagnosis/fix instructions.

use std::path::{Path, PathBuf};
use trellis_core::{ExecutionPhase, PlanNode, WorkSpec};

fn describe_command(spec: &WorkSpec) -> String {
    match spec {
        WorkSpec::Shell { command } => format!("shell command: `{command}`"),
        WorkSpec::Process { executable, args, .. } => {
            format!("process: `{executable} {}`", args.join(" "))
        }
        WorkSpec::Agent { .. } => "the previous agent task".to_string(),
    }
}

/// Union of agent allowances across all of the node's phase specs, plus the
/// worktree and the plan's specs directory.
pub fn heal_allowances(
    node: &PlanNode,
    worktree: &Path,
    specs_dir: &Path,
) -> (Vec<PathBuf>, Vec<String>) {
    let mut folders = vec![worktree.to_path_buf(), specs_dir.to_path_buf()];
    let mut urls = Vec::new();
    for spec in [Some(&node.work), node.prechecks.as_ref(), node.postchecks.as_ref()]
        .into_iter()
        .flatten()
    {
        if let WorkSpec::Agent { allowed_folders, allowed_urls, .. } = spec {
            for folder in allowed_folders {
                if !folders.contains(folder) {
                    folders.push(folder.clone());
                }
            }
            for url in allowed_urls {
                if !urls.contains(url) {
                    urls.push(url.clone());
                }
            }
        }
    }
    (folders, urls)
}

/// Build the heal agent spec for a failed phase.
///
/// Prechecks/work heals instruct the agent to fix the error and re-run the
/// original command. Postchecks heals lead with diagnosis and require the
/// agent to exit with failure when the check itself is wrong.
pub fn build_heal_spec(
    node: &PlanNode,
    failed_phase: ExecutionPhase,
    failed_spec: &WorkSpec,
    error: &str,
    exit_code: Option<i32>,
    log_file: &Path,
    worktree: &Path,
    specs_dir: &Path,
) -> WorkSpec {
    let command = describe_command(failed_spec);
    let exit_note = exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default();

    let instructions = match failed_phase {
        ExecutionPhase::Postchecks => format!(
            "The `{phase}` verification for job \"{name}\" failed{exit_note}.\n\
             Failed check: {command}\n\
             Error: {error}\n\
             Full log: {log}\n\n\
             Diagnose the failure first. If the check itself is wrong or the \
             failure is expected, explain why and exit with a failure status \
             so a human can decide. Only if the product code is at fault, fix \
             it and re-run the check to confirm it passes.",
            phase = failed_phase,
            name = node.name,
            log = log_file.display(),
        ),
        _ => format!(
            "The `{phase}` step of job \"{name}\" failed{exit_note}.\n\
             Failed {command}\n\
             Error: {error}\n\
             Full log: {log}\n\n\
             Task context: {task}\n\n\
             Fix the error, then re-run the original command and make sure it \
             succeeds before you finish.",
            phase = failed_phase,
            name = node.name,
            log = log_file.display(),
            task = node.task,
        ),
    };

    let (allowed_folders, allowed_urls) = heal_allowances(node, worktree, specs_dir);
    WorkSpec::Agent {
        instructions,
        allowed_folders,
        allowed_urls,
        model_tier: None,
        resume_session: false,
    }
}

/// Instructions for an agent job retried without an explicit new spec.
pub fn build_retry_instructions(node: &PlanNode, error: Option<&str>) -> String {
    match error {
        Some(error) => format!(
            "The previous attempt of job \"{}\" failed with:\n{error}\n\n\
             Fix the previous error and complete the original task:\n{}",
            node.name, node.task
        ),
        None => format!(
            "The previous attempt of job \"{}\" failed. Complete the original task:\n{}",
            node.name, node.task
        ),
    }
}

#[cfg(test)]
#[path = "heal_tests.rs"]
mod tests;
