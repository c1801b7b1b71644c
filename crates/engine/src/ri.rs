// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse integration: merge a leaf commit into the target branch.
//!
//! Callers hold the plan's RI lock, so merges are strictly serialized and
//! every merge observes the latest target tip. Concurrent merges racing on
//! the tip could otherwise produce divergent merge commits where the second
//! ref update silently drops the first.

use async_trait::async_trait;
use std::time::Duration;
use trellis_git::{is_diff_only_orchestrator_changes, Git, GitError, MergeOutcome};

const INDEX_LOCK_RETRIES: u32 = 3;
const INDEX_LOCK_BACKOFF: Duration = Duration::from_millis(200);

/// Optional AI conflict resolution. Given the two sides and the conflicting
/// files, an implementation may produce a resolved tree.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    async fn resolve(
        &self,
        git: &Git,
        ours: &str,
        theirs: &str,
        files: &[String],
    ) -> Result<Option<String>, GitError>;
}

/// Outcome of one reverse-integration merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiOutcome {
    Merged {
        merge_commit: String,
        /// False when the merge commit exists but the branch ref could not
        /// be moved (e.g. stash failure); the user may reset manually.
        ref_updated: bool,
    },
    Conflicts {
        files: Vec<String>,
    },
}

fn is_index_lock(err: &GitError) -> bool {
    err.to_string().contains("index.lock")
}

/// Merge `completed_commit` into `target_branch` without touching the
/// user's checkout unless the user is on the target branch.
pub async fn merge_to_target(
    git: &Git,
    target_branch: &str,
    completed_commit: &str,
    message: &str,
    resolver: Option<&dyn ConflictResolver>,
) -> Result<RiOutcome, GitError> {
    let target_tip = git.resolve_ref(target_branch).await?;

    let tree = match git.merge_without_checkout(&target_tip, completed_commit).await? {
        MergeOutcome::Merged { tree } => tree,
        MergeOutcome::Conflicts { files } => {
            let resolved = match resolver {
                Some(resolver) => {
                    resolver.resolve(git, &target_tip, completed_commit, &files).await?
                }
                None => None,
            };
            match resolved {
                Some(tree) => tree,
                None => return Ok(RiOutcome::Conflicts { files }),
            }
        }
    };

    let merge_commit =
        git.commit_tree(&tree, &[&target_tip, completed_commit], message).await?;

    let ref_updated = if git.current_branch().await?.as_deref() == Some(target_branch) {
        reset_checked_out_target(git, &merge_commit).await?
    } else {
        update_ref_with_retry(git, target_branch, &merge_commit).await?;
        true
    };

    Ok(RiOutcome::Merged { merge_commit, ref_updated })
}

async fn update_ref_with_retry(
    git: &Git,
    branch: &str,
    commit: &str,
) -> Result<(), GitError> {
    let mut attempt = 0;
    loop {
        match git.update_ref(branch, commit).await {
            Ok(()) => return Ok(()),
            Err(e) if is_index_lock(&e) && attempt < INDEX_LOCK_RETRIES => {
                attempt += 1;
                tokio::time::sleep(INDEX_LOCK_BACKOFF * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// The user has the target branch checked out: advance it with
/// `reset --hard`, stashing around the reset when the tree is dirty.
///
/// A dirty `.gitignore` whose diff contains only orchestrator-owned lines
/// is discarded instead of stashed. Returns false when the stash could not
/// be taken (the merge commit still exists; the user may reset manually).
async fn reset_checked_out_target(git: &Git, merge_commit: &str) -> Result<bool, GitError> {
    let repo = git.repo_path().to_path_buf();

    if git.has_uncommitted_changes(&repo).await? {
        let dirty = git.dirty_files(&repo).await?;
        if dirty == [".gitignore"] {
            let diff = git.file_diff(&repo, ".gitignore").await?;
            if is_diff_only_orchestrator_changes(&diff) {
                git.checkout_file(&repo, ".gitignore").await?;
            }
        }
    }

    let mut stashed = false;
    if git.has_uncommitted_changes(&repo).await? {
        match git.stash_push(&repo, "trellis reverse integration").await {
            Ok(pushed) => stashed = pushed,
            Err(e) => {
                tracing::warn!(error = %e, "stash failed; leaving target branch ref in place");
                return Ok(false);
            }
        }
    }

    let mut attempt = 0;
    loop {
        match git.reset_hard(&repo, merge_commit).await {
            Ok(()) => break,
            Err(e) if is_index_lock(&e) && attempt < INDEX_LOCK_RETRIES => {
                attempt += 1;
                tokio::time::sleep(INDEX_LOCK_BACKOFF * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }

    if stashed {
        match git.stash_pop(&repo).await? {
            true => {}
            false => {
                // Pop conflicted. Drop the stash only when it holds nothing
                // but orchestrator gitignore lines; otherwise keep it for
                // manual resolution.
                let files = git.stash_show_files(&repo).await.unwrap_or_default();
                let patch = git.stash_show_patch(&repo).await.unwrap_or_default();
                if files == [".gitignore".to_string()]
                    && is_diff_only_orchestrator_changes(&patch)
                {
                    let _ = git.stash_drop(&repo).await;
                } else {
                    tracing::warn!(
                        "stash pop conflicted; stash kept for manual resolution"
                    );
                }
            }
        }
    }

    Ok(true)
}
