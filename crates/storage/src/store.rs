// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable plan persistence.
//!
//! Layout under the storage root:
//!
//! ```text
//! .lock                                     exclusive single-writer lock
//! plans/<planId>/plan.json                  whole PlanInstance, atomic write
//! plans/<planId>/specs/<nodeId>/work.json   finalized per-node specs
//! plans/<planId>/specs/<nodeId>/attempts/<N>/work.json   per-attempt snapshot
//! logs/<planId>/<nodeId>/<N>.log            raw execution log per attempt
//! ```

use fs2::FileExt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use thiserror::Error;
use trellis_core::{PlanInstance, WorkSpec};

/// Errors from the persistence layer. Callers surface these but never let
/// them cross the state machine; in-memory state stays authoritative.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage root {0} is locked by another process")]
    Locked(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io { path: path.to_path_buf(), source }
}

/// Single-writer store for plan state.
#[derive(Debug)]
pub struct PlanStore {
    root: PathBuf,
    /// Held for the store's lifetime; released on drop.
    _lock: File,
}

impl PlanStore {
    /// Open the store, creating the directory tree and taking the
    /// exclusive lock.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(root.join("plans")).map_err(io_err(&root))?;
        fs::create_dir_all(root.join("logs")).map_err(io_err(&root))?;

        let lock_path = root.join(".lock");
        let lock = File::create(&lock_path).map_err(io_err(&lock_path))?;
        lock.try_lock_exclusive().map_err(|_| StoreError::Locked(root.clone()))?;

        Ok(Self { root, _lock: lock })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plan_dir(&self, plan_id: &str) -> PathBuf {
        self.root.join("plans").join(plan_id)
    }

    fn specs_dir(&self, plan_id: &str, node_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("specs").join(node_id)
    }

    /// The plan's specs directory (heal agents may read prior specs).
    pub fn plan_specs_dir(&self, plan_id: &str) -> PathBuf {
        self.plan_dir(plan_id).join("specs")
    }

    /// Raw execution log path for one attempt.
    pub fn log_path(&self, plan_id: &str, node_id: &str, attempt: u32) -> PathBuf {
        self.root.join("logs").join(plan_id).join(node_id).join(format!("{attempt}.log"))
    }

    /// Persist the whole plan atomically: write-temp-then-rename. One
    /// previous generation is kept at `plan.json.bak`; deeper history is
    /// pointless since the plan carries its own attempt records.
    pub fn save_plan(&self, plan: &PlanInstance) -> Result<(), StoreError> {
        let dir = self.plan_dir(plan.id.as_str());
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;

        let path = dir.join("plan.json");
        let tmp = dir.join("plan.json.tmp");
        let json = serde_json::to_vec_pretty(plan)?;
        fs::write(&tmp, json).map_err(io_err(&tmp))?;
        if path.exists() {
            // Best-effort: losing the backup must not block the save.
            let _ = fs::copy(&path, dir.join("plan.json.bak"));
        }
        fs::rename(&tmp, &path).map_err(io_err(&path))?;
        Ok(())
    }

    /// Load every persisted plan. Corrupt entries are skipped with a
    /// warning; startup must not die to one bad file.
    pub fn load_all(&self) -> Result<Vec<PlanInstance>, StoreError> {
        let plans_dir = self.root.join("plans");
        let mut plans = Vec::new();
        let entries = fs::read_dir(&plans_dir).map_err(io_err(&plans_dir))?;
        for entry in entries.flatten() {
            let path = entry.path().join("plan.json");
            if !path.is_file() {
                continue;
            }
            match fs::read_to_string(&path) {
                Ok(content) => match serde_json::from_str::<PlanInstance>(&content) {
                    Ok(plan) => plans.push(plan),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping corrupt plan")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable plan")
                }
            }
        }
        plans.sort_by_key(|p| p.created_at_ms);
        Ok(plans)
    }

    /// Remove a plan's directory and its logs.
    pub fn delete_plan(&self, plan_id: &str) -> Result<(), StoreError> {
        let dir = self.plan_dir(plan_id);
        if dir.exists() {
            fs::remove_dir_all(&dir).map_err(io_err(&dir))?;
        }
        let logs = self.root.join("logs").join(plan_id);
        if logs.exists() {
            fs::remove_dir_all(&logs).map_err(io_err(&logs))?;
        }
        Ok(())
    }

    /// Write the finalized per-node spec files.
    pub fn save_node_specs(
        &self,
        plan_id: &str,
        node_id: &str,
        work: &WorkSpec,
        prechecks: Option<&WorkSpec>,
        postchecks: Option<&WorkSpec>,
    ) -> Result<(), StoreError> {
        let dir = self.specs_dir(plan_id, node_id);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        self.write_spec(&dir.join("work.json"), work)?;
        if let Some(spec) = prechecks {
            self.write_spec(&dir.join("prechecks.json"), spec)?;
        }
        if let Some(spec) = postchecks {
            self.write_spec(&dir.join("postchecks.json"), spec)?;
        }
        Ok(())
    }

    /// Snapshot the current finalized specs under `attempts/<N>/`.
    pub fn snapshot_attempt_specs(
        &self,
        plan_id: &str,
        node_id: &str,
        attempt: u32,
    ) -> Result<PathBuf, StoreError> {
        let specs = self.specs_dir(plan_id, node_id);
        let dir = specs.join("attempts").join(attempt.to_string());
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        for name in ["work.json", "prechecks.json", "postchecks.json"] {
            let src = specs.join(name);
            if src.is_file() {
                let dst = dir.join(name);
                fs::copy(&src, &dst).map_err(io_err(&dst))?;
            }
        }
        Ok(dir)
    }

    fn write_spec(&self, path: &Path, spec: &WorkSpec) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(spec)?;
        fs::write(path, json).map_err(io_err(path))?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
