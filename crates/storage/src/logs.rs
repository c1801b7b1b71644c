// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only execution logs.
//!
//! Lines are `ISO8601 | phase | kind | message`; multiline messages are
//! split so every physical line carries the full prefix. The in-memory
//! buffer mirrors the file so running attempts can expose inline slices,
//! which are flattened to a file ref when the attempt completes.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::store::StoreError;

/// Position in a log: used to slice per-(sub-)attempt regions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOffsets {
    pub lines: usize,
    pub bytes: u64,
}

/// One attempt's execution log, buffered in memory and written through.
#[derive(Debug)]
pub struct ExecutionLog {
    path: PathBuf,
    file: File,
    lines: Vec<String>,
    bytes: u64,
}

impl ExecutionLog {
    /// Open (or create) the log file, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;
        let bytes = file
            .metadata()
            .map(|m| m.len())
            .map_err(|source| StoreError::Io { path: path.clone(), source })?;
        Ok(Self { path, file, lines: Vec::new(), bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a message. Multiline messages become one log line each.
    /// Write failures are logged and swallowed; losing a log line must not
    /// fail the job.
    pub fn append(&mut self, phase: &str, kind: &str, message: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let mut pieces = message.lines();
        // An empty message still records one line.
        let first = pieces.next().unwrap_or("");
        for piece in std::iter::once(first).chain(pieces) {
            let line = format!("{timestamp} | {phase} | {kind} | {piece}");
            if let Err(e) = writeln!(self.file, "{line}") {
                tracing::warn!(path = %self.path.display(), error = %e, "log write failed");
            } else {
                self.bytes += line.len() as u64 + 1;
            }
            self.lines.push(line);
        }
    }

    /// Current end-of-log position.
    pub fn offsets(&self) -> LogOffsets {
        LogOffsets { lines: self.lines.len(), bytes: self.bytes }
    }

    /// Lines appended since `from` (an attempt slice).
    pub fn lines_since(&self, from: LogOffsets) -> Vec<String> {
        self.lines.get(from.lines..).unwrap_or_default().to_vec()
    }

    pub fn flush(&mut self) {
        if let Err(e) = self.file.flush() {
            tracing::warn!(path = %self.path.display(), error = %e, "log flush failed");
        }
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
