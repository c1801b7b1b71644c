// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process supervisor: spawn with streamed output, cancellation, timeouts,
//! and PID liveness probes.

use crate::subprocess::{SubprocessError, PHASE_COMMAND_TIMEOUT};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Which stream a captured line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

trellis_core::as_str_display! {
    StreamKind {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// A supervised process invocation.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    /// Per-phase timeout; falls back to [`PHASE_COMMAND_TIMEOUT`].
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: cwd.into(),
            timeout: None,
        }
    }

    trellis_core::setters! {
        args: Vec<String>,
        env: HashMap<String, String>,
        opt timeout: Duration,
    }

    /// The platform shell invocation for a single shell command.
    pub fn shell(command: &str, cwd: impl Into<PathBuf>) -> Self {
        Self::new("/bin/sh", cwd).args(vec!["-c".to_string(), command.to_string()])
    }
}

/// How a supervised process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessResult {
    pub pid: u32,
    pub exit_code: Option<i32>,
    /// Name of the terminating signal, when killed (e.g. "SIGTERM").
    pub signal: Option<String>,
    pub timed_out: bool,
    pub canceled: bool,
}

impl ProcessResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.canceled
    }

    /// Exit code for reporting: real code, or the 128+signo convention for
    /// signal deaths.
    pub fn reported_exit_code(&self) -> Option<i32> {
        self.exit_code.or_else(|| {
            self.signal
                .as_deref()
                .and_then(signal_number)
                .map(|signo| 128 + signo)
        })
    }
}

fn signal_name(signo: i32) -> String {
    Signal::try_from(signo)
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|_| format!("signal {signo}"))
}

fn signal_number(name: &str) -> Option<i32> {
    use std::str::FromStr;
    Signal::from_str(name).ok().map(|s| s as i32)
}

/// True when a process with this PID exists and is visible to us.
pub fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

/// Best-effort termination: SIGTERM, a short grace period, then SIGKILL.
pub async fn terminate(pid: u32, grace: Duration) {
    let target = Pid::from_raw(pid as i32);
    if kill(target, Signal::SIGTERM).is_err() {
        return;
    }
    let deadline = tokio::time::Instant::now() + grace;
    while tokio::time::Instant::now() < deadline {
        if !is_alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let _ = kill(target, Signal::SIGKILL);
}

/// PIDs of the process subtree rooted at `root` (including `root`),
/// resolved from /proc. On platforms without /proc only the root is
/// returned.
pub fn subtree_pids(root: u32) -> Vec<u32> {
    let mut parents: HashMap<u32, u32> = HashMap::new();
    if let Ok(entries) = std::fs::read_dir("/proc") {
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            let Ok(status) = std::fs::read_to_string(entry.path().join("status")) else {
                continue;
            };
            if let Some(ppid) = status
                .lines()
                .find_map(|l| l.strip_prefix("PPid:"))
                .and_then(|v| v.trim().parse::<u32>().ok())
            {
                parents.insert(pid, ppid);
            }
        }
    }

    let mut subtree = vec![root];
    let mut frontier = vec![root];
    while let Some(parent) = frontier.pop() {
        for (&pid, &ppid) in &parents {
            if ppid == parent && !subtree.contains(&pid) {
                subtree.push(pid);
                frontier.push(pid);
            }
        }
    }
    subtree
}

/// SIGKILL the whole process group rooted at `pid`.
fn kill_group(pid: u32) {
    let _ = kill(Pid::from_raw(-(pid as i32)), Signal::SIGKILL);
}

fn stream_lines(
    reader: impl tokio::io::AsyncRead + Unpin + Send + 'static,
    kind: StreamKind,
    tx: tokio::sync::mpsc::Sender<(StreamKind, String)>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((kind, line)).await.is_err() {
                break;
            }
        }
    });
}

/// Run a process with line-streamed output, honoring cancellation and the
/// phase timeout. `on_spawn` fires once with the PID; `on_line` fires for
/// every stdout/stderr line in arrival order.
pub async fn run_streaming(
    request: ProcessRequest,
    mut on_line: impl FnMut(StreamKind, &str),
    on_spawn: impl FnOnce(u32),
    cancel: &CancellationToken,
) -> Result<ProcessResult, SubprocessError> {
    let label = request.program.clone();
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .envs(&request.env)
        .current_dir(&request.cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|source| SubprocessError::Io { label: label.clone(), source })?;
    let pid = child.id().unwrap_or_default();
    on_spawn(pid);

    let (tx, mut rx) = tokio::sync::mpsc::channel::<(StreamKind, String)>(64);
    if let Some(stdout) = child.stdout.take() {
        stream_lines(stdout, StreamKind::Stdout, tx.clone());
    }
    if let Some(stderr) = child.stderr.take() {
        stream_lines(stderr, StreamKind::Stderr, tx.clone());
    }
    drop(tx);

    let deadline =
        tokio::time::Instant::now() + request.timeout.unwrap_or(PHASE_COMMAND_TIMEOUT);
    let mut result = ProcessResult { pid, ..ProcessResult::default() };

    // Drain output until both streams close, then collect the exit status.
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                kill_group(pid);
                let _ = child.kill().await;
                result.canceled = true;
                result.signal = Some("SIGKILL".to_string());
                return Ok(result);
            }
            _ = tokio::time::sleep_until(deadline) => {
                kill_group(pid);
                let _ = child.kill().await;
                result.timed_out = true;
                result.signal = Some("SIGKILL".to_string());
                return Ok(result);
            }
            item = rx.recv() => match item {
                Some((kind, line)) => on_line(kind, &line),
                None => break,
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            kill_group(pid);
            let _ = child.kill().await;
            result.canceled = true;
            result.signal = Some("SIGKILL".to_string());
            return Ok(result);
        }
        _ = tokio::time::sleep_until(deadline) => {
            kill_group(pid);
            let _ = child.kill().await;
            result.timed_out = true;
            result.signal = Some("SIGKILL".to_string());
            return Ok(result);
        }
        status = child.wait() => {
            status.map_err(|source| SubprocessError::Io { label: label.clone(), source })?
        }
    };

    result.exit_code = status.code();
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        result.signal = status.signal().map(signal_name);
    }
    Ok(result)
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
