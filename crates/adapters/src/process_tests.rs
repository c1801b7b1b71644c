// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use parking_lot::Mutex;
use std::sync::Arc;

fn collect_lines() -> (Arc<Mutex<Vec<(StreamKind, String)>>>, impl FnMut(StreamKind, &str)) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    (lines, move |kind, line: &str| sink.lock().push((kind, line.to_string())))
}

#[tokio::test]
async fn shell_command_streams_stdout_and_stderr() {
    let (lines, on_line) = collect_lines();
    let request = ProcessRequest::shell("echo out; echo err >&2", std::env::temp_dir());
    let cancel = CancellationToken::new();
    let result = run_streaming(request, on_line, |_| {}, &cancel).await.unwrap();

    assert!(result.success());
    assert_eq!(result.exit_code, Some(0));
    let lines = lines.lock();
    assert!(lines.contains(&(StreamKind::Stdout, "out".to_string())));
    assert!(lines.contains(&(StreamKind::Stderr, "err".to_string())));
}

#[tokio::test]
async fn nonzero_exit_reported() {
    let request = ProcessRequest::shell("exit 7", std::env::temp_dir());
    let cancel = CancellationToken::new();
    let result = run_streaming(request, |_, _| {}, |_| {}, &cancel).await.unwrap();
    assert!(!result.success());
    assert_eq!(result.exit_code, Some(7));
    assert_eq!(result.reported_exit_code(), Some(7));
}

#[tokio::test]
async fn on_spawn_reports_a_live_pid() {
    let pid_slot = Arc::new(Mutex::new(0u32));
    let slot = pid_slot.clone();
    let request = ProcessRequest::shell("sleep 0.1", std::env::temp_dir());
    let cancel = CancellationToken::new();
    let result =
        run_streaming(request, |_, _| {}, move |pid| *slot.lock() = pid, &cancel).await.unwrap();
    assert_eq!(*pid_slot.lock(), result.pid);
    assert_ne!(result.pid, 0);
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let request =
        ProcessRequest::shell("sleep 30", std::env::temp_dir()).timeout(Duration::from_millis(100));
    let cancel = CancellationToken::new();
    let result = run_streaming(request, |_, _| {}, |_| {}, &cancel).await.unwrap();
    assert!(result.timed_out);
    assert!(!result.success());
}

#[tokio::test]
async fn cancellation_kills_the_process() {
    let cancel = CancellationToken::new();
    let canceler = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceler.cancel();
    });
    let request = ProcessRequest::shell("sleep 30", std::env::temp_dir());
    let result = run_streaming(request, |_, _| {}, |_| {}, &cancel).await.unwrap();
    assert!(result.canceled);
    assert!(!result.success());
}

#[tokio::test]
async fn env_and_cwd_are_applied() {
    let dir = tempfile::tempdir().unwrap();
    let (lines, on_line) = collect_lines();
    let request = ProcessRequest::shell("echo \"$MARKER in $PWD\"", dir.path())
        .env(HashMap::from([("MARKER".to_string(), "mk".to_string())]));
    let cancel = CancellationToken::new();
    run_streaming(request, on_line, |_| {}, &cancel).await.unwrap();

    let lines = lines.lock();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].1.starts_with("mk in "));
}

#[test]
fn current_process_is_alive() {
    assert!(is_alive(std::process::id()));
}

#[test]
fn bogus_pid_is_not_alive() {
    // PID near the wrap limit is vanishingly unlikely to exist.
    assert!(!is_alive(4_000_000));
}

#[test]
fn signal_reported_exit_code() {
    let result = ProcessResult {
        pid: 1,
        exit_code: None,
        signal: Some("SIGKILL".to_string()),
        timed_out: false,
        canceled: false,
    };
    assert_eq!(result.reported_exit_code(), Some(137));
}

#[test]
fn subtree_contains_root() {
    let pids = subtree_pids(std::process::id());
    assert!(pids.contains(&std::process::id()));
}
