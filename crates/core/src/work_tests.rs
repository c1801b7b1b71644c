// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn bare_string_becomes_shell() {
    let spec = WorkSpec::normalize("cargo test --workspace").unwrap();
    assert_eq!(spec, WorkSpec::shell("cargo test --workspace"));
}

#[test]
fn agent_prefix_becomes_agent() {
    let spec = WorkSpec::normalize("@agent fix the failing build").unwrap();
    match spec {
        WorkSpec::Agent { instructions, resume_session, .. } => {
            assert_eq!(instructions, "fix the failing build");
            assert!(!resume_session);
        }
        other => panic!("expected agent, got {other:?}"),
    }
}

#[test]
fn json_object_is_parsed() {
    let spec = WorkSpec::normalize(r#"{"type": "shell", "command": "make"}"#).unwrap();
    assert_eq!(spec, WorkSpec::shell("make"));
}

#[test]
fn json_object_accepts_camel_case_keys() {
    let spec = WorkSpec::normalize(
        r#"{"type": "agent", "instructions": "do it", "allowedFolders": ["/tmp/x"], "modelTier": "premium"}"#,
    )
    .unwrap();
    match spec {
        WorkSpec::Agent { allowed_folders, model_tier, .. } => {
            assert_eq!(allowed_folders, vec![PathBuf::from("/tmp/x")]);
            assert_eq!(model_tier.as_deref(), Some("premium"));
        }
        other => panic!("expected agent, got {other:?}"),
    }
}

#[test]
fn malformed_json_is_an_error() {
    assert!(WorkSpec::normalize(r#"{"type": "shell""#).is_err());
}

#[test]
fn process_spec_roundtrip() {
    let spec = WorkSpec::Process {
        executable: "node".into(),
        args: vec!["build.js".into()],
        env: HashMap::from([("CI".to_string(), "1".to_string())]),
        cwd: Some(PathBuf::from("/repo")),
        timeout_ms: Some(30_000),
    };
    let json = serde_json::to_string(&spec).unwrap();
    let parsed: WorkSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, spec);
}

#[parameterized(
    blank_shell = { WorkSpec::shell("   "), true },
    real_shell = { WorkSpec::shell("true"), false },
    blank_agent = { WorkSpec::agent(""), true },
    real_agent = { WorkSpec::agent("fix it"), false },
)]
fn noop_detection(spec: WorkSpec, expected: bool) {
    assert_eq!(spec.is_noop(), expected);
}

#[test]
fn on_failure_accepts_legacy_keys() {
    let json = r#"{"forceFail": true, "noAutoHeal": true, "resumeFromPhase": "work"}"#;
    let on_failure: OnFailure = serde_json::from_str(json).unwrap();
    assert!(on_failure.force_fail);
    assert!(on_failure.no_auto_heal);
    assert_eq!(on_failure.resume_from_phase, Some(ExecutionPhase::Work));
}
