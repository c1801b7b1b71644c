// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Validator for per-job evidence files produced in worktrees.
//!
//! Jobs may drop `.trellis/evidence/<nodeId>.json` describing what they did.
//! The file must carry `version: 1`, the node id, an RFC3339 timestamp, and
//! a non-empty summary; `type` and `outcome` are optional strings.

use serde::Deserialize;
use std::path::Path;

/// Raw evidence file shape. Unknown fields are tolerated.
#[derive(Debug, Default, Deserialize)]
struct RawEvidence {
    version: Option<u32>,
    #[serde(alias = "nodeId")]
    node_id: Option<String>,
    timestamp: Option<String>,
    summary: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    outcome: Option<String>,
}

/// Result of validating one evidence file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvidenceReport {
    pub valid: bool,
    /// Every deviation found; empty iff `valid`.
    pub reasons: Vec<String>,
    pub summary: Option<String>,
    pub kind: Option<String>,
    pub outcome: Option<String>,
}

impl EvidenceReport {
    fn invalid(reason: impl Into<String>) -> Self {
        Self { valid: false, reasons: vec![reason.into()], ..Self::default() }
    }
}

/// Validate the evidence file for a node. Any deviation from the required
/// shape yields `valid = false`; the report lists every problem found.
pub fn validate_evidence(path: &Path, expected_node_id: &str) -> EvidenceReport {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return EvidenceReport::invalid(format!("unreadable: {e}")),
    };
    let raw: RawEvidence = match serde_json::from_str(&content) {
        Ok(raw) => raw,
        Err(e) => return EvidenceReport::invalid(format!("not a JSON object: {e}")),
    };

    let mut reasons = Vec::new();
    match raw.version {
        Some(1) => {}
        Some(v) => reasons.push(format!("unsupported version {v}")),
        None => reasons.push("missing version".to_string()),
    }
    match raw.node_id.as_deref() {
        Some(id) if id == expected_node_id => {}
        Some(id) => reasons.push(format!("node id mismatch: {id}")),
        None => reasons.push("missing nodeId".to_string()),
    }
    match raw.timestamp.as_deref() {
        Some(ts) => {
            if chrono::DateTime::parse_from_rfc3339(ts).is_err() {
                reasons.push(format!("timestamp not ISO8601: {ts}"));
            }
        }
        None => reasons.push("missing timestamp".to_string()),
    }
    match raw.summary.as_deref() {
        Some(s) if !s.trim().is_empty() => {}
        Some(_) => reasons.push("empty summary".to_string()),
        None => reasons.push("missing summary".to_string()),
    }

    EvidenceReport {
        valid: reasons.is_empty(),
        reasons,
        summary: raw.summary,
        kind: raw.kind,
        outcome: raw.outcome,
    }
}

#[cfg(test)]
#[path = "evidence_tests.rs"]
mod tests;
