// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DAG utilities: validation, roots/leaves, reverse edges, topological order.
//!
//! Nodes reference each other by id only (no back-pointers); dependents are
//! always derived from dependencies.

use crate::id::NodeId;
use crate::plan::PlanNode;
use crate::spec::JobSpec;
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

/// Errors detected while validating a job graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DagError {
    #[error("duplicate producer id: {0}")]
    DuplicateProducer(String),
    #[error("job {producer} depends on unknown producer {dependency}")]
    UnknownDependency { producer: String, dependency: String },
    #[error("dependency cycle involving {0}")]
    Cycle(String),
}

/// Validate the dependency graph of a job list: producer ids unique, every
/// referenced dependency exists, and no cycles.
pub fn validate(jobs: &[JobSpec]) -> Result<(), DagError> {
    let mut by_producer: HashMap<&str, &JobSpec> = HashMap::new();
    for job in jobs {
        if by_producer.insert(&job.producer_id, job).is_some() {
            return Err(DagError::DuplicateProducer(job.producer_id.clone()));
        }
    }

    for job in jobs {
        for dep in &job.dependencies {
            if !by_producer.contains_key(dep.as_str()) {
                return Err(DagError::UnknownDependency {
                    producer: job.producer_id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Iterative three-color DFS; recursion depth is attacker-controlled input.
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }
    let mut colors: HashMap<&str, Color> =
        jobs.iter().map(|j| (j.producer_id.as_str(), Color::White)).collect();

    for job in jobs {
        if colors[job.producer_id.as_str()] != Color::White {
            continue;
        }
        let mut stack: Vec<(&str, usize)> = vec![(&job.producer_id, 0)];
        while let Some(&(id, edge)) = stack.last() {
            if edge == 0 {
                colors.insert(id, Color::Gray);
            }
            let deps = &by_producer[id].dependencies;
            if edge < deps.len() {
                if let Some(last) = stack.last_mut() {
                    last.1 += 1;
                }
                let next = deps[edge].as_str();
                match colors[next] {
                    Color::Gray => return Err(DagError::Cycle(next.to_string())),
                    Color::White => stack.push((next, 0)),
                    Color::Black => {}
                }
            } else {
                colors.insert(id, Color::Black);
                stack.pop();
            }
        }
    }

    Ok(())
}

/// Nodes with no dependencies, in the order the map iteration is sorted by
/// spec ordinal.
pub fn roots(nodes: &HashMap<String, PlanNode>) -> Vec<NodeId> {
    let mut out: Vec<&PlanNode> =
        nodes.values().filter(|n| n.dependencies.is_empty()).collect();
    out.sort_by_key(|n| n.ordinal);
    out.iter().map(|n| n.id.clone()).collect()
}

/// Nodes no other node depends on, sorted by spec ordinal.
pub fn leaves(nodes: &HashMap<String, PlanNode>) -> Vec<NodeId> {
    let depended_on: HashSet<&str> = nodes
        .values()
        .flat_map(|n| n.dependencies.iter().map(|d| d.as_str()))
        .collect();
    let mut out: Vec<&PlanNode> =
        nodes.values().filter(|n| !depended_on.contains(n.id.as_str())).collect();
    out.sort_by_key(|n| n.ordinal);
    out.iter().map(|n| n.id.clone()).collect()
}

/// Reverse edges: node id → ids of nodes that depend on it.
pub fn dependents(nodes: &HashMap<String, PlanNode>) -> HashMap<String, Vec<NodeId>> {
    let mut out: HashMap<String, Vec<NodeId>> = HashMap::new();
    let mut ordered: Vec<&PlanNode> = nodes.values().collect();
    ordered.sort_by_key(|n| n.ordinal);
    for node in ordered {
        for dep in &node.dependencies {
            out.entry(dep.to_string()).or_default().push(node.id.clone());
        }
    }
    out
}

/// Kahn topological order over the plan graph.
///
/// Ties are broken by `producer_id` ascending so the order is a stable,
/// documented property other components can rely on (FI source ordering).
pub fn topo_order(nodes: &HashMap<String, PlanNode>) -> Vec<NodeId> {
    let mut in_degree: HashMap<&str, usize> =
        nodes.values().map(|n| (n.id.as_str(), n.dependencies.len())).collect();
    let reverse = dependents(nodes);

    // (producer_id, node_id) keys give the deterministic tie-break for free.
    let mut ready: BTreeSet<(&str, &str)> = nodes
        .values()
        .filter(|n| n.dependencies.is_empty())
        .map(|n| (n.producer_id.as_str(), n.id.as_str()))
        .collect();

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(&(producer, id)) = ready.iter().next() {
        ready.remove(&(producer, id));
        order.push(NodeId::from_string(id));
        if let Some(deps) = reverse.get(id) {
            for dependent in deps {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        if let Some(node) = nodes.get(dependent.as_str()) {
                            ready.insert((node.producer_id.as_str(), node.id.as_str()));
                        }
                    }
                }
            }
        }
    }
    order
}

#[cfg(test)]
#[path = "dag_tests.rs"]
mod tests;
