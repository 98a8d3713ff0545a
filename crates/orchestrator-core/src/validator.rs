// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Static structural validation of a `WorkflowDefinition`.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::Registry;
use crate::types::{is_terminal, WorkflowDefinition};

/// Severity of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// A single validation finding with a stable, documented code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
}

impl Finding {
    fn error(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, severity: Severity::Error, message: message.into() }
    }

    fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self { code, severity: Severity::Warning, message: message.into() }
    }
}

/// The full set of findings produced by validating a definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.findings.iter().any(|f| f.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.findings.is_empty() {
            return write!(f, "no findings");
        }
        let parts: Vec<String> = self.findings.iter().map(|finding| format!("[{}] {}", finding.code, finding.message)).collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Validate a `WorkflowDefinition`, optionally checking handler presence against
/// a `Registry`. Deterministic: identical input always produces identical, byte
/// for byte identical (once serialised) output.
pub fn validate(def: &WorkflowDefinition, registry: Option<&Registry>) -> ValidationReport {
    let mut findings = Vec::new();

    if def.steps.is_empty() {
        findings.push(Finding::error("NO_STEPS", "workflow definition has no steps"));
        return ValidationReport { findings };
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    let mut duplicate_names: HashSet<&str> = HashSet::new();
    for (index, step) in def.steps.iter().enumerate() {
        if step.name.is_empty() {
            findings.push(Finding::error("EMPTY_STEP_NAME", format!("step at index {index} has an empty name")));
            continue;
        }
        if !seen_names.insert(step.name.as_str()) {
            duplicate_names.insert(step.name.as_str());
        }
    }
    for name in sorted(&duplicate_names) {
        findings.push(Finding::error("DUPLICATE_STEP_NAME", format!("step name '{name}' appears more than once")));
    }

    let step_names: HashSet<&str> = def.steps.iter().map(|s| s.name.as_str()).collect();

    if def.initial_step.is_empty() || !step_names.contains(def.initial_step.as_str()) {
        findings.push(Finding::error(
            "MISSING_INITIAL_STEP",
            format!("initial_step '{}' is not a defined step", def.initial_step),
        ));
    }

    for step in &def.steps {
        let mut targets: Vec<&str> = step.transitions.values().map(|v| v.as_str()).collect();
        targets.sort_unstable();
        for target in targets {
            if !is_terminal(target) && !step_names.contains(target) {
                findings.push(Finding::error(
                    "INVALID_TRANSITION_TARGET",
                    format!("step '{}' transitions to undefined step '{}'", step.name, target),
                ));
            }
        }
    }

    if let Some(registry) = registry {
        for step in &def.steps {
            if !registry.has(&step.name) {
                findings.push(Finding::error("MISSING_HANDLER", format!("step '{}' has no registered handler", step.name)));
            }
        }
    }

    // Unreachable steps: BFS from initial_step over the transition graph.
    if step_names.contains(def.initial_step.as_str()) {
        let reachable = reachable_from(def, &def.initial_step);
        let mut unreachable: Vec<&str> = def
            .steps
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| !reachable.contains(*name))
            .collect();
        unreachable.sort_unstable();
        for name in unreachable {
            findings.push(Finding::warning("UNREACHABLE_STEP", format!("step '{name}' is not reachable from '{}'", def.initial_step)));
        }
    }

    // Cycle detection: three-colour DFS, reported as warnings with the cycle path.
    for cycle in detect_cycles(def) {
        findings.push(Finding::warning("CYCLE_DETECTED", format!("cycle detected: {}", cycle.join(" -> "))));
    }

    // Stalling steps: non-terminal steps with no outgoing transitions at all.
    let mut no_transitions: Vec<&str> = def
        .steps
        .iter()
        .filter(|s| s.transitions.is_empty())
        .map(|s| s.name.as_str())
        .collect();
    no_transitions.sort_unstable();
    for name in no_transitions {
        findings.push(Finding::warning("NO_TRANSITIONS", format!("step '{name}' has no outgoing transitions and would stall")));
    }

    ValidationReport { findings }
}

fn sorted<'a>(set: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut v: Vec<&str> = set.iter().copied().collect();
    v.sort_unstable();
    v
}

fn adjacency(def: &WorkflowDefinition) -> HashMap<&str, Vec<&str>> {
    let mut adj: HashMap<&str, Vec<&str>> = HashMap::new();
    for step in &def.steps {
        let mut targets: Vec<&str> = step
            .transitions
            .values()
            .map(|v| v.as_str())
            .filter(|target| !is_terminal(target))
            .collect();
        targets.sort_unstable();
        targets.dedup();
        adj.insert(step.name.as_str(), targets);
    }
    adj
}

fn reachable_from<'a>(def: &'a WorkflowDefinition, start: &str) -> HashSet<&'a str> {
    let adj = adjacency(def);
    let mut visited: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    if let Some(step) = def.steps.iter().find(|s| s.name == start) {
        queue.push_back(step.name.as_str());
        visited.insert(step.name.as_str());
    }
    while let Some(node) = queue.pop_front() {
        if let Some(targets) = adj.get(node) {
            for &target in targets {
                if visited.insert(target) {
                    queue.push_back(target);
                }
            }
        }
    }
    visited
}

/// Three-colour DFS cycle detection. Returns the node sequence of each distinct
/// cycle discovered, in path order, sorted by the name of the step at which the
/// cycle was first detected for determinism.
fn detect_cycles<'a>(def: &'a WorkflowDefinition) -> Vec<Vec<&'a str>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let adj = adjacency(def);
    let mut color: HashMap<&str, Color> = def.steps.iter().map(|s| (s.name.as_str(), Color::White)).collect();
    let mut cycles: Vec<Vec<&str>> = Vec::new();
    let mut path: Vec<&str> = Vec::new();

    let mut names: Vec<&str> = def.steps.iter().map(|s| s.name.as_str()).collect();
    names.sort_unstable();

    fn visit<'a>(
        node: &'a str,
        adj: &HashMap<&'a str, Vec<&'a str>>,
        color: &mut HashMap<&'a str, Color>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<&'a str>>,
    ) {
        color.insert(node, Color::Gray);
        path.push(node);
        if let Some(targets) = adj.get(node) {
            for &target in targets {
                match color.get(target).copied().unwrap_or(Color::White) {
                    Color::White => visit(target, adj, color, path, cycles),
                    Color::Gray => {
                        let start = path.iter().position(|&n| n == target).unwrap_or(0);
                        let mut cycle: Vec<&str> = path[start..].to_vec();
                        cycle.push(target);
                        cycles.push(cycle);
                    }
                    Color::Black => {}
                }
            }
        }
        path.pop();
        color.insert(node, Color::Black);
    }

    for name in names {
        if color.get(name).copied() == Some(Color::White) {
            visit(name, &adj, &mut color, &mut path, &mut cycles);
        }
    }

    cycles
}
