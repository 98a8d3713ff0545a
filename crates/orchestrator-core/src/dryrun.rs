// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Deterministic, human-readable plan formatter for a `WorkflowDefinition`.

use std::collections::{HashMap, VecDeque};

use colored::Colorize;

use crate::types::{is_terminal, WorkflowDefinition, DONE, FAILED};

/// Render a definition's plan, walking steps in breadth-first order from
/// `initial_step` so step numbers reflect the graph's actual layering.
pub fn format_plan(def: &WorkflowDefinition, styled: bool) -> String {
    let order = bfs_order(def);
    let numbers: HashMap<&str, usize> = order.iter().enumerate().map(|(i, name)| (*name, i + 1)).collect();

    let mut out = String::new();
    let title = format!("Workflow: {}", def.name);
    out.push_str(&heading(&title, styled));
    out.push('\n');
    if let Some(description) = &def.description {
        out.push_str(description);
        out.push('\n');
    }
    out.push('\n');

    for name in &order {
        let step = def.get_step(name).expect("bfs_order only yields defined steps");
        let number = numbers[name];
        out.push_str(&format!("{}. {}\n", number, step_label(name, styled)));

        let mut events: Vec<&String> = step.transitions.keys().collect();
        events.sort();
        if events.is_empty() {
            out.push_str("   (no transitions; this step would stall)\n");
        }
        for event in events {
            let target = &step.transitions[event];
            out.push_str(&format!("   on {} -> {}\n", event, render_target(target, number, &numbers)));
        }
    }

    out
}

fn heading(text: &str, styled: bool) -> String {
    if styled {
        text.bold().to_string()
    } else {
        text.to_string()
    }
}

fn step_label(name: &str, styled: bool) -> String {
    if styled {
        name.cyan().to_string()
    } else {
        name.to_string()
    }
}

fn render_target(target: &str, current_number: usize, numbers: &HashMap<&str, usize>) -> String {
    if target == DONE {
        return "DONE".to_string();
    }
    if target == FAILED {
        return "FAILED".to_string();
    }
    match numbers.get(target) {
        Some(&target_number) if target_number <= current_number => {
            format!("{target} (cycles back to step {target_number})")
        }
        _ => target.to_string(),
    }
}

/// Breadth-first order of step names reachable from `initial_step`, followed by
/// any remaining steps (in definition order) so every step is numbered even if
/// unreachable. Sorted successor iteration guarantees byte-identical output.
fn bfs_order(def: &WorkflowDefinition) -> Vec<&str> {
    let mut order = Vec::new();
    let mut visited = std::collections::HashSet::new();
    let mut queue = VecDeque::new();

    if def.get_step(&def.initial_step).is_some() {
        queue.push_back(def.initial_step.as_str());
        visited.insert(def.initial_step.as_str());
    }

    while let Some(name) = queue.pop_front() {
        order.push(name);
        let step = def.get_step(name).expect("queued names are always defined steps");
        let mut targets: Vec<&str> = step.transitions.values().map(|v| v.as_str()).filter(|t| !is_terminal(t)).collect();
        targets.sort_unstable();
        targets.dedup();
        for target in targets {
            if def.get_step(target).is_some() && visited.insert(target) {
                queue.push_back(target);
            }
        }
    }

    for step in &def.steps {
        if visited.insert(step.name.as_str()) {
            order.push(step.name.as_str());
        }
    }

    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepDefinition, EVENT_FAILURE, EVENT_NEEDS_HUMAN, EVENT_SUCCESS};

    #[test]
    fn plain_output_has_no_escape_bytes() {
        let def = WorkflowDefinition::new("demo", "a").with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));
        let plan = format_plan(&def, false);
        assert!(!plan.contains('\u{1b}'));
    }

    #[test]
    fn styled_output_contains_escape_bytes() {
        let def = WorkflowDefinition::new("demo", "a").with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));
        let plan = format_plan(&def, true);
        assert!(plan.contains('\u{1b}'));
    }

    #[test]
    fn terminals_render_as_done_and_failed() {
        let def = WorkflowDefinition::new("demo", "a")
            .with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE).on(EVENT_FAILURE, FAILED));
        let plan = format_plan(&def, false);
        assert!(plan.contains("-> DONE"));
        assert!(plan.contains("-> FAILED"));
    }

    #[test]
    fn cycle_back_edge_is_annotated() {
        let def = WorkflowDefinition::new("review-fix", "review")
            .with_step(StepDefinition::new("review").on(EVENT_SUCCESS, DONE).on(EVENT_NEEDS_HUMAN, "fix"))
            .with_step(StepDefinition::new("fix").on(EVENT_SUCCESS, "review"));
        let plan = format_plan(&def, false);
        assert!(plan.contains("review (cycles back to step 1)"));
    }

    #[test]
    fn self_loop_cycles_back_to_its_own_number() {
        let def = WorkflowDefinition::new("loopy", "loop").with_step(StepDefinition::new("loop").on(EVENT_SUCCESS, "loop"));
        let plan = format_plan(&def, false);
        assert!(plan.contains("loop (cycles back to step 1)"));
    }

    #[test]
    fn formatting_is_deterministic() {
        let def = WorkflowDefinition::new("demo", "a")
            .with_step(StepDefinition::new("a").on(EVENT_SUCCESS, "b").on(EVENT_FAILURE, FAILED))
            .with_step(StepDefinition::new("b").on(EVENT_SUCCESS, DONE));
        assert_eq!(format_plan(&def, false), format_plan(&def, false));
    }
}
