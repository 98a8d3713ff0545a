// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! The four canonical workflow graphs shipped with the system. These are data,
//! not code paths: handler behaviour lives in `handlers`.

use crate::types::{StepDefinition, WorkflowDefinition, DONE, EVENT_NEEDS_HUMAN, EVENT_PARTIAL, EVENT_SUCCESS};

/// A single step that runs a task/phase implementation loop.
pub fn implement() -> WorkflowDefinition {
    WorkflowDefinition::new("implement", "implement")
        .with_description("Run a single implementation step for a task or phase")
        .with_step(StepDefinition::new("implement").on(EVENT_SUCCESS, DONE).on("failure", "__failed__"))
}

/// Linear chain with a review/fix cycle: implement, review, branch on the
/// review outcome, loop back through fix until the review passes, then open a PR.
pub fn implement_review_pr() -> WorkflowDefinition {
    WorkflowDefinition::new("implement-review-pr", "implement")
        .with_description("Implement a change, review it, loop on fixes, then open a PR")
        .with_step(StepDefinition::new("implement").on(EVENT_SUCCESS, "review").on("failure", "__failed__"))
        .with_step(StepDefinition::new("review").on(EVENT_SUCCESS, "check_review").on("failure", "__failed__"))
        .with_step(
            StepDefinition::new("check_review")
                .on(EVENT_SUCCESS, "create_pr")
                .on(EVENT_NEEDS_HUMAN, "run_fix")
                .on("failure", "__failed__"),
        )
        .with_step(StepDefinition::new("run_fix").on(EVENT_SUCCESS, "review").on("failure", "__failed__"))
        .with_step(StepDefinition::new("create_pr").on(EVENT_SUCCESS, DONE).on("failure", "__failed__"))
}

/// Outer loop over project phases: initialise a phase, run its inner workflow,
/// then decide whether to advance to the next phase or stop.
pub fn pipeline() -> WorkflowDefinition {
    WorkflowDefinition::new("pipeline", "init_phase")
        .with_description("Drive a multi-phase project pipeline to completion")
        .with_step(StepDefinition::new("init_phase").on(EVENT_SUCCESS, "run_phase_workflow").on("failure", "__failed__"))
        .with_step(StepDefinition::new("run_phase_workflow").on(EVENT_SUCCESS, "advance_phase").on("failure", "__failed__"))
        .with_step(
            StepDefinition::new("advance_phase")
                .on(EVENT_SUCCESS, DONE)
                .on(EVENT_PARTIAL, "init_phase")
                .on("failure", "__failed__"),
        )
}

/// Three-step PRD decomposition pipeline: shred the document, scatter the
/// resulting tasks, gather the results.
pub fn prd_decompose() -> WorkflowDefinition {
    WorkflowDefinition::new("prd-decompose", "shred")
        .with_description("Decompose a PRD into tasks and gather the results")
        .with_step(StepDefinition::new("shred").on(EVENT_SUCCESS, "scatter").on("failure", "__failed__"))
        .with_step(StepDefinition::new("scatter").on(EVENT_SUCCESS, "gather").on("failure", "__failed__"))
        .with_step(StepDefinition::new("gather").on(EVENT_SUCCESS, DONE).on("failure", "__failed__"))
}

/// Look up a built-in workflow definition by name.
pub fn builtin(name: &str) -> Option<WorkflowDefinition> {
    match name {
        "implement" => Some(implement()),
        "implement-review-pr" => Some(implement_review_pr()),
        "pipeline" => Some(pipeline()),
        "prd-decompose" => Some(prd_decompose()),
        _ => None,
    }
}

/// Names of all built-in workflows, in the order they are documented.
pub fn builtin_names() -> &'static [&'static str] {
    &["implement", "implement-review-pr", "pipeline", "prd-decompose"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator;

    #[test]
    fn every_builtin_workflow_validates_cleanly() {
        for name in builtin_names() {
            let def = builtin(name).unwrap();
            let report = validator::validate(&def, None);
            assert!(report.is_valid(), "{name} should validate: {report}");
        }
    }

    #[test]
    fn implement_review_pr_has_the_documented_review_fix_cycle() {
        let def = implement_review_pr();
        let report = validator::validate(&def, None);
        assert!(report.findings.iter().any(|f| f.code == "CYCLE_DETECTED"));
    }

    #[test]
    fn pipeline_advance_phase_branches_on_success_and_partial() {
        let def = pipeline();
        let advance = def.get_step("advance_phase").unwrap();
        assert_eq!(advance.transitions[EVENT_SUCCESS], DONE);
        assert_eq!(advance.transitions[EVENT_PARTIAL], "init_phase");
    }

    #[test]
    fn unknown_builtin_name_is_none() {
        assert!(builtin("does-not-exist").is_none());
    }
}
