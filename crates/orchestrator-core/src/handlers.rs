// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Handler skeletons for the steps named by the four built-in workflows.
//!
//! Real behaviour — actually shelling out to an agent process, running a
//! review, creating a PR — is an external collaborator reached only through
//! these narrow traits. None are implemented here; a handler without its
//! dependency wired returns `failure` with a descriptive error so it can be
//! registered before the rest of the system is ready.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::registry::StepHandler;
use crate::state::WorkflowState;

/// Runs a single task or phase implementation loop, driving an external agent.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
}

/// Produces a review verdict for the current change, writing its outcome into
/// the run's metadata bag for `check_review` to branch on.
#[async_trait]
pub trait ReviewOrchestrator: Send + Sync {
    async fn review(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
}

/// Applies fixes in response to review feedback.
#[async_trait]
pub trait FixEngine: Send + Sync {
    async fn fix(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
}

/// Opens a pull request for the finished change.
#[async_trait]
pub trait PrCreator: Send + Sync {
    async fn create_pr(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
}

/// Drives one phase of a multi-phase project pipeline end to end.
#[async_trait]
pub trait PhaseRunner: Send + Sync {
    async fn init_phase(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
    async fn run_phase_workflow(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
    async fn advance_phase(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
}

/// The PRD decomposition subsystem: shreds a document into tasks, scatters
/// them for parallel work, and gathers the results.
#[async_trait]
pub trait PrdDecomposer: Send + Sync {
    async fn shred(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
    async fn scatter(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
    async fn gather(&self, state: &mut WorkflowState) -> Result<String, anyhow::Error>;
}

fn unwired(step: &str, dependency: &str) -> anyhow::Error {
    anyhow::anyhow!("no {dependency} configured for step '{step}'; register one before running this workflow")
}

/// Metadata key `review` writes the review verdict into, for `check_review`
/// to branch on without re-running the review itself.
pub const METADATA_REVIEW_PASSED: &str = "review_passed";

pub struct ImplementHandler {
    runner: Option<Arc<dyn TaskRunner>>,
}

impl ImplementHandler {
    pub fn new() -> Self {
        Self { runner: None }
    }

    pub fn with_runner(mut self, runner: Arc<dyn TaskRunner>) -> Self {
        self.runner = Some(runner);
        self
    }
}

impl Default for ImplementHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepHandler for ImplementHandler {
    fn name(&self) -> &str {
        "implement"
    }

    async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
        match &self.runner {
            Some(runner) => runner.run(state).await,
            None => Err(unwired("implement", "a TaskRunner")),
        }
    }

    fn dry_run(&self, _state: &WorkflowState) -> String {
        "run the task/phase implementation loop".to_string()
    }
}

pub struct ReviewHandler {
    orchestrator: Option<Arc<dyn ReviewOrchestrator>>,
}

impl ReviewHandler {
    pub fn new() -> Self {
        Self { orchestrator: None }
    }

    pub fn with_orchestrator(mut self, orchestrator: Arc<dyn ReviewOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }
}

impl Default for ReviewHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepHandler for ReviewHandler {
    fn name(&self) -> &str {
        "review"
    }

    async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
        match &self.orchestrator {
            Some(orchestrator) => orchestrator.review(state).await,
            None => Err(unwired("review", "a ReviewOrchestrator")),
        }
    }

    fn dry_run(&self, _state: &WorkflowState) -> String {
        "review the current change".to_string()
    }
}

/// Branches on the verdict `review` left in the metadata bag. Has no external
/// dependency of its own — it is pure logic over `WorkflowState`.
pub struct CheckReviewHandler;

impl CheckReviewHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CheckReviewHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepHandler for CheckReviewHandler {
    fn name(&self) -> &str {
        "check_review"
    }

    async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
        match state.metadata_bool(METADATA_REVIEW_PASSED) {
            Some(true) => Ok(crate::types::EVENT_SUCCESS.to_string()),
            Some(false) => Ok(crate::types::EVENT_NEEDS_HUMAN.to_string()),
            None => Err(anyhow::anyhow!(
                "no '{METADATA_REVIEW_PASSED}' metadata set; the 'review' step must run before 'check_review'"
            )),
        }
    }

    fn dry_run(&self, state: &WorkflowState) -> String {
        match state.metadata_bool(METADATA_REVIEW_PASSED) {
            Some(true) => "branch to create_pr (review already recorded as passing)".to_string(),
            Some(false) => "branch to run_fix (review already recorded as needing changes)".to_string(),
            None => "branch on the pending review's verdict".to_string(),
        }
    }
}

pub struct RunFixHandler {
    engine: Option<Arc<dyn FixEngine>>,
}

impl RunFixHandler {
    pub fn new() -> Self {
        Self { engine: None }
    }

    pub fn with_engine(mut self, engine: Arc<dyn FixEngine>) -> Self {
        self.engine = Some(engine);
        self
    }
}

impl Default for RunFixHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepHandler for RunFixHandler {
    fn name(&self) -> &str {
        "run_fix"
    }

    async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
        match &self.engine {
            Some(engine) => engine.fix(state).await,
            None => Err(unwired("run_fix", "a FixEngine")),
        }
    }

    fn dry_run(&self, _state: &WorkflowState) -> String {
        "apply fixes for the outstanding review feedback".to_string()
    }
}

pub struct CreatePrHandler {
    creator: Option<Arc<dyn PrCreator>>,
}

impl CreatePrHandler {
    pub fn new() -> Self {
        Self { creator: None }
    }

    pub fn with_creator(mut self, creator: Arc<dyn PrCreator>) -> Self {
        self.creator = Some(creator);
        self
    }
}

impl Default for CreatePrHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepHandler for CreatePrHandler {
    fn name(&self) -> &str {
        "create_pr"
    }

    async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
        match &self.creator {
            Some(creator) => creator.create_pr(state).await,
            None => Err(unwired("create_pr", "a PrCreator")),
        }
    }

    fn dry_run(&self, _state: &WorkflowState) -> String {
        "open a pull request for the finished change".to_string()
    }
}

macro_rules! phase_step_handler {
    ($struct_name:ident, $step_name:literal, $method:ident, $description:literal) => {
        pub struct $struct_name {
            runner: Option<Arc<dyn PhaseRunner>>,
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self { runner: None }
            }

            pub fn with_runner(mut self, runner: Arc<dyn PhaseRunner>) -> Self {
                self.runner = Some(runner);
                self
            }
        }

        impl Default for $struct_name {
            fn default() -> Self {
                Self::new()
            }
        }

        #[async_trait]
        impl StepHandler for $struct_name {
            fn name(&self) -> &str {
                $step_name
            }

            async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
                match &self.runner {
                    Some(runner) => runner.$method(state).await,
                    None => Err(unwired($step_name, "a PhaseRunner")),
                }
            }

            fn dry_run(&self, _state: &WorkflowState) -> String {
                $description.to_string()
            }
        }
    };
}

phase_step_handler!(InitPhaseHandler, "init_phase", init_phase, "initialise the next project phase");
phase_step_handler!(RunPhaseWorkflowHandler, "run_phase_workflow", run_phase_workflow, "run the current phase's inner workflow");
phase_step_handler!(AdvancePhaseHandler, "advance_phase", advance_phase, "decide whether another phase remains");

macro_rules! prd_step_handler {
    ($struct_name:ident, $step_name:literal, $method:ident, $description:literal) => {
        pub struct $struct_name {
            decomposer: Option<Arc<dyn PrdDecomposer>>,
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self { decomposer: None }
            }

            pub fn with_decomposer(mut self, decomposer: Arc<dyn PrdDecomposer>) -> Self {
                self.decomposer = Some(decomposer);
                self
            }
        }

        impl Default for $struct_name {
            fn default() -> Self {
                Self::new()
            }
        }

        #[async_trait]
        impl StepHandler for $struct_name {
            fn name(&self) -> &str {
                $step_name
            }

            async fn execute(&self, _cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error> {
                match &self.decomposer {
                    Some(decomposer) => decomposer.$method(state).await,
                    None => Err(unwired($step_name, "a PrdDecomposer")),
                }
            }

            fn dry_run(&self, _state: &WorkflowState) -> String {
                $description.to_string()
            }
        }
    };
}

prd_step_handler!(ShredHandler, "shred", shred, "shred the PRD into candidate tasks");
prd_step_handler!(ScatterHandler, "scatter", scatter, "scatter tasks for parallel work");
prd_step_handler!(GatherHandler, "gather", gather, "gather completed task results");
