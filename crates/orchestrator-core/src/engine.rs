// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! The execution loop: the sole place real behaviour lives in this crate.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::EngineError;
use crate::registry::Registry;
use crate::state::WorkflowState;
use crate::store::StateStore;
use crate::types::{LifecycleEventType, StepRecord, WorkflowDefinition, WorkflowEvent, DONE, EVENT_FAILURE, FAILED};
use crate::validator;

/// A non-blocking destination for lifecycle events. The engine never waits on a
/// sink: a full or absent sink simply drops the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: WorkflowEvent);
}

/// An `EventSink` backed by a bounded `mpsc` channel. Sends via `try_send`, so a
/// slow consumer loses events rather than stalling the run.
pub struct ChannelEventSink(mpsc::Sender<WorkflowEvent>);

impl ChannelEventSink {
    pub fn new(sender: mpsc::Sender<WorkflowEvent>) -> Self {
        Self(sender)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: WorkflowEvent) {
        let _ = self.0.try_send(event);
    }
}

/// A hook invoked after every step transition, with the already-mutated state.
/// Hook failures are logged, never surfaced — checkpoint failure degrades
/// durability, not liveness.
#[async_trait]
pub trait PostStepHook: Send + Sync {
    async fn on_step(&self, state: &WorkflowState);
}

struct CheckpointHook {
    store: Arc<dyn StateStore>,
}

#[async_trait]
impl PostStepHook for CheckpointHook {
    async fn on_step(&self, state: &WorkflowState) {
        if let Err(err) = self.store.save(state).await {
            warn!(run_id = %state.id, error = %err, "checkpoint save failed; continuing without durability");
        }
    }
}

/// Default cap on loop iterations per `run`, guarding against a misdesigned cycle.
pub const DEFAULT_MAX_ITERATIONS: u32 = 1000;

/// The workflow execution engine: resolves transitions, calls handlers, emits
/// lifecycle events, and checkpoints state. Sequential per run by construction.
pub struct Engine {
    registry: Registry,
    sink: Option<Arc<dyn EventSink>>,
    hooks: Vec<Arc<dyn PostStepHook>>,
    dry_run: bool,
    single_step: Option<String>,
    max_iterations: u32,
}

impl Engine {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            sink: None,
            hooks: Vec::new(),
            dry_run: false,
            single_step: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_single_step(mut self, step: impl Into<String>) -> Self {
        self.single_step = Some(step.into());
        self
    }

    pub fn with_max_iterations(mut self, cap: u32) -> Self {
        self.max_iterations = cap;
        self
    }

    pub fn with_post_step_hook(mut self, hook: Arc<dyn PostStepHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Register a post-step hook that saves the mutated state to `store` after
    /// every transition. Hook errors are logged, never returned.
    pub fn with_checkpointing(self, store: Arc<dyn StateStore>) -> Self {
        self.with_post_step_hook(Arc::new(CheckpointHook { store }))
    }

    /// Errors from validating `def` against this engine's registry: unresolvable
    /// initial step, missing handlers, invalid transition targets. Distinct from
    /// the standalone `validator::validate`, which also reports warnings.
    pub fn validate(&self, def: &WorkflowDefinition) -> Vec<String> {
        validator::validate(def, Some(&self.registry)).errors().map(|f| f.message.clone()).collect()
    }

    fn emit(&self, event: WorkflowEvent) {
        match event.event_type {
            LifecycleEventType::WorkflowStarted
            | LifecycleEventType::WorkflowResumed
            | LifecycleEventType::WorkflowCompleted
            | LifecycleEventType::WorkflowFailed => {
                info!(workflow_id = %event.workflow_id, step = %event.step, event = %event.event, "{}", event.message);
            }
            _ => {
                debug!(workflow_id = %event.workflow_id, step = %event.step, event = %event.event, "{}", event.message);
            }
        }
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    /// Drive `def` from `state` (or a fresh start if `state` is `None`) to a
    /// terminal step, cancellation, or the iteration cap.
    #[instrument(skip_all, fields(workflow = %def.name))]
    pub async fn run(
        &self,
        cancel: CancellationToken,
        def: &WorkflowDefinition,
        state: Option<WorkflowState>,
    ) -> Result<WorkflowState, EngineError> {
        let report = validator::validate(def, Some(&self.registry));
        if !report.is_valid() {
            return Err(EngineError::Validation(report));
        }

        let mut state = match state {
            Some(mut s) => {
                if s.id.is_empty() {
                    s.id = uuid::Uuid::new_v4().to_string();
                }
                s
            }
            None => WorkflowState::new(def.name.clone(), def.initial_step.clone()),
        };

        let resuming = !state.step_history.is_empty();
        let lifecycle_kind = if resuming { LifecycleEventType::WorkflowResumed } else { LifecycleEventType::WorkflowStarted };
        let lifecycle_message = if resuming { "resuming workflow run" } else { "starting workflow run" };
        self.emit(WorkflowEvent::new(lifecycle_kind, state.id.clone(), lifecycle_message).with_step(state.current_step.clone()));

        if let Some(single) = &self.single_step {
            state.current_step = single.clone();
        }

        for _ in 0..self.max_iterations {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled { step: state.current_step.clone() });
            }

            let step_name = state.current_step.clone();
            let step_def = def.get_step(&step_name).ok_or_else(|| EngineError::UnknownStep(step_name.clone()))?;
            let handler = self.registry.get(&step_def.name)?;

            self.emit(WorkflowEvent::new(LifecycleEventType::StepStarted, state.id.clone(), format!("starting step '{step_name}'")).with_step(step_name.clone()));

            let started_at = Utc::now();
            let clock = Instant::now();

            enum Outcome {
                Success(String),
                Error(String),
                Panic(String),
            }

            let outcome = if self.dry_run {
                let description = handler.dry_run(&state);
                self.emit(
                    WorkflowEvent::new(LifecycleEventType::StepSkipped, state.id.clone(), description)
                        .with_step(step_name.clone())
                        .with_event("success"),
                );
                Outcome::Success("success".to_string())
            } else {
                match AssertUnwindSafe(handler.execute(cancel.clone(), &mut state)).catch_unwind().await {
                    Ok(Ok(event)) => Outcome::Success(event),
                    Ok(Err(err)) => Outcome::Error(err.to_string()),
                    Err(payload) => Outcome::Panic(panic_message(payload)),
                }
            };

            let duration_nanos = clock.elapsed().as_nanos() as u64;
            let (event, error) = match &outcome {
                Outcome::Success(event) => (event.clone(), None),
                Outcome::Error(message) => (EVENT_FAILURE.to_string(), Some(message.clone())),
                Outcome::Panic(message) => (EVENT_FAILURE.to_string(), Some(message.clone())),
            };
            state.record_step(StepRecord {
                step: step_name.clone(),
                event: event.clone(),
                started_at,
                duration_nanos,
                error: error.clone(),
            });

            if let Some(error_message) = error {
                self.emit(
                    WorkflowEvent::new(LifecycleEventType::StepFailed, state.id.clone(), format!("step '{step_name}' failed"))
                        .with_step(step_name.clone())
                        .with_event(event.clone())
                        .with_error(error_message.clone()),
                );
                match step_def.transitions.get(EVENT_FAILURE) {
                    Some(target) => state.advance_to(target.clone()),
                    None => {
                        return match outcome {
                            Outcome::Panic(_) => Err(EngineError::Panic { step: step_name, payload: error_message }),
                            _ => Err(EngineError::Execution { step: step_name, source: anyhow::anyhow!(error_message) }),
                        };
                    }
                }
            } else {
                self.emit(
                    WorkflowEvent::new(LifecycleEventType::StepCompleted, state.id.clone(), format!("step '{step_name}' completed"))
                        .with_step(step_name.clone())
                        .with_event(event.clone()),
                );
                match step_def.transitions.get(&event) {
                    Some(target) => state.advance_to(target.clone()),
                    None => return Err(EngineError::NoTransition { step: step_name, event }),
                }
            }

            for hook in &self.hooks {
                hook.on_step(&state).await;
            }

            if state.current_step == DONE {
                self.emit(WorkflowEvent::new(LifecycleEventType::WorkflowCompleted, state.id.clone(), "workflow completed"));
                return Ok(state);
            }
            if state.current_step == FAILED {
                self.emit(WorkflowEvent::new(LifecycleEventType::WorkflowFailed, state.id.clone(), "workflow reached terminal failure"));
                return Err(EngineError::TerminalFailure);
            }
            if self.single_step.is_some() {
                return Ok(state);
            }
        }

        Err(EngineError::IterationCapExceeded { cap: self.max_iterations })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StepHandler;
    use crate::types::{StepDefinition, DONE, EVENT_SUCCESS, FAILED};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FnHandler<F: Fn() -> Result<String, anyhow::Error> + Send + Sync> {
        name: String,
        calls: Arc<AtomicUsize>,
        outcome: F,
    }

    #[async_trait]
    impl<F: Fn() -> Result<String, anyhow::Error> + Send + Sync> StepHandler for FnHandler<F> {
        fn name(&self) -> &str {
            &self.name
        }

        async fn execute(&self, _cancel: CancellationToken, _state: &mut WorkflowState) -> Result<String, anyhow::Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.outcome)()
        }

        fn dry_run(&self, _state: &WorkflowState) -> String {
            format!("would run {}", self.name)
        }
    }

    fn always(name: &str, event: &'static str) -> (Arc<FnHandler<impl Fn() -> Result<String, anyhow::Error> + Send + Sync>>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let handler = Arc::new(FnHandler { name: name.to_string(), calls: calls.clone(), outcome: move || Ok(event.to_string()) });
        (handler, calls)
    }

    fn linear_def() -> WorkflowDefinition {
        WorkflowDefinition::new("linear", "a")
            .with_step(StepDefinition::new("a").on(EVENT_SUCCESS, "b"))
            .with_step(StepDefinition::new("b").on(EVENT_SUCCESS, "c"))
            .with_step(StepDefinition::new("c").on(EVENT_SUCCESS, DONE))
    }

    #[tokio::test]
    async fn three_step_linear_completes_in_order() {
        let mut registry = Registry::new();
        let (a, _) = always("a", EVENT_SUCCESS);
        let (b, _) = always("b", EVENT_SUCCESS);
        let (c, _) = always("c", EVENT_SUCCESS);
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        registry.register(c).unwrap();

        let engine = Engine::new(registry);
        let result = engine.run(CancellationToken::new(), &linear_def(), None).await.unwrap();

        assert_eq!(result.current_step, DONE);
        assert_eq!(result.step_history.len(), 3);
        let order: Vec<&str> = result.step_history.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn failure_with_no_recovery_surfaces_the_error() {
        let mut registry = Registry::new();
        let failing = Arc::new(FnHandler {
            name: "a".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            outcome: || Err(anyhow::anyhow!("boom")),
        });
        registry.register(failing).unwrap();

        let def = WorkflowDefinition::new("f", "a").with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));
        let engine = Engine::new(registry);
        let err = engine.run(CancellationToken::new(), &def, None).await.unwrap_err();
        assert!(err.to_string().contains('a'));
        assert!(matches!(err, EngineError::Execution { .. }));
    }

    #[tokio::test]
    async fn failure_with_recovery_transitions_to_cleanup() {
        let mut registry = Registry::new();
        let failing = Arc::new(FnHandler {
            name: "a".to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
            outcome: || Err(anyhow::anyhow!("boom")),
        });
        let (cleanup, _) = always("cleanup", EVENT_SUCCESS);
        registry.register(failing).unwrap();
        registry.register(cleanup).unwrap();

        let def = WorkflowDefinition::new("f", "a")
            .with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE).on(crate::types::EVENT_FAILURE, "cleanup"))
            .with_step(StepDefinition::new("cleanup").on(EVENT_SUCCESS, DONE));

        let engine = Engine::new(registry);
        let result = engine.run(CancellationToken::new(), &def, None).await.unwrap();
        assert_eq!(result.current_step, DONE);
        let steps: Vec<&str> = result.step_history.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(steps, vec!["a", "cleanup"]);
        assert!(result.step_history[0].error.is_some());
    }

    #[tokio::test]
    async fn handler_panic_is_captured_as_an_error() {
        struct Panicker;
        #[async_trait]
        impl StepHandler for Panicker {
            fn name(&self) -> &str {
                "a"
            }
            async fn execute(&self, _cancel: CancellationToken, _state: &mut WorkflowState) -> Result<String, anyhow::Error> {
                panic!("handler exploded");
            }
            fn dry_run(&self, _state: &WorkflowState) -> String {
                "would panic".to_string()
            }
        }

        let mut registry = Registry::new();
        registry.register(Arc::new(Panicker)).unwrap();
        let def = WorkflowDefinition::new("p", "a").with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));
        let engine = Engine::new(registry);
        let err = engine.run(CancellationToken::new(), &def, None).await.unwrap_err();
        assert!(err.to_string().contains("handler exploded"));
        assert!(matches!(err, EngineError::Panic { .. }));
    }

    #[tokio::test]
    async fn resume_skips_already_completed_steps() {
        let mut registry = Registry::new();
        let (a, a_calls) = always("a", EVENT_SUCCESS);
        let (b, b_calls) = always("b", EVENT_SUCCESS);
        let (c, c_calls) = always("c", EVENT_SUCCESS);
        registry.register(a).unwrap();
        registry.register(b).unwrap();
        registry.register(c).unwrap();

        let mut state = WorkflowState::new("linear", "b");
        state.record_step(StepRecord { step: "a".into(), event: EVENT_SUCCESS.into(), started_at: Utc::now(), duration_nanos: 1, error: None });

        let engine = Engine::new(registry);
        let result = engine.run(CancellationToken::new(), &linear_def(), Some(state)).await.unwrap();

        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(c_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.step_history.len(), 3);
    }

    #[tokio::test]
    async fn iteration_cap_is_enforced_on_a_self_cycle() {
        let mut registry = Registry::new();
        let (looper, calls) = always("loop", EVENT_SUCCESS);
        registry.register(looper).unwrap();
        let def = WorkflowDefinition::new("loopy", "loop").with_step(StepDefinition::new("loop").on(EVENT_SUCCESS, "loop"));

        let engine = Engine::new(registry).with_max_iterations(5);
        let err = engine.run(CancellationToken::new(), &def, None).await.unwrap_err();
        assert!(matches!(err, EngineError::IterationCapExceeded { cap: 5 }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_next_step() {
        let mut registry = Registry::new();
        let (a, a_calls) = always("a", EVENT_SUCCESS);
        registry.register(a).unwrap();
        let def = WorkflowDefinition::new("c", "a").with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = Engine::new(registry);
        let err = engine.run(cancel, &def, None).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled { .. }));
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminal_failure_step_yields_terminal_failure_error() {
        let mut registry = Registry::new();
        let (a, _) = always("a", crate::types::EVENT_FAILURE);
        registry.register(a).unwrap();
        let def = WorkflowDefinition::new("f", "a").with_step(StepDefinition::new("a").on(crate::types::EVENT_FAILURE, FAILED));
        let engine = Engine::new(registry);
        let err = engine.run(CancellationToken::new(), &def, None).await.unwrap_err();
        assert!(matches!(err, EngineError::TerminalFailure));
    }

    #[tokio::test]
    async fn single_step_mode_runs_exactly_one_step_and_returns() {
        let mut registry = Registry::new();
        let (a, a_calls) = always("a", EVENT_SUCCESS);
        let (b, b_calls) = always("b", EVENT_SUCCESS);
        registry.register(a).unwrap();
        registry.register(b).unwrap();

        let engine = Engine::new(registry).with_single_step("b");
        let result = engine.run(CancellationToken::new(), &linear_def(), None).await.unwrap();
        assert_eq!(a_calls.load(Ordering::SeqCst), 0);
        assert_eq!(b_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.current_step, "c");
    }

    #[tokio::test]
    async fn dry_run_mode_never_calls_execute() {
        struct Exploding;
        #[async_trait]
        impl StepHandler for Exploding {
            fn name(&self) -> &str {
                "a"
            }
            async fn execute(&self, _cancel: CancellationToken, _state: &mut WorkflowState) -> Result<String, anyhow::Error> {
                panic!("execute must not be called in dry-run mode");
            }
            fn dry_run(&self, _state: &WorkflowState) -> String {
                "would do a thing".to_string()
            }
        }
        let mut registry = Registry::new();
        registry.register(Arc::new(Exploding)).unwrap();
        let def = WorkflowDefinition::new("d", "a").with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));
        let engine = Engine::new(registry).with_dry_run(true);
        let result = engine.run(CancellationToken::new(), &def, None).await.unwrap();
        assert_eq!(result.current_step, DONE);
    }

    #[tokio::test]
    async fn validate_reports_missing_handler() {
        let registry = Registry::new();
        let engine = Engine::new(registry);
        let errors = engine.validate(&linear_def());
        assert!(errors.iter().any(|e| e.contains('a')));
    }
}
