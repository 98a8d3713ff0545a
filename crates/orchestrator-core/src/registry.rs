// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! The handler registry and the `StepHandler` contract.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::state::WorkflowState;

/// A unit of work bound to a step name. Handlers are opaque to the engine: they
/// inspect and mutate the run's metadata bag and return a transition event tag.
#[async_trait]
pub trait StepHandler: Send + Sync {
    /// The step name this handler is bound to. Must be non-empty and unique
    /// within a `Registry`.
    fn name(&self) -> &str;

    /// Execute the step. Returning `Ok(event)` causes the engine to resolve the
    /// step's transition map by that event tag. Returning `Err` is equivalent to
    /// returning `failure` with the error recorded in the step's history entry.
    /// Must honour `cancel` at every suspension point.
    async fn execute(&self, cancel: CancellationToken, state: &mut WorkflowState) -> Result<String, anyhow::Error>;

    /// A short, side-effect-free description of what this step would do, used by
    /// the dry-run formatter.
    fn dry_run(&self, state: &WorkflowState) -> String;
}

/// Name to handler lookup table. Expected to be fully populated before any `run`
/// starts; reads thereafter are lock-free.
#[derive(Default, Clone)]
pub struct Registry {
    handlers: BTreeMap<String, Arc<dyn StepHandler>>,
}

impl Registry {
    pub fn new() -> Self {
        Self { handlers: BTreeMap::new() }
    }

    /// Register a handler. Fails fatally (a programming error) on an empty name
    /// or a name that collides with an already-registered handler.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) -> Result<(), EngineError> {
        let name = handler.name();
        if name.is_empty() {
            return Err(EngineError::fatal("cannot register a handler with an empty name"));
        }
        if self.handlers.contains_key(name) {
            return Err(EngineError::fatal(format!("duplicate handler name '{name}'")));
        }
        self.handlers.insert(name.to_string(), handler);
        Ok(())
    }

    /// Look up a handler by name, or the sentinel `UnknownHandler` error.
    pub fn get(&self, name: &str) -> Result<Arc<dyn StepHandler>, EngineError> {
        self.handlers.get(name).cloned().ok_or_else(|| EngineError::UnknownHandler(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Sorted list of registered handler names.
    pub fn list(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Like `get`, but panics on an unknown name. Intended for call sites that
    /// have already validated the definition against this registry.
    pub fn must_get(&self, name: &str) -> Arc<dyn StepHandler> {
        self.get(name).unwrap_or_else(|err| panic!("must_get: {err}"))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

static DEFAULT_REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();

/// The package-level default registry, documented as thread-unsafe to mutate
/// once any `run` has started reading from it.
pub fn default_registry() -> &'static Mutex<Registry> {
    DEFAULT_REGISTRY.get_or_init(|| Mutex::new(Registry::new()))
}
