// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Orchestrator Core - the workflow execution engine for AI-assisted software
//! development pipelines.
//!
//! This crate provides a generic state-machine execution engine that drives
//! declarative workflow graphs through persistent, resumable runs: a typed
//! event vocabulary, a pluggable handler registry, structural validation, an
//! execution loop with panic isolation and an iteration guard, a filesystem
//! checkpoint store, and a dry-run plan formatter.
//!
//! # Example
//!
//! ```rust
//! use orchestrator_core::{registry::Registry, engine::Engine, workflows};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let registry = Registry::new();
//! let engine = Engine::new(registry);
//! let def = workflows::implement();
//! let errors = engine.validate(&def);
//! assert!(!errors.is_empty(), "no handler is registered for 'implement' yet");
//! # }
//! ```

pub mod config;
pub mod dryrun;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;
pub mod validator;
pub mod workflows;

pub use config::{ConfigError, Settings};
pub use engine::{ChannelEventSink, Engine, EventSink, PostStepHook};
pub use error::{EngineError, StateStoreError};
pub use registry::{default_registry, Registry, StepHandler};
pub use state::{RunStatus, RunSummary, WorkflowState};
pub use store::{sanitize_id, FilesystemStateStore, StateStore};
pub use types::{
    is_terminal, LifecycleEventType, StepDefinition, StepRecord, WorkflowDefinition, WorkflowEvent, DONE, FAILED,
};
pub use validator::{validate, Finding, Severity, ValidationReport};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
