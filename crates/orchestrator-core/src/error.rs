// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy: one variant per propagation policy described by the specification.

use thiserror::Error;

use crate::validator::ValidationReport;

/// Errors returned by `Engine::run` and related engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A programming error detected at construction time: duplicate or empty
    /// handler names registered with a `Registry`.
    #[error("fatal: {0}")]
    Fatal(String),

    /// The definition failed structural validation and the engine refused to run it.
    #[error("invalid workflow definition: {0}")]
    Validation(ValidationReport),

    /// A step's handler returned an error and the step declares no `failure`
    /// transition to recover to.
    #[error("step '{step}' failed: {source}")]
    Execution { step: String, source: anyhow::Error },

    /// A step's handler panicked. Treated identically to `Execution` from the
    /// point of view of transition resolution, but distinguished for diagnostics.
    #[error("step '{step}' panicked: {payload}")]
    Panic { step: String, payload: String },

    /// The run's cancellation token was observed cancelled before a step invocation.
    #[error("run cancelled at step '{step}'")]
    Cancelled { step: String },

    /// The engine looped `cap` times without reaching a terminal step.
    #[error("exceeded maximum iterations ({cap})")]
    IterationCapExceeded { cap: u32 },

    /// A handler returned an event tag that has no entry in the step's transition map.
    #[error("no transition for event '{event}' at step '{step}'")]
    NoTransition { step: String, event: String },

    /// `current_step` named a step absent from the definition (and not a terminal).
    #[error("unknown step '{0}'")]
    UnknownStep(String),

    /// A step named a handler absent from the registry.
    #[error("unknown handler '{0}'")]
    UnknownHandler(String),

    /// The run reached `__failed__`.
    #[error("workflow reached terminal failure state")]
    TerminalFailure,
}

impl EngineError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// Errors returned by `StateStore` operations.
#[derive(Debug, Error)]
pub enum StateStoreError {
    #[error("run '{0}' not found")]
    NotFound(String),

    #[error("corrupt state file for run '{id}': {source}")]
    Corrupt { id: String, source: serde_json::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_error_formats_message() {
        let err = EngineError::fatal("duplicate handler name 'a'");
        assert_eq!(err.to_string(), "fatal: duplicate handler name 'a'");
    }

    #[test]
    fn not_found_is_distinct_from_corrupt() {
        let not_found = StateStoreError::NotFound("abc".into());
        let corrupt = StateStoreError::Corrupt {
            id: "abc".into(),
            source: serde_json::from_str::<serde_json::Value>("{not json}").unwrap_err(),
        };
        assert!(not_found.to_string().contains("not found"));
        assert!(corrupt.to_string().contains("corrupt"));
    }
}
