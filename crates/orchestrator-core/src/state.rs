// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! The mutable run record (`WorkflowState`) and the disk-derived `RunSummary` projection.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{StepRecord, DONE, EVENT_FAILURE, FAILED};

/// The mutable record of a single workflow run.
///
/// `step_history` and `metadata` are always serialised as `[]`/`{}`, never `null`,
/// even on a freshly constructed state — callers that deserialise persisted JSON
/// and compare against a fresh `WorkflowState::new` should see identical shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub id: String,
    pub workflow_name: String,
    pub current_step: String,
    #[serde(default)]
    pub step_history: Vec<StepRecord>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Construct a fresh run. `current_step` is set to the workflow's `initial_step`
    /// by the caller (the engine does this on a `None` state passed to `run`).
    pub fn new(workflow_name: impl Into<String>, current_step: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_name: workflow_name.into(),
            current_step: current_step.into(),
            step_history: Vec::new(),
            metadata: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a step record and bump `updated_at`. The only sanctioned way to grow
    /// `step_history` — callers must not push to the vector directly.
    pub fn record_step(&mut self, record: StepRecord) {
        self.step_history.push(record);
        self.touch();
    }

    /// Advance `current_step` to `target` and bump `updated_at`.
    pub fn advance_to(&mut self, target: impl Into<String>) {
        self.current_step = target.into();
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_done(&self) -> bool {
        self.current_step == DONE
    }

    pub fn is_failed(&self) -> bool {
        self.current_step == FAILED
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
        self.touch();
    }

    /// Read a string from the metadata bag.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    /// Read an integer from the metadata bag, coercing a float that round-trips
    /// exactly (persisted state may come back through JSON as a float even though
    /// it was written as an integer).
    pub fn metadata_i64(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key) {
            Some(Value::Number(n)) => n.as_i64().or_else(|| {
                let f = n.as_f64()?;
                (f.fract() == 0.0).then_some(f as i64)
            }),
            _ => None,
        }
    }

    pub fn metadata_bool(&self, key: &str) -> Option<bool> {
        self.metadata.get(key).and_then(Value::as_bool)
    }

    fn derive_status(&self) -> RunStatus {
        if self.current_step == DONE {
            return RunStatus::Completed;
        }
        if self.current_step == FAILED {
            return RunStatus::Failed;
        }
        match self.step_history.last() {
            Some(record) if record.event == EVENT_FAILURE => RunStatus::Failed,
            Some(_) => RunStatus::Running,
            None => RunStatus::Interrupted,
        }
    }

    pub fn to_summary(&self) -> RunSummary {
        RunSummary {
            id: self.id.clone(),
            workflow_name: self.workflow_name.clone(),
            current_step: self.current_step.clone(),
            status: self.derive_status(),
            updated_at: self.updated_at,
            step_count: self.step_history.len(),
        }
    }
}

/// Derived status of a run, computed from its recorded history rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
    Running,
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Running => "running",
            Self::Interrupted => "interrupted",
        }
    }
}

/// A lightweight projection of `WorkflowState`, computed from disk by `StateStore::list`
/// without holding the full step history in memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub workflow_name: String,
    pub current_step: String,
    pub status: RunStatus,
    pub updated_at: DateTime<Utc>,
    pub step_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EVENT_SUCCESS;

    #[test]
    fn fresh_state_has_empty_non_null_collections() {
        let state = WorkflowState::new("demo", "a");
        assert!(state.step_history.is_empty());
        assert!(state.metadata.is_empty());
        assert_eq!(state.created_at, state.updated_at);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["step_history"], serde_json::json!([]));
        assert_eq!(json["metadata"], serde_json::json!({}));
    }

    #[test]
    fn record_step_updates_timestamp_and_is_append_only() {
        let mut state = WorkflowState::new("demo", "a");
        let created = state.created_at;
        std::thread::sleep(std::time::Duration::from_millis(2));
        state.record_step(StepRecord {
            step: "a".into(),
            event: EVENT_SUCCESS.into(),
            started_at: Utc::now(),
            duration_nanos: 100,
            error: None,
        });
        assert_eq!(state.step_history.len(), 1);
        assert_eq!(state.created_at, created);
        assert!(state.updated_at >= created);
    }

    #[test]
    fn metadata_i64_coerces_float_round_trip() {
        let mut state = WorkflowState::new("demo", "a");
        state.set_metadata("phase", Value::from(3.0));
        assert_eq!(state.metadata_i64("phase"), Some(3));
        state.set_metadata("ratio", Value::from(3.5));
        assert_eq!(state.metadata_i64("ratio"), None);
    }

    #[test]
    fn status_derivation_matches_spec() {
        let mut state = WorkflowState::new("demo", DONE);
        assert_eq!(state.to_summary().status, RunStatus::Completed);

        state.current_step = FAILED.to_string();
        assert_eq!(state.to_summary().status, RunStatus::Failed);

        state.current_step = "b".to_string();
        state.record_step(StepRecord {
            step: "a".into(),
            event: "failure".into(),
            started_at: Utc::now(),
            duration_nanos: 0,
            error: Some("boom".into()),
        });
        assert_eq!(state.to_summary().status, RunStatus::Failed);

        let mut running = WorkflowState::new("demo", "b");
        running.record_step(StepRecord {
            step: "a".into(),
            event: EVENT_SUCCESS.into(),
            started_at: Utc::now(),
            duration_nanos: 0,
            error: None,
        });
        assert_eq!(running.to_summary().status, RunStatus::Running);

        let fresh = WorkflowState::new("demo", "a");
        assert_eq!(fresh.to_summary().status, RunStatus::Interrupted);
    }
}
