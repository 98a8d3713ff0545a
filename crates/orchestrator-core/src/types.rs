// Copyright (c) 2025 Orchestrator Core Team
// SPDX-License-Identifier: Apache-2.0

//! Event vocabulary and the immutable value types that describe a workflow graph.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved target name for the success terminal. Never a real step.
pub const DONE: &str = "__done__";
/// Reserved target name for the failure terminal. Never a real step.
pub const FAILED: &str = "__failed__";

/// Canonical transition event tags. Handlers are not restricted to these, but any
/// tag a handler returns must be covered by the step's transition map.
pub const EVENT_SUCCESS: &str = "success";
pub const EVENT_FAILURE: &str = "failure";
pub const EVENT_BLOCKED: &str = "blocked";
pub const EVENT_RATE_LIMITED: &str = "rate_limited";
pub const EVENT_NEEDS_HUMAN: &str = "needs_human";
pub const EVENT_PARTIAL: &str = "partial";

/// Returns true if `name` is one of the two terminal pseudo-steps.
pub fn is_terminal(name: &str) -> bool {
    name == DONE || name == FAILED
}

/// Lifecycle event kinds emitted by the engine over the course of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventType {
    WorkflowStarted,
    WorkflowResumed,
    WorkflowCompleted,
    WorkflowFailed,
    StepStarted,
    StepCompleted,
    StepFailed,
    StepSkipped,
    Checkpoint,
}

impl LifecycleEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowStarted => "workflow_started",
            Self::WorkflowResumed => "workflow_resumed",
            Self::WorkflowCompleted => "workflow_completed",
            Self::WorkflowFailed => "workflow_failed",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::StepFailed => "step_failed",
            Self::StepSkipped => "step_skipped",
            Self::Checkpoint => "checkpoint",
        }
    }
}

/// A single lifecycle event emitted by the engine, suitable for a slow external
/// consumer (dashboard, log shipper) or for structured logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEvent {
    #[serde(rename = "type")]
    pub event_type: LifecycleEventType,
    pub workflow_id: String,
    /// Empty for workflow-level events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub step: String,
    /// The transition tag, empty for workflow-level events.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowEvent {
    pub fn new(event_type: LifecycleEventType, workflow_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            event_type,
            workflow_id: workflow_id.into(),
            step: String::new(),
            event: String::new(),
            message: message.into(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// One completed step in a run's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: String,
    pub event: String,
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the step execution, in nanoseconds. Serialised
    /// as `duration` per the checkpoint file's external format.
    #[serde(rename = "duration")]
    pub duration_nanos: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single step's definition: its name and the map from returned event tag to
/// the next step name (or a terminal pseudo-step).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(default)]
    pub transitions: HashMap<String, String>,
    /// Advisory only: the engine itself executes every run sequentially.
    #[serde(default)]
    pub parallel: bool,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: HashMap::new(),
            parallel: false,
        }
    }

    pub fn on(mut self, event: impl Into<String>, target: impl Into<String>) -> Self {
        self.transitions.insert(event.into(), target.into());
        self
    }
}

/// An immutable workflow graph: a name, an entry step, and an ordered list of
/// step definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub initial_step: String,
    pub steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>, initial_step: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            initial_step: initial_step.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step definition by name. Terminal pseudo-steps never resolve here.
    pub fn get_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Parse a workflow definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Parse a workflow definition from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_detection() {
        assert!(is_terminal(DONE));
        assert!(is_terminal(FAILED));
        assert!(!is_terminal("implement"));
    }

    #[test]
    fn step_definition_builder() {
        let step = StepDefinition::new("a").on(EVENT_SUCCESS, "b").on(EVENT_FAILURE, FAILED);
        assert_eq!(step.transitions.get(EVENT_SUCCESS), Some(&"b".to_string()));
        assert_eq!(step.transitions.get(EVENT_FAILURE), Some(&FAILED.to_string()));
    }

    #[test]
    fn definition_round_trips_through_yaml() {
        let def = WorkflowDefinition::new("demo", "a")
            .with_step(StepDefinition::new("a").on(EVENT_SUCCESS, DONE));
        let yaml = def.to_yaml().unwrap();
        let parsed = WorkflowDefinition::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.name, "demo");
        assert_eq!(parsed.get_step("a").unwrap().transitions[EVENT_SUCCESS], DONE);
    }

    #[test]
    fn lifecycle_event_tags() {
        assert_eq!(LifecycleEventType::StepStarted.as_str(), "step_started");
        assert_eq!(LifecycleEventType::WorkflowResumed.as_str(), "workflow_resumed");
    }

    #[test]
    fn step_record_serialises_duration_under_the_external_key_name() {
        let record = StepRecord { step: "a".into(), event: EVENT_SUCCESS.into(), started_at: Utc::now(), duration_nanos: 42, error: None };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["duration"], serde_json::json!(42));
        assert!(json.get("duration_nanos").is_none());
    }
}
