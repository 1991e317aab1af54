//! Timeline events emitted by the executor (spec.md §4.1, §6.4).
//!
//! The core has no opinion on transport; it only produces these values.
//! Consumers (HTTP/UI layer, out of scope here) subscribe via whatever sink
//! they choose — see `acm-executor::EventSink`.

use crate::ids::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    Generation,
    Evaluation,
    Pairwise,
    Combination,
    PostCombine,
    Completion,
}

/// One timeline event (spec.md §6.4 shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub run_id: RunId,
    pub phase: Phase,
    pub event_type: String,
    pub description: String,
    pub model: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: Option<f64>,
    pub success: bool,
    pub details: serde_json::Value,
}

impl TimelineEvent {
    pub fn new(run_id: RunId, phase: Phase, event_type: impl Into<String>, success: bool) -> Self {
        Self {
            run_id,
            phase,
            event_type: event_type.into(),
            description: String::new(),
            model: None,
            timestamp: Utc::now(),
            duration_seconds: None,
            success,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
