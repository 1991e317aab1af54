//! `Run` entity and its state machine (spec.md §3, §4.1).

use crate::error::ErrorKind;
use crate::ids::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One generator+iteration configuration entry in a run's plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    pub provider: String,
    pub model: String,
    pub iteration: u32,
    pub temperature: f32,
    /// Digest of the instructions text (not the text itself) — part of the
    /// config-hash fingerprint subset (spec.md §4.6).
    pub instructions_hash: String,
    /// Digest of the guidelines text.
    pub guidelines_hash: String,
    /// Generator-agnostic passthrough fields that are NOT fingerprinted
    /// (e.g. timeouts, concurrency hints, output paths).
    pub extra: HashMap<String, serde_json::Value>,
}

/// The generator kind a `GeneratorConfig` entry targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneratorKind {
    Fpf,
    Gptr,
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorKind::Fpf => write!(f, "fpf"),
            GeneratorKind::Gptr => write!(f, "gptr"),
        }
    }
}

/// One (generator, config) entry the run will execute per document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorPlanEntry {
    pub generator: GeneratorKind,
    pub config: GeneratorConfig,
}

/// Immutable run configuration, snapshotted at `start()` (spec.md §4.1 step 1).
///
/// `#[serde(default)]` lets a config file supply only the fields it wants to
/// override; everything else falls back to `RunConfig::default()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub generators: Vec<GeneratorPlanEntry>,
    pub force: bool,

    pub global_concurrency: usize,
    pub per_generator_concurrency: HashMap<GeneratorKind, usize>,
    pub per_provider_concurrency: HashMap<String, usize>,
    pub single_eval_concurrency: usize,
    pub pairwise_concurrency: usize,

    pub top_n_min: usize,
    pub top_n_max: usize,
    pub top_n_count: usize,
    pub top_n_threshold: f64,

    pub elo_k_factor: f64,
    pub elo_initial_rating: f64,

    pub skip_post_combine_eval: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        let mut per_generator_concurrency = HashMap::new();
        per_generator_concurrency.insert(GeneratorKind::Fpf, 2);
        per_generator_concurrency.insert(GeneratorKind::Gptr, 2);

        Self {
            generators: Vec::new(),
            force: false,
            global_concurrency: 4,
            per_generator_concurrency,
            per_provider_concurrency: HashMap::new(),
            single_eval_concurrency: 4,
            pairwise_concurrency: 4,
            top_n_min: 1,
            top_n_max: 8,
            top_n_count: 5,
            top_n_threshold: 0.0,
            elo_k_factor: 32.0,
            elo_initial_rating: 1500.0,
            skip_post_combine_eval: false,
        }
    }
}

/// Run lifecycle status. Transitions are one-way (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    PartialFailure,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::PartialFailure
        )
    }

    /// Only these transitions are legal (spec.md §4.1):
    /// `pending -> queued -> running -> {completed|failed|cancelled|partial_failure}`
    /// and `{pending, queued} -> cancelled`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (Pending, Queued)
                | (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (Running, PartialFailure)
                | (Pending, Cancelled)
                | (Queued, Cancelled)
        )
    }
}

/// Aggregate counters and error histogram for a finished or in-flight run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub documents_total: u32,
    pub documents_completed: u32,
    pub documents_failed: u32,
    pub documents_skipped: u32,
    pub artifacts_generated: u32,
    pub artifacts_combined: u32,
    pub error_counts: HashMap<ErrorKind, u32>,
}

impl RunSummary {
    pub fn record_error(&mut self, kind: ErrorKind) {
        *self.error_counts.entry(kind).or_insert(0) += 1;
    }
}

/// One pipeline invocation (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub status: RunStatus,
    pub config: RunConfig,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub summary: RunSummary,
}

impl Run {
    pub fn new(config: RunConfig) -> Self {
        Self {
            id: RunId::new(),
            status: RunStatus::Pending,
            config,
            priority: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            summary: RunSummary::default(),
        }
    }

    /// Attempt a status transition, enforcing the one-way state machine.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "invalid run transition {:?} -> {:?}",
                self.status, next
            ));
        }
        self.status = next;
        match next {
            RunStatus::Running => self.started_at = Some(Utc::now()),
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        Ok(())
    }
}
