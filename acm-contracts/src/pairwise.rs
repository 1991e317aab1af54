//! `PairwiseComparison` entity (spec.md §3, §4.4).

use crate::ids::{ArtifactId, PairwiseComparisonId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    A,
    B,
    Tie,
}

/// One head-to-head decision (spec.md §3). Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairwiseComparison {
    pub id: PairwiseComparisonId,
    pub artifact_a_id: ArtifactId,
    pub artifact_b_id: ArtifactId,
    pub judge_model: String,
    pub iteration: u32,
    pub winner: Winner,
    pub confidence: f64,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

impl PairwiseComparison {
    /// `S_a` in the Elo update formula (spec.md §4.4): 1 for win, 0 for
    /// loss, 0.5 for tie.
    pub fn score_for_a(&self) -> f64 {
        match self.winner {
            Winner::A => 1.0,
            Winner::B => 0.0,
            Winner::Tie => 0.5,
        }
    }
}
