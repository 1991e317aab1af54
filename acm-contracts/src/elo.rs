//! `EloRating` entity (spec.md §3, §4.4).

use crate::ids::{ArtifactId, PairwiseComparisonId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Combined artifacts rate in a separate pool from pre-combine artifacts
/// (spec.md §9 Open Question, resolved in SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EloPool {
    PreCombine,
    PostCombine,
}

/// One entry in an artifact's rating history, appended on every update
/// (spec.md §3 invariant: `rating_history.len() == games`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingHistoryEntry {
    pub comparison_id: PairwiseComparisonId,
    pub rating_before: f64,
    pub rating_after: f64,
    pub opponent_artifact_id: ArtifactId,
    pub recorded_at: DateTime<Utc>,
}

/// Running rating for one artifact within one run and pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EloRating {
    pub run_id: RunId,
    pub artifact_id: ArtifactId,
    pub pool: EloPool,
    pub rating: f64,
    pub games: u32,
    pub wins: u32,
    pub losses: u32,
    pub ties: u32,
    pub rating_history: Vec<RatingHistoryEntry>,
}

impl EloRating {
    pub fn new(run_id: RunId, artifact_id: ArtifactId, pool: EloPool, initial_rating: f64) -> Self {
        Self {
            run_id,
            artifact_id,
            pool,
            rating: initial_rating,
            games: 0,
            wins: 0,
            losses: 0,
            ties: 0,
            rating_history: Vec::new(),
        }
    }
}
