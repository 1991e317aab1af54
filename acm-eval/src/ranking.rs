//! Ranking score and top-N selection (spec.md §4.4.5).

use acm_contracts::ArtifactId;
use chrono::{DateTime, Utc};

/// Everything the ranking pass needs about one artifact, gathered from the
/// single-eval aggregate, the Elo table (if pairwise ran), and the artifact
/// record itself.
#[derive(Debug, Clone)]
pub struct RankingInput {
    pub artifact_id: ArtifactId,
    pub overall_score: f64,
    pub elo_rating: Option<f64>,
    pub pairwise_wins: u32,
    pub stddev: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RankedArtifact {
    pub artifact_id: ArtifactId,
    pub rank_score: f64,
}

/// `normalize(elo) = (elo - 1000) / 100` (spec.md §4.4).
fn normalize_elo(elo: f64) -> f64 {
    (elo - 1000.0) / 100.0
}

/// `rank_score = 0.6*normalize(elo) + 0.4*(overall/10)` when pairwise data
/// exists, else `rank_score = overall_score` (spec.md §4.4).
pub fn rank_score(input: &RankingInput) -> f64 {
    match input.elo_rating {
        Some(elo) => 0.6 * normalize_elo(elo) + 0.4 * (input.overall_score / 10.0),
        None => input.overall_score,
    }
}

/// Orders artifacts by rank score descending, breaking ties by (spec.md
/// §4.4): higher pairwise wins → lower per-judge stddev → newer
/// `created_at`.
pub fn sort_ranked(mut inputs: Vec<RankingInput>) -> Vec<(RankingInput, f64)> {
    let mut scored: Vec<(RankingInput, f64)> = inputs
        .drain(..)
        .map(|input| {
            let score = rank_score(&input);
            (input, score)
        })
        .collect();

    scored.sort_by(|(a, score_a), (b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.pairwise_wins.cmp(&a.pairwise_wins))
            .then_with(|| a.stddev.partial_cmp(&b.stddev).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
    scored
}

/// Selects up to `top_n_count` artifacts whose normalized rank score (0..1)
/// meets `top_n_threshold`, always keeping at least `top_n_min` and never
/// exceeding `top_n_max` (spec.md §4.4 "Top-N selection"). Normalization
/// maps the observed `[-6.0, 1.0]`-ish rank-score range onto `0..1` via a
/// min-max scaling over the candidate set itself, since the spec defines
/// the threshold as "normalized 0..1" without a fixed absolute scale.
pub fn select_top_n(
    inputs: Vec<RankingInput>,
    top_n_count: usize,
    top_n_threshold: f64,
    top_n_min: usize,
    top_n_max: usize,
) -> Vec<RankedArtifact> {
    let ranked = sort_ranked(inputs);
    if ranked.is_empty() {
        return Vec::new();
    }

    let scores: Vec<f64> = ranked.iter().map(|(_, s)| *s).collect();
    let min_score = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let span = (max_score - min_score).max(1e-9);

    let mut selected = Vec::new();
    for (input, score) in &ranked {
        if selected.len() >= top_n_max {
            break;
        }
        let normalized = (score - min_score) / span;
        let meets_threshold = normalized >= top_n_threshold;
        let under_count_cap = selected.len() < top_n_count;
        let must_keep_minimum = selected.len() < top_n_min;

        if must_keep_minimum || (meets_threshold && under_count_cap) {
            selected.push(RankedArtifact {
                artifact_id: input.artifact_id,
                rank_score: *score,
            });
        }
    }
    selected
}
