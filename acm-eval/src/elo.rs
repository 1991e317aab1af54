//! Elo rating table (spec.md §4.4): updates are applied by a single updater
//! in chronological order so concurrent comparison results never race on a
//! rating.

use acm_contracts::{ArtifactId, EloPool, EloRating, PairwiseComparison, RatingHistoryEntry, RunId};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Serializes Elo updates for one run behind a mutex, mirroring the "single
/// updater task/queue, chronological order" requirement (spec.md §5) without
/// needing an actual background task: callers already serialize comparisons
/// chronologically by awaiting `apply` one at a time (the pairwise phase
/// processes a bounded concurrent batch, then reduces into this table).
pub struct EloTable {
    run_id: RunId,
    k_factor: f64,
    initial_rating: f64,
    ratings: Mutex<HashMap<(ArtifactId, EloPool), EloRating>>,
}

impl EloTable {
    pub fn new(run_id: RunId, k_factor: f64, initial_rating: f64) -> Self {
        Self {
            run_id,
            k_factor,
            initial_rating,
            ratings: Mutex::new(HashMap::new()),
        }
    }

    /// Applies one comparison's Elo update (spec.md §4.4 formula),
    /// initializing both artifacts' ratings in `pool` on first sight.
    /// Comparisons must be fed in chronological order by the caller.
    pub async fn apply(&self, comparison: &PairwiseComparison, pool: EloPool) {
        let mut ratings = self.ratings.lock().await;

        let rating_a = ratings
            .entry((comparison.artifact_a_id, pool))
            .or_insert_with(|| EloRating::new(self.run_id, comparison.artifact_a_id, pool, self.initial_rating))
            .rating;
        let rating_b = ratings
            .entry((comparison.artifact_b_id, pool))
            .or_insert_with(|| EloRating::new(self.run_id, comparison.artifact_b_id, pool, self.initial_rating))
            .rating;

        let expected_a = 1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0));
        let expected_b = 1.0 - expected_a;
        let score_a = comparison.score_for_a();
        let score_b = 1.0 - score_a;

        let new_rating_a = rating_a + self.k_factor * (score_a - expected_a);
        let new_rating_b = rating_b + self.k_factor * (score_b - expected_b);

        let now = Utc::now();
        {
            let entry = ratings.get_mut(&(comparison.artifact_a_id, pool)).unwrap();
            record_update(entry, comparison, rating_a, new_rating_a, comparison.artifact_b_id, score_a, now);
        }
        {
            let entry = ratings.get_mut(&(comparison.artifact_b_id, pool)).unwrap();
            record_update(entry, comparison, rating_b, new_rating_b, comparison.artifact_a_id, score_b, now);
        }
    }

    pub async fn rating(&self, artifact_id: ArtifactId, pool: EloPool) -> Option<EloRating> {
        self.ratings.lock().await.get(&(artifact_id, pool)).cloned()
    }

    pub async fn all_ratings(&self, pool: EloPool) -> Vec<EloRating> {
        self.ratings
            .lock()
            .await
            .values()
            .filter(|r| r.pool == pool)
            .cloned()
            .collect()
    }
}

fn record_update(
    entry: &mut EloRating,
    comparison: &PairwiseComparison,
    rating_before: f64,
    rating_after: f64,
    opponent: ArtifactId,
    score: f64,
    now: chrono::DateTime<Utc>,
) {
    entry.rating = rating_after;
    entry.games += 1;
    if score == 1.0 {
        entry.wins += 1;
    } else if score == 0.0 {
        entry.losses += 1;
    } else {
        entry.ties += 1;
    }
    entry.rating_history.push(RatingHistoryEntry {
        comparison_id: comparison.id,
        rating_before,
        rating_after,
        opponent_artifact_id: opponent,
        recorded_at: now,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_contracts::{PairwiseComparisonId, Winner};

    fn comparison(a: ArtifactId, b: ArtifactId, winner: Winner) -> PairwiseComparison {
        PairwiseComparison {
            id: PairwiseComparisonId::new(),
            artifact_a_id: a,
            artifact_b_id: b,
            judge_model: "test-judge".to_string(),
            iteration: 0,
            winner,
            confidence: 0.9,
            reasoning: "test".to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn equal_rated_win_matches_exact_elo_formula() {
        let table = EloTable::new(RunId::new(), 32.0, 1500.0);
        let a = ArtifactId::new();
        let b = ArtifactId::new();
        table.apply(&comparison(a, b, Winner::A), EloPool::PreCombine).await;

        let rating_a = table.rating(a, EloPool::PreCombine).await.unwrap();
        let rating_b = table.rating(b, EloPool::PreCombine).await.unwrap();

        // E = 0.5 at equal ratings, so delta = K * (1 - 0.5) = 16
        assert!((rating_a.rating - 1516.0).abs() < 1e-9);
        assert!((rating_b.rating - 1484.0).abs() < 1e-9);
        assert_eq!(rating_a.games, 1);
        assert_eq!(rating_a.wins, 1);
        assert_eq!(rating_b.losses, 1);
    }

    #[tokio::test]
    async fn tie_leaves_equal_ratings_unchanged() {
        let table = EloTable::new(RunId::new(), 32.0, 1500.0);
        let a = ArtifactId::new();
        let b = ArtifactId::new();
        table.apply(&comparison(a, b, Winner::Tie), EloPool::PreCombine).await;

        let rating_a = table.rating(a, EloPool::PreCombine).await.unwrap();
        assert!((rating_a.rating - 1500.0).abs() < 1e-9);
        assert_eq!(rating_a.ties, 1);
    }

    #[tokio::test]
    async fn pre_and_post_combine_pools_are_independent() {
        let table = EloTable::new(RunId::new(), 32.0, 1500.0);
        let a = ArtifactId::new();
        let b = ArtifactId::new();
        table.apply(&comparison(a, b, Winner::A), EloPool::PreCombine).await;
        assert!(table.rating(a, EloPool::PostCombine).await.is_none());
    }

    #[tokio::test]
    async fn round_robin_four_artifacts_matches_exact_formula_and_zero_sum() {
        let table = EloTable::new(RunId::new(), 32.0, 1500.0);
        let a = ArtifactId::new();
        let b = ArtifactId::new();
        let c = ArtifactId::new();
        let d = ArtifactId::new();

        table.apply(&comparison(a, b, Winner::A), EloPool::PreCombine).await;
        table.apply(&comparison(a, c, Winner::A), EloPool::PreCombine).await;
        table.apply(&comparison(a, d, Winner::A), EloPool::PreCombine).await;
        table.apply(&comparison(b, c, Winner::A), EloPool::PreCombine).await;
        table.apply(&comparison(b, d, Winner::A), EloPool::PreCombine).await;
        table.apply(&comparison(c, d, Winner::Tie), EloPool::PreCombine).await;

        let rating_a = table.rating(a, EloPool::PreCombine).await.unwrap().rating;
        let rating_b = table.rating(b, EloPool::PreCombine).await.unwrap().rating;
        let rating_c = table.rating(c, EloPool::PreCombine).await.unwrap().rating;
        let rating_d = table.rating(d, EloPool::PreCombine).await.unwrap().rating;

        assert!((rating_a - 1545.828).abs() < 1e-3);
        assert!((rating_b - 1515.362).abs() < 1e-3);
        assert!((rating_c - 1468.767).abs() < 1e-3);
        assert!((rating_d - 1470.043).abs() < 1e-3);

        let sum_deltas = (rating_a + rating_b + rating_c + rating_d) - 4.0 * 1500.0;
        assert!(sum_deltas.abs() < 1e-6);
    }

    #[tokio::test]
    async fn sequential_games_accumulate_history() {
        let table = EloTable::new(RunId::new(), 32.0, 1500.0);
        let a = ArtifactId::new();
        let b = ArtifactId::new();
        let c = ArtifactId::new();
        table.apply(&comparison(a, b, Winner::A), EloPool::PreCombine).await;
        table.apply(&comparison(a, c, Winner::B), EloPool::PreCombine).await;

        let rating_a = table.rating(a, EloPool::PreCombine).await.unwrap();
        assert_eq!(rating_a.games, 2);
        assert_eq!(rating_a.rating_history.len(), 2);
    }
}
