//! `best_of_n` strategy (spec.md §4.5): pick the single highest-scored
//! candidate by named metric, enforce a minimum-score threshold, tie-break
//! among equally-scored candidates.

use crate::model::{CombineCandidate, CombineMetrics, CombineResult, CombineStrategy, Contribution};
use rand::seq::SliceRandom;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreaker {
    First,
    Random,
    Shortest,
    Longest,
}

#[derive(Debug, Clone)]
pub struct BestOfNConfig {
    pub tie_breaker: TieBreaker,
    pub minimum_score: Option<f64>,
}

/// `candidates` must already carry the named metric in `score` — the caller
/// (executor) is responsible for picking which score field ("metric" in
/// spec.md's config table) feeds this strategy.
pub fn combine(candidates: Vec<CombineCandidate>, config: &BestOfNConfig) -> CombineResult {
    let started = std::time::Instant::now();
    if candidates.is_empty() {
        return CombineResult::failure(
            CombineStrategy::BestOfN,
            vec!["no candidates supplied to best_of_n".to_string()],
        );
    }

    let total_input_length: usize = candidates.iter().map(|c| c.content.len()).sum();
    let max_score = candidates
        .iter()
        .filter_map(|c| c.score)
        .fold(f64::NEG_INFINITY, f64::max);

    if let Some(minimum) = config.minimum_score {
        if max_score < minimum {
            return CombineResult::failure(
                CombineStrategy::BestOfN,
                vec![format!(
                    "best candidate score {max_score} is below minimum_score {minimum}"
                )],
            );
        }
    }

    let top_tier: Vec<&CombineCandidate> = candidates
        .iter()
        .filter(|c| c.score.map(|s| (s - max_score).abs() < 1e-9).unwrap_or(false))
        .collect();

    if top_tier.is_empty() {
        return CombineResult::failure(
            CombineStrategy::BestOfN,
            vec!["no candidate carries a score; best_of_n has nothing to rank".to_string()],
        );
    }

    let winner = match config.tie_breaker {
        TieBreaker::First => top_tier[0],
        TieBreaker::Random => top_tier.choose(&mut rand::thread_rng()).unwrap_or(&top_tier[0]),
        TieBreaker::Shortest => top_tier.iter().min_by_key(|c| c.content.len()).unwrap(),
        TieBreaker::Longest => top_tier.iter().max_by_key(|c| c.content.len()).unwrap(),
    };

    let winner_id = winner.artifact_id;
    let output_length = winner.content.len();
    let combined_content = winner.content.clone();

    let contributions = candidates
        .iter()
        .map(|c| {
            if c.artifact_id == winner_id {
                Contribution {
                    artifact_id: c.artifact_id,
                    included: true,
                    reason: format!("highest score {max_score}"),
                }
            } else {
                Contribution {
                    artifact_id: c.artifact_id,
                    included: false,
                    reason: "not the highest-scored candidate".to_string(),
                }
            }
        })
        .collect();

    CombineResult {
        combined_content,
        strategy_used: CombineStrategy::BestOfN,
        source_artifact_ids: vec![winner_id],
        contributions,
        sources: winner.sources.clone(),
        metrics: CombineMetrics::compute(total_input_length, output_length, started.elapsed().as_secs_f64()),
        success: true,
        warnings: Vec::new(),
    }
}
