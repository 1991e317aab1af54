//! Pairwise evaluator: pair selection and the head-to-head judge call
//! (spec.md §4.4).

use crate::judge::{parse_with_retry, JudgeClient};
use acm_contracts::{ArtifactId, PairwiseComparison, PairwiseComparisonId, Winner};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Candidate artifact as seen by pair selection: its id, content, and (if
/// available) its single-eval overall score for Swiss pairing / top-K / top-N
/// filtering.
#[derive(Debug, Clone)]
pub struct PairwiseCandidate {
    pub artifact_id: ArtifactId,
    pub content: String,
    pub overall_score: Option<f64>,
}

const ROUND_ROBIN_MAX: usize = 10;
const SWISS_MAX: usize = 50;

/// Selects which pairs of candidates get compared (spec.md §4.4 "Pair
/// selection"). Deterministic given identical inputs: candidates are sorted
/// by `artifact_id` before any scheme-specific logic runs so repeated calls
/// on the same set always produce the same pairs in the same order.
pub fn select_pairs(candidates: &[PairwiseCandidate]) -> Vec<(usize, usize)> {
    let mut indices: Vec<usize> = (0..candidates.len()).collect();
    indices.sort_by_key(|&i| candidates[i].artifact_id);

    let n = indices.len();
    if n <= ROUND_ROBIN_MAX {
        round_robin_pairs(&indices)
    } else if n <= SWISS_MAX {
        swiss_pairs(&indices, candidates)
    } else {
        top_k_pairs(&indices, candidates)
    }
}

fn round_robin_pairs(indices: &[usize]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..indices.len() {
        for j in (i + 1)..indices.len() {
            pairs.push((indices[i], indices[j]));
        }
    }
    pairs
}

/// Pairs neighbors in rating order (spec.md §4.4: "pair by similar current
/// rating"). Candidates without a score sort last and pair among
/// themselves.
fn swiss_pairs(indices: &[usize], candidates: &[PairwiseCandidate]) -> Vec<(usize, usize)> {
    let mut sorted = indices.to_vec();
    sorted.sort_by(|&a, &b| {
        let sa = candidates[a].overall_score.unwrap_or(f64::MIN);
        let sb = candidates[b].overall_score.unwrap_or(f64::MIN);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.chunks(2).filter(|c| c.len() == 2).map(|c| (c[0], c[1])).collect()
}

/// Top-K sampling over the single-eval-ranked list (spec.md §4.4: "Top-K
/// sampling over the single-eval overall-score-ranked list when n > 50"),
/// then round-robin within the top slice.
fn top_k_pairs(indices: &[usize], candidates: &[PairwiseCandidate]) -> Vec<(usize, usize)> {
    const K: usize = SWISS_MAX;
    let mut sorted = indices.to_vec();
    sorted.sort_by(|&a, &b| {
        let sa = candidates[a].overall_score.unwrap_or(f64::MIN);
        let sb = candidates[b].overall_score.unwrap_or(f64::MIN);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted.truncate(K);
    round_robin_pairs(&sorted)
}

#[derive(Debug, Deserialize)]
struct ComparisonPayload {
    winner: Winner,
    confidence: f64,
    reasoning: String,
}

fn render_comparison_prompt(a: &str, b: &str, strict: bool) -> String {
    let schema_note = if strict {
        "Your previous response could not be parsed. Respond with ONLY a single JSON object: "
    } else {
        "Respond with a JSON object: "
    };
    format!(
        "Compare the two documents below and decide which is better overall.\n\n\
         Document A:\n{a}\n\nDocument B:\n{b}\n\n\
         {schema_note}{{\"winner\": \"a\"|\"b\"|\"tie\", \"confidence\": <0..1>, \"reasoning\": <string>}}"
    )
}

/// Runs one head-to-head comparison with position-bias mitigation (spec.md
/// §4.4): the candidate order sent to the judge is randomized per call, and
/// the returned winner is mapped back to the caller's original `(a, b)`
/// labeling.
pub async fn compare(
    judge: Arc<dyn JudgeClient>,
    artifact_a_id: ArtifactId,
    content_a: &str,
    artifact_b_id: ArtifactId,
    content_b: &str,
    iteration: u32,
    temperature: f32,
    timeout_seconds: u64,
) -> Result<PairwiseComparison, acm_contracts::AcmError> {
    let swapped = rand::thread_rng().gen_bool(0.5);
    let (first, second) = if swapped { (content_b, content_a) } else { (content_a, content_b) };

    let prompt = render_comparison_prompt(first, second, false);
    let raw = judge.call(&prompt, temperature, timeout_seconds).await?;

    let judge_for_retry = judge.clone();
    let retry_prompt = render_comparison_prompt(first, second, true);
    let payload: ComparisonPayload = parse_with_retry(&raw, || async move {
        judge_for_retry.call(&retry_prompt, temperature, timeout_seconds).await
    })
    .await?;

    let winner = if swapped {
        match payload.winner {
            Winner::A => Winner::B,
            Winner::B => Winner::A,
            Winner::Tie => Winner::Tie,
        }
    } else {
        payload.winner
    };

    debug!(%artifact_a_id, %artifact_b_id, ?winner, swapped, "pairwise comparison decided");

    Ok(PairwiseComparison {
        id: PairwiseComparisonId::new(),
        artifact_a_id,
        artifact_b_id,
        judge_model: judge.model().to_string(),
        iteration,
        winner,
        confidence: payload.confidence.clamp(0.0, 1.0),
        reasoning: payload.reasoning,
        created_at: Utc::now(),
    })
}

/// Runs a pair twice with swapped positions and reconciles disagreement into
/// a tie (spec.md §4.4: "run each pair twice with swapped positions; if the
/// two runs disagree on winner, classify as tie"). Used instead of
/// single-call randomized-order mitigation when the caller wants the
/// stronger double-run guarantee.
pub async fn compare_double_run(
    judge: Arc<dyn JudgeClient>,
    artifact_a_id: ArtifactId,
    content_a: &str,
    artifact_b_id: ArtifactId,
    content_b: &str,
    iteration: u32,
    temperature: f32,
    timeout_seconds: u64,
) -> Result<PairwiseComparison, acm_contracts::AcmError> {
    let first_run = run_forced_order(judge.clone(), content_a, content_b, temperature, timeout_seconds, false).await?;
    let second_run = run_forced_order(judge.clone(), content_a, content_b, temperature, timeout_seconds, true).await?;

    let winner = if first_run.0 == second_run.0 {
        first_run.0
    } else {
        Winner::Tie
    };

    Ok(PairwiseComparison {
        id: PairwiseComparisonId::new(),
        artifact_a_id,
        artifact_b_id,
        judge_model: judge.model().to_string(),
        iteration,
        winner,
        confidence: (first_run.1 + second_run.1) / 2.0,
        reasoning: format!("run1: {} | run2: {}", first_run.2, second_run.2),
        created_at: Utc::now(),
    })
}

async fn run_forced_order(
    judge: Arc<dyn JudgeClient>,
    content_a: &str,
    content_b: &str,
    temperature: f32,
    timeout_seconds: u64,
    swapped: bool,
) -> Result<(Winner, f64, String), acm_contracts::AcmError> {
    let (first, second) = if swapped { (content_b, content_a) } else { (content_a, content_b) };
    let prompt = render_comparison_prompt(first, second, false);
    let raw = judge.call(&prompt, temperature, timeout_seconds).await?;
    let judge_for_retry = judge.clone();
    let retry_prompt = render_comparison_prompt(first, second, true);
    let payload: ComparisonPayload = parse_with_retry(&raw, || async move {
        judge_for_retry.call(&retry_prompt, temperature, timeout_seconds).await
    })
    .await?;
    let winner = if swapped {
        match payload.winner {
            Winner::A => Winner::B,
            Winner::B => Winner::A,
            Winner::Tie => Winner::Tie,
        }
    } else {
        payload.winner
    };
    Ok((winner, payload.confidence.clamp(0.0, 1.0), payload.reasoning))
}

/// Filters candidates down to a deterministic top-N by single-eval score
/// before pair generation (spec.md §4.4: "Top-N filtering ... MAY be
/// applied before pair generation ... must be deterministic").
pub fn top_n_filter(mut candidates: Vec<PairwiseCandidate>, n: usize) -> Vec<PairwiseCandidate> {
    candidates.sort_by(|a, b| {
        let sa = a.overall_score.unwrap_or(f64::MIN);
        let sb = b.overall_score.unwrap_or(f64::MIN);
        sb.partial_cmp(&sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.artifact_id.cmp(&b.artifact_id))
    });
    candidates.truncate(n);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(n: usize) -> Vec<PairwiseCandidate> {
        (0..n)
            .map(|i| PairwiseCandidate {
                artifact_id: ArtifactId::new(),
                content: format!("doc {i}"),
                overall_score: Some(10.0 - i as f64),
            })
            .collect()
    }

    #[test]
    fn round_robin_produces_n_choose_2_pairs() {
        let candidates = candidates(5);
        let pairs = select_pairs(&candidates);
        assert_eq!(pairs.len(), 5 * 4 / 2);
    }

    #[test]
    fn swiss_pairs_neighbors_by_score() {
        let candidates = candidates(20);
        let pairs = select_pairs(&candidates);
        assert_eq!(pairs.len(), 10);
    }

    #[test]
    fn top_k_sampling_caps_pool_above_fifty() {
        let candidates = candidates(80);
        let pairs = select_pairs(&candidates);
        // round-robin over a 50-candidate top slice
        assert_eq!(pairs.len(), 50 * 49 / 2);
    }

    #[test]
    fn top_n_filter_is_deterministic_on_ties() {
        let mut candidates = candidates(4);
        for c in &mut candidates {
            c.overall_score = Some(5.0);
        }
        let a = top_n_filter(candidates.clone(), 2);
        let b = top_n_filter(candidates, 2);
        assert_eq!(
            a.iter().map(|c| c.artifact_id).collect::<Vec<_>>(),
            b.iter().map(|c| c.artifact_id).collect::<Vec<_>>()
        );
    }
}
