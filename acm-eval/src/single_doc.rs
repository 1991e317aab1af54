//! Single-document rubric evaluator (spec.md §4.3).

use crate::judge::{parse_with_retry, JudgeClient};
use acm_contracts::{
    ArtifactEvalAggregate, ArtifactId, ConfidenceLabel, EvalResult, EvalResultId, JudgeAggregate,
    Rubric,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// A judge weighted into the across-judges aggregate (spec.md §4.3
/// "Aggregation: across judges, weighted mean using judge weights").
pub struct WeightedJudge {
    pub client: Arc<dyn JudgeClient>,
    pub weight: f64,
    pub iterations: u32,
}

#[derive(Debug, Clone)]
pub struct SingleDocConfig {
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for SingleDocConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            timeout_seconds: 120,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct JudgeScorePayload {
    scores: HashMap<String, i32>,
    reasoning: String,
}

/// Renders the strict-JSON judge prompt (spec.md §4.3: "rubric + artifact +
/// source context").
fn render_prompt(rubric: &Rubric, artifact_content: &str, source_context: &str, strict: bool) -> String {
    let criteria_desc: String = rubric
        .criteria
        .iter()
        .map(|c| {
            format!(
                "- {} (weight {:.2}, range {}..{}): {}",
                c.name, c.weight, c.min_score, c.max_score, c.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let schema_note = if strict {
        "Your previous response could not be parsed. Respond with ONLY a single JSON object, \
         no prose, no code fence, matching exactly: "
    } else {
        "Respond with a JSON object matching: "
    };

    format!(
        "Score the following document against this rubric:\n{criteria_desc}\n\n\
         Source context:\n{source_context}\n\n\
         Document:\n{artifact_content}\n\n\
         {schema_note}{{\"scores\": {{<criterion name>: <integer score>, ...}}, \"reasoning\": <string>}}"
    )
}

/// Evaluates one artifact with one judge, `iterations` times, returning one
/// `EvalResult` per iteration. Safe to call concurrently with generation and
/// with evaluation of other artifacts (spec.md §4.3 "streaming guarantee").
pub async fn evaluate_artifact_with_judge(
    artifact_id: ArtifactId,
    content: &str,
    source_context: &str,
    rubric: &Rubric,
    judge: &WeightedJudge,
    config: &SingleDocConfig,
) -> Vec<EvalResult> {
    let mut results = Vec::with_capacity(judge.iterations as usize);
    for iteration in 0..judge.iterations {
        match run_one_iteration(artifact_id, content, source_context, rubric, judge, config, iteration).await {
            Ok(result) => results.push(result),
            Err(error) => {
                warn!(
                    artifact_id = %artifact_id,
                    judge = judge.client.model(),
                    iteration,
                    error = %error,
                    "judge iteration failed, omitted from aggregate"
                );
            }
        }
    }
    results
}

async fn run_one_iteration(
    artifact_id: ArtifactId,
    content: &str,
    source_context: &str,
    rubric: &Rubric,
    judge: &WeightedJudge,
    config: &SingleDocConfig,
    iteration: u32,
) -> Result<EvalResult, acm_contracts::AcmError> {
    let started = std::time::Instant::now();
    let prompt = render_prompt(rubric, content, source_context, false);
    let raw = judge
        .client
        .call(&prompt, config.temperature, config.timeout_seconds)
        .await?;

    let client = judge.client.clone();
    let retry_prompt = render_prompt(rubric, content, source_context, true);
    let temperature = config.temperature;
    let timeout_seconds = config.timeout_seconds;
    let mut payload: JudgeScorePayload = parse_with_retry(&raw, || async move {
        client.call(&retry_prompt, temperature, timeout_seconds).await
    })
    .await?;

    validate_scores(rubric, &payload.scores)?;
    for criterion in &rubric.criteria {
        if let Some(score) = payload.scores.get_mut(&criterion.name) {
            *score = clamp_score(&criterion.name, *score, criterion.min_score, criterion.max_score);
        }
    }
    let overall = rubric.weighted_overall(&payload.scores);

    debug!(
        artifact_id = %artifact_id,
        judge = judge.client.model(),
        iteration,
        overall,
        "scored artifact"
    );

    Ok(EvalResult {
        id: EvalResultId::new(),
        artifact_id,
        judge_provider: judge.client.provider().to_string(),
        judge_model: judge.client.model().to_string(),
        iteration,
        criterion_scores: payload.scores,
        overall,
        reasoning: payload.reasoning,
        input_tokens: None,
        output_tokens: None,
        duration_seconds: started.elapsed().as_secs_f64(),
        created_at: Utc::now(),
    })
}

/// Validates every criterion is scored and within range (spec.md §4.3 steps
/// 2-3). Out-of-range scores are clamped rather than rejected outright,
/// since a judge that scores 11/10 clearly meant "max".
fn validate_scores(
    rubric: &Rubric,
    scores: &HashMap<String, i32>,
) -> Result<(), acm_contracts::AcmError> {
    for criterion in &rubric.criteria {
        if !scores.contains_key(&criterion.name) {
            return Err(acm_contracts::AcmError::new(
                acm_contracts::ErrorKind::InvalidOutput,
                format!("judge response missing score for criterion '{}'", criterion.name),
            ));
        }
    }
    Ok(())
}

/// Clamps a raw score into `[min, max]`, logging when clamping changes it.
pub fn clamp_score(criterion_name: &str, raw: i32, min: i32, max: i32) -> i32 {
    let clamped = raw.clamp(min, max);
    if clamped != raw {
        warn!(criterion = criterion_name, raw, clamped, "judge score out of range, clamped");
    }
    clamped
}

/// Aggregates a set of `EvalResult`s (possibly from multiple judges, each
/// with multiple iterations) into one `ArtifactEvalAggregate` (spec.md §4.3
/// "Aggregation").
pub fn aggregate(
    artifact_id: ArtifactId,
    results: &[EvalResult],
    judge_weights: &HashMap<String, f64>,
) -> ArtifactEvalAggregate {
    let mut by_judge: HashMap<(String, String), Vec<f64>> = HashMap::new();
    for result in results {
        by_judge
            .entry((result.judge_provider.clone(), result.judge_model.clone()))
            .or_default()
            .push(result.overall);
    }

    let mut per_judge = Vec::new();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for ((provider, model), scores) in &by_judge {
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = if scores.len() > 1 {
            scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n
        } else {
            0.0
        };
        let stddev = variance.sqrt();
        let confidence = ConfidenceLabel::from_stddev(stddev);

        let weight = judge_weights.get(model).copied().unwrap_or(1.0);
        weighted_sum += mean * weight;
        weight_total += weight;

        per_judge.push(JudgeAggregate {
            judge_provider: provider.clone(),
            judge_model: model.clone(),
            mean,
            stddev,
            confidence,
            iterations_scored: scores.len() as u32,
        });
    }

    let overall_score = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };

    let worst_confidence = per_judge
        .iter()
        .map(|j| j.confidence)
        .max_by_key(|c| match c {
            ConfidenceLabel::High => 0,
            ConfidenceLabel::Medium => 1,
            ConfidenceLabel::Low => 2,
        })
        .unwrap_or(ConfidenceLabel::Low);

    ArtifactEvalAggregate {
        artifact_id,
        per_judge,
        overall_score,
        confidence: worst_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_contracts::ErrorKind;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeJudge {
        provider: String,
        model: String,
        responses: std::sync::Mutex<Vec<String>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl JudgeClient for FakeJudge {
        fn provider(&self) -> &str {
            &self.provider
        }
        fn model(&self) -> &str {
            &self.model
        }
        async fn call(&self, _prompt: &str, _t: f32, _timeout: u64) -> Result<String, acm_contracts::AcmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(acm_contracts::AcmError::new(ErrorKind::Unknown, "no more canned responses"));
            }
            Ok(responses.remove(0))
        }
    }

    fn good_response() -> String {
        "```json\n{\"scores\": {\"accuracy\": 9, \"completeness\": 8, \"clarity\": 7, \
         \"relevance\": 9, \"formatting\": 6}, \"reasoning\": \"solid\"}\n```"
            .to_string()
    }

    #[tokio::test]
    async fn evaluates_and_scores_successfully() {
        let judge = WeightedJudge {
            client: Arc::new(FakeJudge {
                provider: "openai".into(),
                model: "gpt-4".into(),
                responses: std::sync::Mutex::new(vec![good_response()]),
                calls: AtomicU32::new(0),
            }),
            weight: 1.0,
            iterations: 1,
        };
        let rubric = Rubric::default();
        let results = evaluate_artifact_with_judge(
            ArtifactId::new(),
            "doc content",
            "source context",
            &rubric,
            &judge,
            &SingleDocConfig::default(),
        )
        .await;
        assert_eq!(results.len(), 1);
        assert!((results[0].overall - 8.0).abs() < 0.5);
    }

    #[tokio::test]
    async fn missing_criterion_is_retried_then_surfaced() {
        let malformed = "{\"scores\": {\"accuracy\": 9}, \"reasoning\": \"partial\"}".to_string();
        let judge = WeightedJudge {
            client: Arc::new(FakeJudge {
                provider: "openai".into(),
                model: "gpt-4".into(),
                responses: std::sync::Mutex::new(vec![malformed.clone(), malformed]),
                calls: AtomicU32::new(0),
            }),
            weight: 1.0,
            iterations: 1,
        };
        let rubric = Rubric::default();
        let results = evaluate_artifact_with_judge(
            ArtifactId::new(),
            "doc content",
            "source context",
            &rubric,
            &judge,
            &SingleDocConfig::default(),
        )
        .await;
        assert!(results.is_empty());
    }

    #[test]
    fn aggregate_computes_weighted_mean_and_confidence() {
        let artifact_id = ArtifactId::new();
        let results = vec![
            make_result(artifact_id, "openai", "gpt-4", 0, 8.0),
            make_result(artifact_id, "openai", "gpt-4", 1, 8.2),
            make_result(artifact_id, "anthropic", "claude", 0, 7.0),
        ];
        let mut weights = HashMap::new();
        weights.insert("gpt-4".to_string(), 2.0);
        weights.insert("claude".to_string(), 1.0);

        let aggregate = aggregate(artifact_id, &results, &weights);
        assert_eq!(aggregate.per_judge.len(), 2);
        let expected = (8.1 * 2.0 + 7.0 * 1.0) / 3.0;
        assert!((aggregate.overall_score - expected).abs() < 1e-9);
    }

    fn make_result(
        artifact_id: ArtifactId,
        provider: &str,
        model: &str,
        iteration: u32,
        overall: f64,
    ) -> EvalResult {
        EvalResult {
            id: EvalResultId::new(),
            artifact_id,
            judge_provider: provider.to_string(),
            judge_model: model.to_string(),
            iteration,
            criterion_scores: HashMap::new(),
            overall,
            reasoning: String::new(),
            input_tokens: None,
            output_tokens: None,
            duration_seconds: 0.1,
            created_at: Utc::now(),
        }
    }

    proptest! {
        /// The weighted mean across judges (spec.md §4.3 "Aggregation") is a
        /// convex combination of the individual scores it's built from, so
        /// it can never fall outside the range of those scores no matter how
        /// the weights or per-judge groupings are skewed.
        #[test]
        fn overall_score_stays_within_observed_score_range(
            scores in prop::collection::vec(0.0f64..=10.0, 1..12),
            weights in prop::collection::vec(0.1f64..=5.0, 1..4),
        ) {
            let artifact_id = ArtifactId::new();
            let mut judge_weights = HashMap::new();
            for (i, weight) in weights.iter().enumerate() {
                judge_weights.insert(format!("model-{i}"), *weight);
            }

            let results: Vec<EvalResult> = scores
                .iter()
                .enumerate()
                .map(|(i, score)| {
                    let judge_idx = i % weights.len();
                    make_result(artifact_id, "provider", &format!("model-{judge_idx}"), 0, *score)
                })
                .collect();

            let aggregate = aggregate(artifact_id, &results, &judge_weights);

            let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(aggregate.overall_score >= min - 1e-9);
            prop_assert!(aggregate.overall_score <= max + 1e-9);
        }

        /// Identical scores everywhere must aggregate to exactly that score,
        /// regardless of how many judges or what weights are in play.
        #[test]
        fn uniform_scores_aggregate_to_the_same_value(
            score in 0.0f64..=10.0,
            weights in prop::collection::vec(0.1f64..=5.0, 1..4),
        ) {
            let artifact_id = ArtifactId::new();
            let mut judge_weights = HashMap::new();
            for (i, weight) in weights.iter().enumerate() {
                judge_weights.insert(format!("model-{i}"), *weight);
            }

            let results: Vec<EvalResult> = weights
                .iter()
                .enumerate()
                .map(|(i, _)| make_result(artifact_id, "provider", &format!("model-{i}"), 0, score))
                .collect();

            let aggregate = aggregate(artifact_id, &results, &judge_weights);
            prop_assert!((aggregate.overall_score - score).abs() < 1e-9);
        }
    }
}
