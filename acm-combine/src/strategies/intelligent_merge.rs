//! `intelligent_merge` strategy (spec.md §4.5): the one combine strategy
//! allowed to call out to a model. Synthesizes a single document from all
//! candidates via a low-temperature merge prompt.

use crate::model::{CombineCandidate, CombineMetrics, CombineResult, CombineStrategy, Contribution};
use acm_contracts::AcmError;
use acm_eval::JudgeClient;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct IntelligentMergeConfig {
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub merge_instructions: Option<String>,
}

impl Default for IntelligentMergeConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            timeout_seconds: 180,
            merge_instructions: None,
        }
    }
}

fn render_merge_prompt(candidates: &[CombineCandidate], instructions: Option<&str>) -> String {
    let mut prompt = String::from(
        "Merge the following candidate documents into a single coherent document. \
         Preserve all distinct facts and claims; remove redundancy; keep a consistent voice.\n\n",
    );
    if let Some(extra) = instructions {
        prompt.push_str(extra);
        prompt.push_str("\n\n");
    }
    for (i, candidate) in candidates.iter().enumerate() {
        prompt.push_str(&format!("--- Candidate {} ---\n{}\n\n", i + 1, candidate.content));
    }
    prompt.push_str("Respond with only the merged document, no commentary.");
    prompt
}

pub async fn combine(
    candidates: Vec<CombineCandidate>,
    config: &IntelligentMergeConfig,
    merger: Arc<dyn JudgeClient>,
) -> CombineResult {
    let started = std::time::Instant::now();
    if candidates.is_empty() {
        return CombineResult::failure(
            CombineStrategy::IntelligentMerge,
            vec!["no candidates supplied to intelligent_merge".to_string()],
        );
    }

    let total_input_length: usize = candidates.iter().map(|c| c.content.len()).sum();
    let prompt = render_merge_prompt(&candidates, config.merge_instructions.as_deref());

    let merged = match merger.call(&prompt, config.temperature, config.timeout_seconds).await {
        Ok(text) => text,
        Err(error) => {
            warn!(error = %error, "intelligent_merge call failed");
            return CombineResult::failure(
                CombineStrategy::IntelligentMerge,
                vec![format!("merge model call failed: {error}")],
            );
        }
    };

    if merged.trim().is_empty() {
        return CombineResult::failure(
            CombineStrategy::IntelligentMerge,
            vec!["merge model returned empty content".to_string()],
        );
    }

    let contributions = candidates
        .iter()
        .map(|c| Contribution {
            artifact_id: c.artifact_id,
            included: true,
            reason: "considered by merge model".to_string(),
        })
        .collect();

    let output_length = merged.len();
    let merge_cost = Some(started.elapsed().as_secs_f64());

    CombineResult {
        combined_content: merged,
        strategy_used: CombineStrategy::IntelligentMerge,
        source_artifact_ids: candidates.iter().map(|c| c.artifact_id).collect(),
        contributions,
        sources: candidates.iter().flat_map(|c| c.sources.clone()).collect(),
        metrics: {
            let mut metrics = CombineMetrics::compute(total_input_length, output_length, started.elapsed().as_secs_f64());
            metrics.merge_cost = merge_cost;
            metrics
        },
        success: true,
        warnings: Vec::new(),
    }
}
