//! `weighted_blend` strategy (spec.md §4.5): select fragments (paragraph or
//! section level) across candidates by score threshold.

use crate::model::{CombineCandidate, CombineMetrics, CombineResult, CombineStrategy, Contribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendLevel {
    Paragraph,
    Section,
}

#[derive(Debug, Clone)]
pub struct WeightedBlendConfig {
    pub blend_level: BlendLevel,
    pub minimum_score: f64,
    pub separator: String,
}

impl Default for WeightedBlendConfig {
    fn default() -> Self {
        Self {
            blend_level: BlendLevel::Paragraph,
            minimum_score: 0.0,
            separator: "\n\n".to_string(),
        }
    }
}

/// Splits candidate content into fragments at `blend_level` granularity and
/// keeps every fragment from every candidate whose own score meets
/// `minimum_score`. Candidates carry a single document-level score (spec.md's
/// rubric aggregates are per-artifact, not per-fragment), so the threshold
/// gates whole candidates into or out of the blend rather than ranking
/// individual fragments against each other.
pub fn combine(candidates: Vec<CombineCandidate>, config: &WeightedBlendConfig) -> CombineResult {
    let started = std::time::Instant::now();
    if candidates.is_empty() {
        return CombineResult::failure(
            CombineStrategy::WeightedBlend,
            vec!["no candidates supplied to weighted_blend".to_string()],
        );
    }

    let total_input_length: usize = candidates.iter().map(|c| c.content.len()).sum();
    let mut fragments = Vec::new();
    let mut contributions = Vec::new();
    let mut included_ids = Vec::new();
    let mut warnings = Vec::new();

    for candidate in &candidates {
        let passes = candidate.score.map(|s| s >= config.minimum_score).unwrap_or(true);
        if !passes {
            contributions.push(Contribution {
                artifact_id: candidate.artifact_id,
                included: false,
                reason: format!(
                    "score {:.2} below minimum_score {:.2}",
                    candidate.score.unwrap_or_default(),
                    config.minimum_score
                ),
            });
            continue;
        }

        let candidate_fragments: Vec<&str> = match config.blend_level {
            BlendLevel::Paragraph => candidate.content.split("\n\n").filter(|p| !p.trim().is_empty()).collect(),
            BlendLevel::Section => {
                if candidate.sections.is_empty() {
                    warnings.push(format!(
                        "candidate {} has no sections for section-level blend, using whole content",
                        candidate.artifact_id
                    ));
                    vec![candidate.content.as_str()]
                } else {
                    candidate.sections.values().map(|v| v.as_str()).collect()
                }
            }
        };

        if candidate_fragments.is_empty() {
            contributions.push(Contribution {
                artifact_id: candidate.artifact_id,
                included: false,
                reason: "no fragments extracted".to_string(),
            });
            continue;
        }

        fragments.extend(candidate_fragments.into_iter().map(|s| s.to_string()));
        contributions.push(Contribution {
            artifact_id: candidate.artifact_id,
            included: true,
            reason: "score met minimum_score, fragments included".to_string(),
        });
        included_ids.push(candidate.artifact_id);
    }

    if fragments.is_empty() {
        return CombineResult::failure(
            CombineStrategy::WeightedBlend,
            vec!["no candidate met minimum_score for blending".to_string()],
        );
    }

    let combined_content = fragments.join(&config.separator);
    let output_length = combined_content.len();

    CombineResult {
        combined_content,
        strategy_used: CombineStrategy::WeightedBlend,
        source_artifact_ids: included_ids,
        contributions,
        sources: candidates.iter().flat_map(|c| c.sources.clone()).collect(),
        metrics: CombineMetrics::compute(total_input_length, output_length, started.elapsed().as_secs_f64()),
        success: true,
        warnings,
    }
}
