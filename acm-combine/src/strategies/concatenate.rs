//! `concatenate` strategy (spec.md §4.5): join candidates with a separator,
//! optional table of contents, ordered by explicit artifact order or
//! document order.

use crate::model::{CombineCandidate, CombineMetrics, CombineResult, CombineStrategy, Contribution};
use crate::sources::{dedupe_sources, render_references_block};
use acm_contracts::ArtifactId;

#[derive(Debug, Clone)]
pub struct ConcatenateConfig {
    pub separator: String,
    pub include_toc: bool,
    /// Explicit ordering by artifact id; falls back to `document_order` when
    /// absent or when an id is missing from the candidate set.
    pub artifact_order: Option<Vec<ArtifactId>>,
    pub include_sources: bool,
}

impl Default for ConcatenateConfig {
    fn default() -> Self {
        Self {
            separator: "\n\n---\n\n".to_string(),
            include_toc: false,
            artifact_order: None,
            include_sources: false,
        }
    }
}

pub fn combine(candidates: Vec<CombineCandidate>, config: &ConcatenateConfig) -> CombineResult {
    let started = std::time::Instant::now();
    if candidates.is_empty() {
        return CombineResult::failure(
            CombineStrategy::Concatenate,
            vec!["no candidates supplied to concatenate".to_string()],
        );
    }

    let ordered = order_candidates(candidates, config.artifact_order.as_deref());
    let total_input_length: usize = ordered.iter().map(|c| c.content.len()).sum();

    let mut content = String::new();
    if config.include_toc {
        content.push_str("## Table of Contents\n\n");
        for (i, candidate) in ordered.iter().enumerate() {
            content.push_str(&format!("{}. Section {}\n", i + 1, i + 1));
        }
        content.push_str("\n---\n\n");
    }

    for (i, candidate) in ordered.iter().enumerate() {
        if i > 0 {
            content.push_str(&config.separator);
        }
        content.push_str(&candidate.content);
    }

    let sources = if config.include_sources {
        let deduped = dedupe_sources(ordered.iter().flat_map(|c| c.sources.clone()));
        content.push_str(&render_references_block(&deduped));
        deduped
    } else {
        Vec::new()
    };

    let contributions = ordered
        .iter()
        .map(|c| Contribution {
            artifact_id: c.artifact_id,
            included: true,
            reason: "concatenated in order".to_string(),
        })
        .collect();

    let output_length = content.len();
    CombineResult {
        source_artifact_ids: ordered.iter().map(|c| c.artifact_id).collect(),
        combined_content: content,
        strategy_used: CombineStrategy::Concatenate,
        contributions,
        sources,
        metrics: CombineMetrics::compute(total_input_length, output_length, started.elapsed().as_secs_f64()),
        success: true,
        warnings: Vec::new(),
    }
}

fn order_candidates(
    mut candidates: Vec<CombineCandidate>,
    artifact_order: Option<&[ArtifactId]>,
) -> Vec<CombineCandidate> {
    match artifact_order {
        Some(order) if order.iter().all(|id| candidates.iter().any(|c| &c.artifact_id == id)) => {
            let mut ordered = Vec::with_capacity(candidates.len());
            for id in order {
                if let Some(pos) = candidates.iter().position(|c| &c.artifact_id == id) {
                    ordered.push(candidates.remove(pos));
                }
            }
            ordered.extend(candidates);
            ordered
        }
        _ => {
            candidates.sort_by_key(|c| c.document_order);
            candidates
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str, order: u32) -> CombineCandidate {
        CombineCandidate {
            artifact_id: ArtifactId::new(),
            content: content.to_string(),
            document_order: order,
            sections: Default::default(),
            sources: Vec::new(),
            score: None,
        }
    }

    #[test]
    fn joins_candidates_with_separator_in_document_order() {
        let candidates = vec![candidate("second", 1), candidate("first", 0)];
        let result = combine(candidates, &ConcatenateConfig::default());
        assert!(result.success);
        assert_eq!(result.combined_content, "first\n\n---\n\nsecond");
    }

    #[test]
    fn explicit_artifact_order_overrides_document_order() {
        let a = candidate("A content", 0);
        let b = candidate("B content", 1);
        let order = vec![b.artifact_id, a.artifact_id];
        let config = ConcatenateConfig {
            artifact_order: Some(order),
            ..Default::default()
        };
        let result = combine(vec![a, b], &config);
        assert_eq!(result.combined_content, "B content\n\n---\n\nA content");
    }

    #[test]
    fn empty_candidates_fail_cleanly() {
        let result = combine(vec![], &ConcatenateConfig::default());
        assert!(!result.success);
    }
}
