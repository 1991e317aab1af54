//! The combiner's strategy-agnostic result contract (spec.md §4.5).

use acm_contracts::{ArtifactId, Source};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineStrategy {
    Concatenate,
    BestOfN,
    SectionAssembly,
    IntelligentMerge,
    WeightedBlend,
}

impl std::fmt::Display for CombineStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CombineStrategy::Concatenate => "concatenate",
            CombineStrategy::BestOfN => "best_of_n",
            CombineStrategy::SectionAssembly => "section_assembly",
            CombineStrategy::IntelligentMerge => "intelligent_merge",
            CombineStrategy::WeightedBlend => "weighted_blend",
        };
        write!(f, "{s}")
    }
}

/// Why a given source artifact was included, excluded, or weighted the way
/// it was, surfaced for auditability (spec.md §4.5 "per-artifact
/// contributions with reasons").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contribution {
    pub artifact_id: ArtifactId,
    pub included: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombineMetrics {
    pub total_input_length: usize,
    pub output_length: usize,
    pub compression_ratio: f64,
    pub duration_seconds: f64,
    pub merge_cost: Option<f64>,
}

impl CombineMetrics {
    pub fn compute(total_input_length: usize, output_length: usize, duration_seconds: f64) -> Self {
        let compression_ratio = if total_input_length == 0 {
            0.0
        } else {
            output_length as f64 / total_input_length as f64
        };
        Self {
            total_input_length,
            output_length,
            compression_ratio,
            duration_seconds,
            merge_cost: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineResult {
    pub combined_content: String,
    pub strategy_used: CombineStrategy,
    pub source_artifact_ids: Vec<ArtifactId>,
    pub contributions: Vec<Contribution>,
    pub sources: Vec<Source>,
    pub metrics: CombineMetrics,
    pub success: bool,
    pub warnings: Vec<String>,
}

impl CombineResult {
    pub fn failure(strategy: CombineStrategy, warnings: Vec<String>) -> Self {
        Self {
            combined_content: String::new(),
            strategy_used: strategy,
            source_artifact_ids: Vec::new(),
            contributions: Vec::new(),
            sources: Vec::new(),
            metrics: CombineMetrics::default(),
            success: false,
            warnings,
        }
    }
}

/// One artifact as seen by the combiner: just what it reads, never what it
/// invokes (spec.md §4.5 invariant: "the combiner reads only from
/// artifacts").
#[derive(Debug, Clone)]
pub struct CombineCandidate {
    pub artifact_id: ArtifactId,
    pub content: String,
    pub document_order: u32,
    pub sections: std::collections::HashMap<String, String>,
    pub sources: Vec<Source>,
    pub score: Option<f64>,
}
