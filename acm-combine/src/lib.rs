//! Combiner (spec.md §4.5): synthesizes one document from a set of
//! candidate artifacts via one of five strategies. Reads only from
//! artifacts; the only strategy that invokes a model is `intelligent_merge`.

pub mod model;
pub mod sources;
pub mod strategies;

use acm_eval::JudgeClient;
use std::sync::Arc;

pub use model::{CombineCandidate, CombineMetrics, CombineResult, CombineStrategy, Contribution};
pub use sources::{dedupe_sources, normalize_url, render_references_block};
pub use strategies::best_of_n::{self, BestOfNConfig, TieBreaker};
pub use strategies::concatenate::{self, ConcatenateConfig};
pub use strategies::intelligent_merge::{self, IntelligentMergeConfig};
pub use strategies::section_assembly::{self, MissingSectionPolicy, SectionAssemblyConfig};
pub use strategies::weighted_blend::{self, BlendLevel, WeightedBlendConfig};

/// Per-strategy configuration, selected by the run's combiner settings
/// (spec.md §4.5's config table). `IntelligentMerge` carries no config here
/// because it also needs a `JudgeClient`, supplied separately to `combine`.
#[derive(Debug, Clone)]
pub enum CombineConfig {
    Concatenate(ConcatenateConfig),
    BestOfN(BestOfNConfig),
    SectionAssembly(SectionAssemblyConfig),
    IntelligentMerge(IntelligentMergeConfig),
    WeightedBlend(WeightedBlendConfig),
}

/// Dispatches to the configured strategy. `merger` is only consulted for
/// `IntelligentMerge`; pass any client (even one that's never called) for
/// the other strategies.
pub async fn combine(
    candidates: Vec<CombineCandidate>,
    config: CombineConfig,
    merger: Arc<dyn JudgeClient>,
) -> CombineResult {
    match config {
        CombineConfig::Concatenate(cfg) => concatenate::combine(candidates, &cfg),
        CombineConfig::BestOfN(cfg) => best_of_n::combine(candidates, &cfg),
        CombineConfig::SectionAssembly(cfg) => section_assembly::combine(candidates, &cfg),
        CombineConfig::WeightedBlend(cfg) => weighted_blend::combine(candidates, &cfg),
        CombineConfig::IntelligentMerge(cfg) => intelligent_merge::combine(candidates, &cfg, merger).await,
    }
}
