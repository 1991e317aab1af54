//! Rubric-based single-document evaluator, pairwise evaluator, Elo table,
//! and ranking/top-N selection (spec.md §4.3, §4.4).

pub mod elo;
pub mod judge;
pub mod pairwise;
pub mod ranking;
pub mod single_doc;

pub use elo::EloTable;
pub use judge::{extract_json, parse_with_retry, JudgeClient};
pub use pairwise::{compare, compare_double_run, select_pairs, top_n_filter, PairwiseCandidate};
pub use ranking::{rank_score, select_top_n, sort_ranked, RankedArtifact, RankingInput};
pub use single_doc::{aggregate, clamp_score, evaluate_artifact_with_judge, SingleDocConfig, WeightedJudge};
