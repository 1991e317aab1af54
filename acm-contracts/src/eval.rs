//! `EvalResult` entity and the rubric it is scored against (spec.md §3, §4.3).

use crate::ids::{ArtifactId, EvalResultId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single weighted rubric criterion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub min_score: i32,
    pub max_score: i32,
}

impl Criterion {
    pub fn new(name: impl Into<String>, description: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight,
            min_score: 1,
            max_score: 10,
        }
    }
}

/// Default rubric (spec.md §4.3): accuracy 0.30, completeness 0.25,
/// clarity 0.20, relevance 0.15, formatting 0.10.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rubric {
    pub criteria: Vec<Criterion>,
}

impl Default for Rubric {
    fn default() -> Self {
        Self {
            criteria: vec![
                Criterion::new("accuracy", "Factual correctness of claims made", 0.30),
                Criterion::new(
                    "completeness",
                    "Coverage of the source material's key points",
                    0.25,
                ),
                Criterion::new("clarity", "Readability and logical flow", 0.20),
                Criterion::new("relevance", "Focus on the requested topic", 0.15),
                Criterion::new("formatting", "Structure, headings, and markdown hygiene", 0.10),
            ],
        }
    }
}

impl Rubric {
    /// `overall = Σ(criterion_score × criterion_weight) / Σ(weights)`
    /// (spec.md §3 invariant). `scores` must contain every criterion name;
    /// callers validate that before calling this.
    pub fn weighted_overall(&self, scores: &std::collections::HashMap<String, i32>) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for criterion in &self.criteria {
            if let Some(&score) = scores.get(&criterion.name) {
                numerator += f64::from(score) * criterion.weight;
                denominator += criterion.weight;
            }
        }
        if denominator == 0.0 {
            0.0
        } else {
            numerator / denominator
        }
    }
}

/// Confidence label derived from the standard deviation of per-iteration
/// scores (spec.md §4.3): high (σ<0.5), medium (0.5≤σ≤1.0), low (σ>1.0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    High,
    Medium,
    Low,
}

impl ConfidenceLabel {
    pub fn from_stddev(stddev: f64) -> Self {
        if stddev < 0.5 {
            ConfidenceLabel::High
        } else if stddev <= 1.0 {
            ConfidenceLabel::Medium
        } else {
            ConfidenceLabel::Low
        }
    }
}

/// One judge-iteration score on one artifact (spec.md §3). Immutable once
/// created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub id: EvalResultId,
    pub artifact_id: ArtifactId,
    pub judge_provider: String,
    pub judge_model: String,
    pub iteration: u32,
    pub criterion_scores: std::collections::HashMap<String, i32>,
    pub overall: f64,
    pub reasoning: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub duration_seconds: f64,
    pub created_at: DateTime<Utc>,
}

/// Per-(artifact, judge) aggregate over K iterations, and the
/// per-artifact aggregate across judges (spec.md §4.3 "Aggregation").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeAggregate {
    pub judge_provider: String,
    pub judge_model: String,
    pub mean: f64,
    pub stddev: f64,
    pub confidence: ConfidenceLabel,
    pub iterations_scored: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEvalAggregate {
    pub artifact_id: ArtifactId,
    pub per_judge: Vec<JudgeAggregate>,
    /// Weighted mean across judges using configured judge weights.
    pub overall_score: f64,
    pub confidence: ConfidenceLabel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn weighted_overall_matches_manual_computation() {
        let rubric = Rubric::default();
        let mut scores = HashMap::new();
        scores.insert("accuracy".to_string(), 9);
        scores.insert("completeness".to_string(), 8);
        scores.insert("clarity".to_string(), 7);
        scores.insert("relevance".to_string(), 9);
        scores.insert("formatting".to_string(), 6);

        let expected =
            (9.0 * 0.30 + 8.0 * 0.25 + 7.0 * 0.20 + 9.0 * 0.15 + 6.0 * 0.10) / 1.0;
        let got = rubric.weighted_overall(&scores);
        assert!((got - expected).abs() < 1e-9);
    }

    #[test]
    fn confidence_label_boundaries() {
        assert_eq!(ConfidenceLabel::from_stddev(0.49), ConfidenceLabel::High);
        assert_eq!(ConfidenceLabel::from_stddev(0.5), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_stddev(1.0), ConfidenceLabel::Medium);
        assert_eq!(ConfidenceLabel::from_stddev(1.01), ConfidenceLabel::Low);
    }
}
