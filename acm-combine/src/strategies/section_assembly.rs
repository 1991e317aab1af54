//! `section_assembly` strategy (spec.md §4.5): assemble output from named
//! sections taken across candidates, with configurable missing-section
//! handling.

use crate::model::{CombineCandidate, CombineMetrics, CombineResult, CombineStrategy, Contribution};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingSectionPolicy {
    Skip,
    Placeholder,
    Error,
}

#[derive(Debug, Clone)]
pub struct SectionAssemblyConfig {
    /// Section names in output order, e.g. `["Introduction", "Methodology", "Conclusion"]`.
    pub section_order: Vec<String>,
    pub missing_section: MissingSectionPolicy,
    pub include_headers: bool,
}

/// For each named section, takes it from the first candidate that has it.
pub fn combine(candidates: Vec<CombineCandidate>, config: &SectionAssemblyConfig) -> CombineResult {
    let started = std::time::Instant::now();
    if candidates.is_empty() {
        return CombineResult::failure(
            CombineStrategy::SectionAssembly,
            vec!["no candidates supplied to section_assembly".to_string()],
        );
    }
    if config.section_order.is_empty() {
        return CombineResult::failure(
            CombineStrategy::SectionAssembly,
            vec!["section_order is empty".to_string()],
        );
    }

    let total_input_length: usize = candidates.iter().map(|c| c.content.len()).sum();
    let mut output = String::new();
    let mut contributions_by_artifact: std::collections::HashMap<_, Vec<String>> =
        std::collections::HashMap::new();
    let mut warnings = Vec::new();

    for section_name in &config.section_order {
        let owner = candidates.iter().find(|c| c.sections.contains_key(section_name));
        match owner {
            Some(candidate) => {
                if config.include_headers {
                    output.push_str(&format!("## {section_name}\n\n"));
                }
                output.push_str(&candidate.sections[section_name]);
                output.push_str("\n\n");
                contributions_by_artifact
                    .entry(candidate.artifact_id)
                    .or_default()
                    .push(section_name.clone());
            }
            None => match config.missing_section {
                MissingSectionPolicy::Skip => {
                    warnings.push(format!("section '{section_name}' missing from all candidates, skipped"));
                }
                MissingSectionPolicy::Placeholder => {
                    if config.include_headers {
                        output.push_str(&format!("## {section_name}\n\n"));
                    }
                    output.push_str(&format!("_[{section_name} unavailable]_\n\n"));
                    warnings.push(format!("section '{section_name}' missing, placeholder inserted"));
                }
                MissingSectionPolicy::Error => {
                    return CombineResult::failure(
                        CombineStrategy::SectionAssembly,
                        vec![format!("required section '{section_name}' missing from all candidates")],
                    );
                }
            },
        }
    }

    let contributions = candidates
        .iter()
        .map(|c| match contributions_by_artifact.get(&c.artifact_id) {
            Some(sections) => Contribution {
                artifact_id: c.artifact_id,
                included: true,
                reason: format!("contributed sections: {}", sections.join(", ")),
            },
            None => Contribution {
                artifact_id: c.artifact_id,
                included: false,
                reason: "no sections selected from this candidate".to_string(),
            },
        })
        .collect();

    let source_artifact_ids = contributions_by_artifact.keys().copied().collect();
    let output_length = output.len();
    CombineResult {
        combined_content: output.trim_end().to_string(),
        strategy_used: CombineStrategy::SectionAssembly,
        source_artifact_ids,
        contributions,
        sources: candidates.iter().flat_map(|c| c.sources.clone()).collect(),
        metrics: CombineMetrics::compute(total_input_length, output_length, started.elapsed().as_secs_f64()),
        success: true,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_contracts::ArtifactId;
    use std::collections::HashMap;

    fn candidate(sections: &[(&str, &str)]) -> CombineCandidate {
        let mut map = HashMap::new();
        for (k, v) in sections {
            map.insert(k.to_string(), v.to_string());
        }
        CombineCandidate {
            artifact_id: ArtifactId::new(),
            content: String::new(),
            document_order: 0,
            sections: map,
            sources: Vec::new(),
            score: None,
        }
    }

    #[test]
    fn assembles_sections_from_owning_candidates_in_order() {
        let candidates = vec![
            candidate(&[("Intro", "intro text")]),
            candidate(&[("Conclusion", "conclusion text")]),
        ];
        let config = SectionAssemblyConfig {
            section_order: vec!["Intro".into(), "Conclusion".into()],
            missing_section: MissingSectionPolicy::Skip,
            include_headers: false,
        };
        let result = combine(candidates, &config);
        assert!(result.success);
        assert!(result.combined_content.starts_with("intro text"));
        assert!(result.combined_content.ends_with("conclusion text"));
    }

    #[test]
    fn missing_section_error_policy_fails_combine() {
        let candidates = vec![candidate(&[("Intro", "intro text")])];
        let config = SectionAssemblyConfig {
            section_order: vec!["Intro".into(), "Methodology".into()],
            missing_section: MissingSectionPolicy::Error,
            include_headers: false,
        };
        let result = combine(candidates, &config);
        assert!(!result.success);
    }

    #[test]
    fn missing_section_placeholder_policy_inserts_marker_and_warns() {
        let candidates = vec![candidate(&[("Intro", "intro text")])];
        let config = SectionAssemblyConfig {
            section_order: vec!["Intro".into(), "Methodology".into()],
            missing_section: MissingSectionPolicy::Placeholder,
            include_headers: false,
        };
        let result = combine(candidates, &config);
        assert!(result.success);
        assert!(result.combined_content.contains("Methodology unavailable"));
        assert_eq!(result.warnings.len(), 1);
    }
}
