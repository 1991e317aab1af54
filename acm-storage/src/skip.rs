//! Skip-decision logic (spec.md §4.6): "Skip hit iff
//! `(document_id, content_hash, config_hash, generator, iteration)` exists
//! in the artifact index with `status = completed` AND `force` is not set."

use crate::artifact_index::{ArtifactIndex, ArtifactKey};
use crate::hashing::{config_hash, content_hash};
use acm_contracts::{ArtifactGenerator, DocumentId, GeneratorConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    /// A completed artifact already satisfies this task; re-run it.
    Skip,
    /// No matching completed artifact, or `force` overrode one that exists.
    Run,
}

/// Evaluates whether a generation task can be skipped.
///
/// `force` always wins regardless of index state: it is the caller's
/// explicit request to re-run, never a hint.
pub fn decide(
    index: &ArtifactIndex,
    document_id: DocumentId,
    document_content: &str,
    generator: ArtifactGenerator,
    config: &GeneratorConfig,
    force: bool,
) -> SkipDecision {
    if force {
        return SkipDecision::Run;
    }
    let key = ArtifactKey {
        document_id,
        content_hash: content_hash(document_content),
        config_hash: config_hash(config),
        generator,
        iteration: config.iteration,
    };
    if index.has_completed(&key) {
        SkipDecision::Skip
    } else {
        SkipDecision::Run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_contracts::{ArtifactId, ArtifactMetadata, ArtifactOrigin, ArtifactStatus, RunId};
    use chrono::Utc;
    use std::collections::HashMap;

    fn config() -> GeneratorConfig {
        GeneratorConfig {
            provider: "openai".to_string(),
            model: "gpt-5".to_string(),
            iteration: 1,
            temperature: 0.3,
            instructions_hash: "ih".to_string(),
            guidelines_hash: "gh".to_string(),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn runs_when_index_empty() {
        let index = ArtifactIndex::new();
        let decision = decide(
            &index,
            DocumentId::new(),
            "body",
            ArtifactGenerator::Fpf,
            &config(),
            false,
        );
        assert_eq!(decision, SkipDecision::Run);
    }

    #[test]
    fn skips_when_matching_completed_artifact_exists() {
        let index = ArtifactIndex::new();
        let document_id = DocumentId::new();
        let cfg = config();
        let artifact = acm_contracts::Artifact {
            id: ArtifactId::new(),
            run_id: RunId::new(),
            origin: ArtifactOrigin::Document(document_id),
            generator: ArtifactGenerator::Fpf,
            iteration: cfg.iteration,
            storage_path: "runs/r1/doc1/fpf-1.md".to_string(),
            content_hash: content_hash("body"),
            config_hash: Some(config_hash(&cfg)),
            status: ArtifactStatus::Completed,
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        };
        index.record(artifact);

        let decision = decide(&index, document_id, "body", ArtifactGenerator::Fpf, &cfg, false);
        assert_eq!(decision, SkipDecision::Skip);
    }

    #[test]
    fn force_overrides_a_skip_hit() {
        let index = ArtifactIndex::new();
        let document_id = DocumentId::new();
        let cfg = config();
        let artifact = acm_contracts::Artifact {
            id: ArtifactId::new(),
            run_id: RunId::new(),
            origin: ArtifactOrigin::Document(document_id),
            generator: ArtifactGenerator::Fpf,
            iteration: cfg.iteration,
            storage_path: "runs/r1/doc1/fpf-1.md".to_string(),
            content_hash: content_hash("body"),
            config_hash: Some(config_hash(&cfg)),
            status: ArtifactStatus::Completed,
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        };
        index.record(artifact);

        let decision = decide(&index, document_id, "body", ArtifactGenerator::Fpf, &cfg, true);
        assert_eq!(decision, SkipDecision::Run);
    }

    #[test]
    fn changed_content_does_not_skip() {
        let index = ArtifactIndex::new();
        let document_id = DocumentId::new();
        let cfg = config();
        let artifact = acm_contracts::Artifact {
            id: ArtifactId::new(),
            run_id: RunId::new(),
            origin: ArtifactOrigin::Document(document_id),
            generator: ArtifactGenerator::Fpf,
            iteration: cfg.iteration,
            storage_path: "runs/r1/doc1/fpf-1.md".to_string(),
            content_hash: content_hash("body v1"),
            config_hash: Some(config_hash(&cfg)),
            status: ArtifactStatus::Completed,
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        };
        index.record(artifact);

        let decision = decide(
            &index,
            document_id,
            "body v2",
            ArtifactGenerator::Fpf,
            &cfg,
            false,
        );
        assert_eq!(decision, SkipDecision::Run);
    }
}
