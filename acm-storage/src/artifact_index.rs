//! The artifact index: a queryable `(document_id, content_hash, config_hash,
//! generator, iteration) -> Artifact` map backing skip logic (spec.md §4.6,
//! §9 "Skip index on restart"). Rebuildable from the artifacts table by
//! replaying `record`, since the index itself is never the source of truth.

use acm_contracts::{Artifact, ArtifactGenerator, ArtifactStatus, DocumentId};
use dashmap::DashMap;
use std::sync::Arc;

/// The key uniqueness tuple from spec.md §4.6. Combined artifacts have no
/// `document_id` and are never consulted for skip decisions, so they are
/// simply never inserted into this index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub document_id: DocumentId,
    pub content_hash: String,
    pub config_hash: String,
    pub generator: ArtifactGenerator,
    pub iteration: u32,
}

impl ArtifactKey {
    /// Returns `None` for combined artifacts (no document id) or artifacts
    /// with no config hash, neither of which participate in skip logic.
    pub fn from_artifact(artifact: &Artifact) -> Option<Self> {
        let document_id = artifact.document_id()?;
        let config_hash = artifact.config_hash.clone()?;
        Some(Self {
            document_id,
            content_hash: artifact.content_hash.clone(),
            config_hash,
            generator: artifact.generator,
            iteration: artifact.iteration,
        })
    }
}

/// In-memory, concurrency-safe artifact index. One instance is shared across
/// the run; it is populated as artifacts complete and consulted before each
/// generation task is dispatched.
#[derive(Default)]
pub struct ArtifactIndex {
    by_key: DashMap<ArtifactKey, Artifact>,
}

impl ArtifactIndex {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Rebuilds the index from a full artifact list, e.g. on executor
    /// restart after a crash. Later entries win ties on the same key.
    pub fn rebuild(artifacts: impl IntoIterator<Item = Artifact>) -> Arc<Self> {
        let index = Self::default();
        for artifact in artifacts {
            index.record(artifact);
        }
        Arc::new(index)
    }

    pub fn record(&self, artifact: Artifact) {
        if let Some(key) = ArtifactKey::from_artifact(&artifact) {
            self.by_key.insert(key, artifact);
        }
    }

    pub fn lookup(&self, key: &ArtifactKey) -> Option<Artifact> {
        self.by_key.get(key).map(|entry| entry.value().clone())
    }

    /// Skip hit iff a matching entry exists with `status == Completed`
    /// (spec.md §4.6). Callers apply the `force` override themselves.
    pub fn has_completed(&self, key: &ArtifactKey) -> bool {
        self.by_key
            .get(key)
            .map(|entry| entry.value().status == ArtifactStatus::Completed)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acm_contracts::{ArtifactId, ArtifactMetadata, ArtifactOrigin, RunId};
    use chrono::Utc;

    fn artifact(content_hash: &str, config_hash: &str, status: ArtifactStatus) -> Artifact {
        Artifact {
            id: ArtifactId::new(),
            run_id: RunId::new(),
            origin: ArtifactOrigin::Document(DocumentId::new()),
            generator: ArtifactGenerator::Fpf,
            iteration: 1,
            storage_path: "runs/r1/doc1/fpf-1.md".to_string(),
            content_hash: content_hash.to_string(),
            config_hash: Some(config_hash.to_string()),
            status,
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn records_and_finds_by_key() {
        let index = ArtifactIndex::new();
        let a = artifact("c1", "g1", ArtifactStatus::Completed);
        let key = ArtifactKey::from_artifact(&a).unwrap();
        index.record(a);
        assert!(index.has_completed(&key));
    }

    #[test]
    fn does_not_skip_on_incomplete_status() {
        let index = ArtifactIndex::new();
        let a = artifact("c1", "g1", ArtifactStatus::Failed);
        let key = ArtifactKey::from_artifact(&a).unwrap();
        index.record(a);
        assert!(!index.has_completed(&key));
    }

    #[test]
    fn combined_artifacts_are_never_indexed() {
        let index = ArtifactIndex::new();
        let combined = Artifact {
            id: ArtifactId::new(),
            run_id: RunId::new(),
            origin: ArtifactOrigin::Combined {
                source_artifact_ids: vec![ArtifactId::new()],
            },
            generator: ArtifactGenerator::Combine,
            iteration: 1,
            storage_path: "runs/r1/combined.md".to_string(),
            content_hash: "c2".to_string(),
            config_hash: None,
            status: ArtifactStatus::Completed,
            metadata: ArtifactMetadata::default(),
            created_at: Utc::now(),
        };
        assert!(ArtifactKey::from_artifact(&combined).is_none());
        index.record(combined);
        assert!(index.is_empty());
    }

    #[test]
    fn rebuild_restores_entries() {
        let a = artifact("c1", "g1", ArtifactStatus::Completed);
        let key = ArtifactKey::from_artifact(&a).unwrap();
        let index = ArtifactIndex::rebuild(vec![a]);
        assert!(index.has_completed(&key));
        assert_eq!(index.len(), 1);
    }
}
