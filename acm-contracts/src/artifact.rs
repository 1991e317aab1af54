//! `Artifact` entity (spec.md §3).

use crate::ids::{ArtifactId, DocumentId, RunId};
use crate::run::GeneratorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discriminates a generated artifact from a combined one. `generator` is
/// kept as a string column at the persistence boundary (spec.md §6.5: "all
/// enums stored as lowercase strings") but modeled here as a closed enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactGenerator {
    Fpf,
    Gptr,
    Combine,
}

impl From<GeneratorKind> for ArtifactGenerator {
    fn from(kind: GeneratorKind) -> Self {
        match kind {
            GeneratorKind::Fpf => ArtifactGenerator::Fpf,
            GeneratorKind::Gptr => ArtifactGenerator::Gptr,
        }
    }
}

impl std::fmt::Display for ArtifactGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactGenerator::Fpf => "fpf",
            ArtifactGenerator::Gptr => "gptr",
            ArtifactGenerator::Combine => "combine",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactStatus {
    Completed,
    Failed,
}

/// Either a document id, or (for combined artifacts) the ids of the source
/// artifacts that were merged. Exactly one variant is ever populated, which
/// is the invariant from spec.md §3: "Exactly one of (document_id,
/// combined_output_ref) is set on an artifact."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArtifactOrigin {
    Document(DocumentId),
    Combined { source_artifact_ids: Vec<ArtifactId> },
}

/// A web source cited by a generator (e.g. GPT-R), carried through to the
/// combiner's source aggregation/dedup step (spec.md §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub duration_seconds: Option<f64>,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Free-form section metadata used by the `section_assembly` combiner
    /// strategy to locate a named section within this artifact's content.
    pub sections: std::collections::HashMap<String, String>,
    /// Web sources this artifact cited, if any (spec.md §4.5 source
    /// aggregation).
    pub sources: Vec<Source>,
}

/// A generated or combined output (spec.md §3). Never mutated once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub run_id: RunId,
    pub origin: ArtifactOrigin,
    pub generator: ArtifactGenerator,
    pub iteration: u32,
    pub storage_path: String,
    pub content_hash: String,
    /// `None` for combined artifacts — config hashing only applies to
    /// generator-driven artifacts (spec.md §4.6).
    pub config_hash: Option<String>,
    pub status: ArtifactStatus,
    pub metadata: ArtifactMetadata,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn document_id(&self) -> Option<DocumentId> {
        match &self.origin {
            ArtifactOrigin::Document(id) => Some(*id),
            ArtifactOrigin::Combined { .. } => None,
        }
    }

    pub fn is_combined(&self) -> bool {
        matches!(self.origin, ArtifactOrigin::Combined { .. })
    }
}
