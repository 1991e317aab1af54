//! Shared data model, error taxonomy, and timeline events for the ACM run
//! execution pipeline.
//!
//! This crate has no async runtime dependency and no knowledge of storage,
//! subprocess, or HTTP concerns — it is the value layer every other crate in
//! the workspace builds on.

pub mod artifact;
pub mod document;
pub mod elo;
pub mod error;
pub mod eval;
pub mod events;
pub mod generation_task;
pub mod ids;
pub mod pairwise;
pub mod run;

pub use artifact::{
    Artifact, ArtifactGenerator, ArtifactMetadata, ArtifactOrigin, ArtifactStatus, Source,
};
pub use document::{Document, RunDocument, RunDocumentStatus, SourceRef};
pub use elo::{EloPool, EloRating, RatingHistoryEntry};
pub use error::{AcmError, ErrorKind};
pub use eval::{ArtifactEvalAggregate, ConfidenceLabel, Criterion, EvalResult, JudgeAggregate, Rubric};
pub use events::{Phase, TimelineEvent};
pub use generation_task::{GenerationTask, TaskStatus};
pub use ids::{
    ArtifactId, DocumentId, EvalResultId, GenerationTaskId, PairwiseComparisonId, RunId,
};
pub use pairwise::{PairwiseComparison, Winner};
pub use run::{
    GeneratorConfig, GeneratorKind, GeneratorPlanEntry, Run, RunConfig, RunStatus, RunSummary,
};
