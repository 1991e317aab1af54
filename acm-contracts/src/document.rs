//! `Document` and `RunDocument` entities (spec.md §3).

use crate::ids::{DocumentId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A reference to document content, either inline or held by the external
/// storage capability. The core never interprets the bytes itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceRef {
    /// Content lives at a logical path behind the `StorageProvider`.
    Storage { path: String },
    /// Content is carried inline (small fixtures, tests).
    Inline { content: String },
}

/// Input to generation. Immutable once `content_hash` is populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub source: SourceRef,
    /// Populated on first read; `None` until then (spec.md §3 invariant).
    pub content_hash: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub display_name: String,
}

impl Document {
    pub fn new(source: SourceRef, display_name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            source,
            content_hash: None,
            metadata: HashMap::new(),
            display_name: display_name.into(),
        }
    }
}

/// Per-run document lifecycle status (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunDocumentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl RunDocumentStatus {
    /// Only these transitions are legal (spec.md §4.1).
    pub fn can_transition_to(self, next: RunDocumentStatus) -> bool {
        use RunDocumentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Skipped)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Skipped)
        )
    }
}

/// Per-run document status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDocument {
    pub run_id: RunId,
    pub document_id: DocumentId,
    pub status: RunDocumentStatus,
    pub error: Option<String>,
    pub sort_order: u32,
    pub updated_at: DateTime<Utc>,
}

impl RunDocument {
    pub fn new(run_id: RunId, document_id: DocumentId, sort_order: u32) -> Self {
        Self {
            run_id,
            document_id,
            status: RunDocumentStatus::Pending,
            error: None,
            sort_order,
            updated_at: Utc::now(),
        }
    }

    /// Attempt a status transition, returning an error if illegal.
    pub fn transition(&mut self, next: RunDocumentStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "illegal run-document transition {:?} -> {:?}",
                self.status, next
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}
