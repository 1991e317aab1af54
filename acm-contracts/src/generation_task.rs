//! `GenerationTask` entity (spec.md §3).

use crate::ids::{DocumentId, GenerationTaskId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }
}

/// In-flight/finished background task state exposed by `status()`
/// (spec.md §4.1, §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationTask {
    pub task_id: GenerationTaskId,
    pub run_id: RunId,
    pub status: TaskStatus,
    pub progress_percent: f32,
    pub documents_total: u32,
    pub documents_completed: u32,
    pub documents_failed: u32,
    pub documents_skipped: u32,
    pub current_document: Option<DocumentId>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl GenerationTask {
    pub fn new(run_id: RunId, documents_total: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: GenerationTaskId::new(),
            run_id,
            status: TaskStatus::Pending,
            progress_percent: 0.0,
            documents_total,
            documents_completed: 0,
            documents_failed: 0,
            documents_skipped: 0,
            current_document: None,
            started_at: now,
            updated_at: now,
            estimated_completion: None,
        }
    }

    pub fn recompute_progress(&mut self) {
        let done = self.documents_completed + self.documents_failed + self.documents_skipped;
        self.progress_percent = if self.documents_total == 0 {
            100.0
        } else {
            (done as f32 / self.documents_total as f32) * 100.0
        };
        self.updated_at = Utc::now();
    }
}
