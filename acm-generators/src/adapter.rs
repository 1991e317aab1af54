//! The generator adapter contract (spec.md §4.2): a uniform async
//! `generate(document, config, progress_sink, deadline)` interface with two
//! concrete implementations (FPF, GPT-R), each wrapping an external
//! subprocess under the Subprocess Runner.

use acm_contracts::{AcmError, DocumentId, ErrorKind, GeneratorConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Lifecycle events an adapter reports while generating. Cooperative,
/// best-effort — their absence is not itself a failure signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Started,
    LlmCallStart,
    LlmCallComplete,
    Writing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProgressMessage {
    pub event: ProgressEvent,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

impl ProgressMessage {
    pub fn new(event: ProgressEvent) -> Self {
        Self {
            event,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Sink an adapter reports progress into. Sending is best-effort: a closed
/// receiver (no one listening) must never fail generation.
pub type ProgressSink = mpsc::UnboundedSender<ProgressMessage>;

pub fn send_progress(sink: &ProgressSink, event: ProgressEvent) {
    let _ = sink.send(ProgressMessage::new(event));
}

/// Input to a single generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub document_id: DocumentId,
    pub document_content: String,
    pub config: GeneratorConfig,
}

/// Metadata describing how a generation call was fulfilled, regardless of
/// success or failure (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct GenerationMetadata {
    pub provider: String,
    pub model: String,
    pub iteration: u32,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub duration_seconds: f64,
    pub version: Option<String>,
}

/// Result of a `generate` call (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub success: bool,
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub error: Option<AcmError>,
    pub metadata: GenerationMetadata,
}

impl GenerationOutcome {
    pub fn failure(error: AcmError, metadata: GenerationMetadata) -> Self {
        Self {
            success: false,
            content: None,
            content_hash: None,
            error: Some(error),
            metadata,
        }
    }

    pub fn success(content: String, metadata: GenerationMetadata) -> Self {
        let content_hash = acm_storage::content_hash(&content);
        Self {
            success: true,
            content: Some(content),
            content_hash: Some(content_hash),
            error: None,
            metadata,
        }
    }

    /// Enforces the content-presence postcondition (spec.md §4.2, §9): a
    /// `success=true` outcome with empty/whitespace-only content is always
    /// reclassified as `ContentEmpty`, never returned as a falsy-content
    /// success. This is the historically-buggy behavior elevated to a
    /// contract every adapter must run its result through.
    pub fn enforce_content_presence(mut self) -> Self {
        if self.success {
            let is_empty = self
                .content
                .as_deref()
                .map(|c| c.trim().is_empty())
                .unwrap_or(true);
            if is_empty {
                self.success = false;
                self.content = None;
                self.content_hash = None;
                self.error = Some(AcmError::content_empty());
            }
        }
        self
    }
}

/// The generator-adapter capability set (spec.md §9: "implement as an
/// interface with two concrete variants", not duck-typed dispatch).
#[async_trait]
pub trait GeneratorAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Per-generator concurrency ceiling, feeding the per-generator
    /// semaphore (spec.md §5).
    fn max_concurrent(&self) -> usize;

    /// Whether distinct `iteration` values produce independent artifacts
    /// for this adapter (both FPF and GPT-R do).
    fn supports_iterations(&self) -> bool {
        true
    }

    async fn health_check(&self) -> bool;

    /// `deadline` is an absolute wall-clock instant; the adapter MUST
    /// terminate and return before it, even if that means returning a
    /// partial result with `success=false, error_code=Timeout`.
    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: ProgressSink,
        deadline: Instant,
    ) -> GenerationOutcome;
}
