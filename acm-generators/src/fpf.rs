//! FPF adapter (spec.md §4.2.1): wraps an external content-generation
//! subprocess that consumes a JSON batch on stdin and emits newline-delimited
//! JSON events on stdout.

use crate::adapter::{
    send_progress, GenerationMetadata, GenerationOutcome, GenerationRequest, GeneratorAdapter,
    ProgressEvent, ProgressSink,
};
use crate::subprocess::{AttemptOutcome, ExitClassifier, SubprocessConfig, SubprocessRunner};
use acm_contracts::{AcmError, ErrorKind};
use acm_storage::StorageProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Serialize)]
struct FpfRunSpec {
    provider: String,
    model: String,
    temperature: f32,
    iteration: u32,
    instructions: String,
}

#[derive(Serialize)]
struct FpfBatchPayload {
    runs: Vec<FpfRunSpec>,
    file_a: String,
    file_b: Option<String>,
    output_dir: String,
}

/// A parsed line of FPF's ndjson event stream. Unknown event types are
/// tolerated; only `run_complete` carries the information the adapter needs.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum FpfEvent {
    RunComplete {
        ok: bool,
        path: Option<String>,
        model: Option<String>,
        #[serde(default)]
        has_grounding: bool,
        #[serde(default)]
        has_reasoning: bool,
    },
    #[serde(other)]
    Other,
}

struct FpfClassifier;

impl ExitClassifier for FpfClassifier {
    fn classify(&self, outcome: &AttemptOutcome) -> Result<(), ErrorKind> {
        if outcome.timed_out {
            return Err(ErrorKind::Timeout);
        }
        match outcome.exit_code {
            Some(0) => Ok(()),
            Some(1) => Err(ErrorKind::GroundingMissing),
            Some(2) => Err(ErrorKind::ReasoningMissing),
            Some(3) => Err(ErrorKind::GroundingMissing),
            Some(4) => Err(ErrorKind::InvalidOutput),
            _ => Err(ErrorKind::ProcessError),
        }
    }
}

pub struct FpfAdapter {
    binary_path: String,
    config_path: String,
    storage: Arc<dyn StorageProvider>,
    subprocess: SubprocessRunner,
}

impl FpfAdapter {
    pub fn new(
        binary_path: impl Into<String>,
        config_path: impl Into<String>,
        storage: Arc<dyn StorageProvider>,
        subprocess_config: SubprocessConfig,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            config_path: config_path.into(),
            storage,
            subprocess: SubprocessRunner::new(subprocess_config),
        }
    }

    /// Prepends an escalating reinforcement preamble to the base
    /// instructions. `attempt` is 1-indexed; attempt 1 gets no
    /// reinforcement, each subsequent attempt is progressively stronger
    /// (spec.md §4.2.1: "each with a progressively stronger instructions
    /// preamble"). Reinforces both grounding and reasoning unconditionally,
    /// since a prior attempt may have been missing either or both (exit
    /// codes 1-3).
    fn reinforced_instructions(base: &str, attempt: u32) -> String {
        if attempt <= 1 {
            return base.to_string();
        }
        let emphasis = "MUST".repeat((attempt - 1) as usize);
        format!(
            "{emphasis} include explicit grounding citations AND step-by-step reasoning \
             in the response. This is attempt {attempt}; a prior attempt omitted a \
             required element.\n\n{base}"
        )
    }
}

#[async_trait]
impl GeneratorAdapter for FpfAdapter {
    fn name(&self) -> &'static str {
        "fpf"
    }

    fn max_concurrent(&self) -> usize {
        2
    }

    async fn health_check(&self) -> bool {
        tokio::process::Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        progress: ProgressSink,
        deadline: Instant,
    ) -> GenerationOutcome {
        let started = std::time::Instant::now();
        send_progress(&progress, ProgressEvent::Started);

        let output_dir = format!("runs/fpf-{}", Uuid::new_v4());
        let input_path = format!("{output_dir}/input.md");
        if let Err(e) = self
            .storage
            .write(&input_path, request.document_content.as_bytes(), "fpf input")
            .await
        {
            return GenerationOutcome::failure(
                AcmError::new(ErrorKind::ProcessError, format!("failed to stage input: {e}")),
                GenerationMetadata {
                    provider: request.config.provider.clone(),
                    model: request.config.model.clone(),
                    iteration: request.config.iteration,
                    duration_seconds: started.elapsed().as_secs_f64(),
                    ..Default::default()
                },
            );
        }

        let last_run_complete: Option<FpfEvent>;
        let binary_path = self.binary_path.clone();
        let config_path = self.config_path.clone();
        let output_dir_for_attempts = output_dir.clone();
        let base_instructions = format!(
            "instructions_hash:{} guidelines_hash:{}",
            request.config.instructions_hash, request.config.guidelines_hash
        );
        let input_path_for_attempts = input_path.clone();
        let request_config = request.config.clone();

        let on_line_capture: std::cell::RefCell<Option<FpfEvent>> = std::cell::RefCell::new(None);

        send_progress(&progress, ProgressEvent::LlmCallStart);
        let classifier = FpfClassifier;
        let result = self
            .subprocess
            .run_with_retries_and_stdin_by(
                deadline,
                || {
                    let mut cmd = Command::new(&binary_path);
                    cmd.arg("--config").arg(&config_path).arg("--stdin-json");
                    cmd
                },
                |attempt| {
                    let instructions = Self::reinforced_instructions(&base_instructions, attempt);
                    let payload = FpfBatchPayload {
                        runs: vec![FpfRunSpec {
                            provider: request_config.provider.clone(),
                            model: request_config.model.clone(),
                            temperature: request_config.temperature,
                            iteration: request_config.iteration,
                            instructions,
                        }],
                        file_a: input_path_for_attempts.clone(),
                        file_b: None,
                        output_dir: output_dir_for_attempts.clone(),
                    };
                    serde_json::to_vec(&payload).ok()
                },
                &classifier,
                |line| {
                    debug!(line, "fpf event");
                    if let Ok(event) = serde_json::from_str::<FpfEvent>(line) {
                        if matches!(event, FpfEvent::RunComplete { .. }) {
                            *on_line_capture.borrow_mut() = Some(event);
                        }
                    }
                },
            )
            .await;

        last_run_complete = on_line_capture.into_inner();

        match result {
            Ok(_) => {
                let metadata = GenerationMetadata {
                    provider: request.config.provider.clone(),
                    model: request.config.model.clone(),
                    iteration: request.config.iteration,
                    duration_seconds: started.elapsed().as_secs_f64(),
                    ..Default::default()
                };
                match last_run_complete {
                    Some(FpfEvent::RunComplete {
                        ok: true,
                        path: Some(path),
                        model,
                        has_grounding,
                        ..
                    }) => {
                        if !has_grounding {
                            send_progress(&progress, ProgressEvent::Failed);
                            return GenerationOutcome::failure(
                                AcmError::new(
                                    ErrorKind::GroundingMissing,
                                    "exit 0 but grounding metadata absent; reclassified per §4.2.1",
                                ),
                                metadata,
                            );
                        }
                        send_progress(&progress, ProgressEvent::LlmCallComplete);
                        send_progress(&progress, ProgressEvent::Writing);
                        match self.storage.read(&path).await {
                            Ok(read) => {
                                let mut metadata = metadata;
                                metadata.model = model.unwrap_or(metadata.model);
                                send_progress(&progress, ProgressEvent::Completed);
                                GenerationOutcome::success(
                                    String::from_utf8_lossy(&read.bytes).to_string(),
                                    metadata,
                                )
                                .enforce_content_presence()
                            }
                            Err(e) => {
                                send_progress(&progress, ProgressEvent::Failed);
                                GenerationOutcome::failure(
                                    AcmError::new(
                                        ErrorKind::ProcessError,
                                        format!("failed to read generated output: {e}"),
                                    ),
                                    metadata,
                                )
                            }
                        }
                    }
                    _ => {
                        send_progress(&progress, ProgressEvent::Failed);
                        GenerationOutcome::failure(
                            AcmError::new(
                                ErrorKind::InvalidOutput,
                                "subprocess exited successfully but no run_complete event observed",
                            ),
                            metadata,
                        )
                    }
                }
            }
            Err(error) => {
                warn!(kind = %error.code, "fpf generation failed");
                send_progress(&progress, ProgressEvent::Failed);
                GenerationOutcome::failure(
                    error,
                    GenerationMetadata {
                        provider: request.config.provider.clone(),
                        model: request.config.model.clone(),
                        iteration: request.config.iteration,
                        duration_seconds: started.elapsed().as_secs_f64(),
                        ..Default::default()
                    },
                )
            }
        }
    }
}
