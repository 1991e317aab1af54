//! GPT-R (research) adapter (spec.md §4.2.2): wraps a research-style
//! subprocess that accepts a prompt-file path and a report-type flag, model
//! selection flowing through `SMART_LLM`/`FAST_LLM`/`STRATEGIC_LLM` env vars.

use crate::adapter::{
    send_progress, GenerationMetadata, GenerationOutcome, GenerationRequest, GeneratorAdapter,
    ProgressEvent, ProgressSink,
};
use crate::subprocess::{AttemptOutcome, ExitClassifier, SubprocessConfig, SubprocessRunner};
use acm_contracts::{AcmError, ErrorKind};
use acm_storage::StorageProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct GptrFinalLine {
    path: String,
    model: Option<String>,
}

/// Model selection env vars, populated from `GeneratorConfig` (spec.md §4.2.2).
#[derive(Debug, Clone)]
pub struct GptrModelEnv {
    pub smart_llm: String,
    pub fast_llm: String,
    pub strategic_llm: String,
}

struct GptrClassifier;

fn mentions_prompt_file_not_found(lines: &[String]) -> bool {
    lines
        .iter()
        .any(|l| l.to_lowercase().contains("prompt file not found"))
}

impl ExitClassifier for GptrClassifier {
    fn classify(&self, outcome: &AttemptOutcome) -> Result<(), ErrorKind> {
        if outcome.timed_out {
            return Err(ErrorKind::Timeout);
        }
        if outcome.exit_code == Some(0) {
            return Ok(());
        }
        if mentions_prompt_file_not_found(&outcome.stdout_lines)
            || mentions_prompt_file_not_found(&outcome.stderr_lines)
        {
            // transient race between writing the prompt file and spawning
            // the subprocess; ProcessError is single-shot retryable.
            return Err(ErrorKind::ProcessError);
        }
        let haystack: String = outcome
            .stderr_lines
            .iter()
            .chain(outcome.stdout_lines.iter())
            .map(|l| l.to_lowercase())
            .collect::<Vec<_>>()
            .join("\n");
        if haystack.contains("rate limit") {
            Err(ErrorKind::RateLimited)
        } else if haystack.contains("unauthorized") || haystack.contains("auth") {
            Err(ErrorKind::AuthError)
        } else if haystack.contains("timed out") {
            Err(ErrorKind::Timeout)
        } else {
            Err(ErrorKind::Unknown)
        }
    }
}

pub struct GptrAdapter {
    binary_path: String,
    report_type: String,
    storage: Arc<dyn StorageProvider>,
    subprocess: SubprocessRunner,
}

impl GptrAdapter {
    pub fn new(
        binary_path: impl Into<String>,
        report_type: impl Into<String>,
        storage: Arc<dyn StorageProvider>,
        subprocess_config: SubprocessConfig,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            report_type: report_type.into(),
            storage,
            subprocess: SubprocessRunner::new(subprocess_config),
        }
    }

    fn model_env(config: &acm_contracts::GeneratorConfig) -> GptrModelEnv {
        let model = config.model.clone();
        GptrModelEnv {
            smart_llm: config
                .extra
                .get("smart_llm")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| model.clone()),
            fast_llm: config
                .extra
                .get("fast_llm")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| model.clone()),
            strategic_llm: config
                .extra
                .get("strategic_llm")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or(model),
        }
    }
}

#[async_trait]
impl GeneratorAdapter for GptrAdapter {
    fn name(&self) -> &'static str {
        "gptr"
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

        let prompt_path = format!("runs/gptr-{}/prompt.txt", Uuid::new_v4());
        if let Err(e) = self
            .storage
            .write(&prompt_path, request.document_content.as_bytes(), "gptr prompt")
            .await
        {
            return GenerationOutcome::failure(
                AcmError::new(
                    ErrorKind::ProcessError,
                    format!("failed to stage prompt file: {e}"),
                ),
                metadata_for(request, started),
            );
        }

        let env = Self::model_env(&request.config);
        let binary_path = self.binary_path.clone();
        let report_type = self.report_type.clone();
        let prompt_path_for_attempts = prompt_path.clone();
        let env_for_attempts = env.clone();

        let final_line = std::cell::RefCell::new(None::<String>);

        send_progress(&progress, ProgressEvent::LlmCallStart);
        let classifier = GptrClassifier;
        let result = self
            .subprocess
            .run_with_retries_by(
                deadline,
                || {
                    let mut cmd = Command::new(&binary_path);
                    cmd.arg("--prompt-file")
                        .arg(&prompt_path_for_attempts)
                        .arg("--report-type")
                        .arg(&report_type)
                        .env("SMART_LLM", &env_for_attempts.smart_llm)
                        .env("FAST_LLM", &env_for_attempts.fast_llm)
                        .env("STRATEGIC_LLM", &env_for_attempts.strategic_llm);
                    cmd
                },
                &classifier,
                |line| {
                    debug!(line, "gptr progress");
                    *final_line.borrow_mut() = Some(line.to_string());
                },
            )
            .await;

        let final_line = final_line.into_inner();

        match result {
            Ok(_) => {
                let metadata = metadata_for(request, started);
                let parsed = final_line
                    .as_deref()
                    .and_then(|l| serde_json::from_str::<GptrFinalLine>(l).ok());
                match parsed {
                    Some(GptrFinalLine { path, model }) => {
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
                                        format!("failed to read generated report: {e}"),
                                    ),
                                    metadata,
                                )
                            }
                        }
                    }
                    None => {
                        send_progress(&progress, ProgressEvent::Failed);
                        GenerationOutcome::failure(
                            AcmError::new(
                                ErrorKind::InvalidOutput,
                                "subprocess exited successfully but no final JSON line observed",
                            ),
                            metadata,
                        )
                    }
                }
            }
            Err(error) => {
                warn!(kind = %error.code, "gptr generation failed");
                send_progress(&progress, ProgressEvent::Failed);
                GenerationOutcome::failure(error, metadata_for(request, started))
            }
        }
    }
}

fn metadata_for(request: &GenerationRequest, started: std::time::Instant) -> GenerationMetadata {
    GenerationMetadata {
        provider: request.config.provider.clone(),
        model: request.config.model.clone(),
        iteration: request.config.iteration,
        duration_seconds: started.elapsed().as_secs_f64(),
        ..Default::default()
    }
}
