//! Wires a complete run — two documents, two generators, single-doc and
//! pairwise evaluation, and a combine pass — against in-memory storage and
//! deterministic stub adapters/judges. No network, no subprocess, no CLI:
//! this exists to show the executor crate composed end to end, the way the
//! core is meant to be embedded by a host that owns HTTP/UI/storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use acm_combine::{CombineConfig, ConcatenateConfig};
use acm_contracts::{
    AcmError, DocumentId, GeneratorConfig, GeneratorKind, GeneratorPlanEntry, Rubric, RunConfig,
};
use acm_eval::{JudgeClient, SingleDocConfig, WeightedJudge};
use acm_executor::{EventSink, ResolvedDocument, RunExecutor, RunExecutorDeps};
use acm_generators::{
    GenerationMetadata, GenerationOutcome, GenerationRequest, GeneratorAdapter, ProgressSink,
};
use acm_storage::{ArtifactIndex, InMemoryStorage, StorageProvider};
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::info;

/// Deterministic stand-in for the subprocess-backed FPF/GPT-R adapters: no
/// external process, just a templated rewrite of the source document so
/// runs are reproducible and instant.
struct StubAdapter {
    name: &'static str,
    calls: Arc<AtomicU32>,
}

#[async_trait]
impl GeneratorAdapter for StubAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn max_concurrent(&self) -> usize {
        4
    }

    async fn health_check(&self) -> bool {
        true
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
        _progress: ProgressSink,
        _deadline: Instant,
    ) -> GenerationOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = format!(
            "# {} draft (iteration {})\n\n{}\n",
            self.name, request.config.iteration, request.document_content
        );
        GenerationOutcome::success(content, GenerationMetadata {
            provider: request.config.provider.clone(),
            model: request.config.model.clone(),
            iteration: request.config.iteration,
            duration_seconds: 0.01,
            ..GenerationMetadata::default()
        })
        .enforce_content_presence()
    }
}

/// A judge that always hands back the same well-formed score/verdict,
/// skipping any real model call. Good enough to exercise the aggregation
/// and Elo math without a live provider.
struct StubJudge {
    provider: &'static str,
    model: &'static str,
    response: String,
}

#[async_trait]
impl JudgeClient for StubJudge {
    fn provider(&self) -> &str {
        self.provider
    }

    fn model(&self) -> &str {
        self.model
    }

    async fn call(&self, _prompt: &str, _temperature: f32, _timeout_seconds: u64) -> Result<String, AcmError> {
        Ok(self.response.clone())
    }
}

fn score_response() -> String {
    "{\"scores\": {\"accuracy\": 8, \"completeness\": 7, \"clarity\": 8, \"relevance\": 8, \
      \"formatting\": 7}, \"reasoning\": \"clear and on-topic\"}"
        .to_string()
}

fn pairwise_response() -> String {
    "{\"winner\": \"a\", \"confidence\": 0.65, \"reasoning\": \"slightly more complete\"}".to_string()
}

struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn emit(&self, event: acm_contracts::TimelineEvent) {
        info!(
            phase = ?event.phase,
            event = %event.event_type,
            success = event.success,
            "{}",
            event.description
        );
    }
}

fn plan_entry(generator: GeneratorKind, provider: &str, model: &str) -> GeneratorPlanEntry {
    GeneratorPlanEntry {
        generator,
        config: GeneratorConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            iteration: 1,
            temperature: 0.2,
            instructions_hash: "demo-instructions".to_string(),
            guidelines_hash: "demo-guidelines".to_string(),
            extra: HashMap::new(),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let storage: Arc<dyn StorageProvider> = Arc::new(InMemoryStorage::new());
    let artifact_index = ArtifactIndex::new();

    let mut generators: HashMap<GeneratorKind, Arc<dyn GeneratorAdapter>> = HashMap::new();
    generators.insert(
        GeneratorKind::Fpf,
        Arc::new(StubAdapter { name: "fpf", calls: Arc::new(AtomicU32::new(0)) }),
    );
    generators.insert(
        GeneratorKind::Gptr,
        Arc::new(StubAdapter { name: "gptr", calls: Arc::new(AtomicU32::new(0)) }),
    );

    let single_doc_judge: Arc<dyn JudgeClient> = Arc::new(StubJudge {
        provider: "demo",
        model: "demo-scorer",
        response: score_response(),
    });
    let pairwise_judge: Arc<dyn JudgeClient> = Arc::new(StubJudge {
        provider: "demo",
        model: "demo-pairwise",
        response: pairwise_response(),
    });
    let merger: Arc<dyn JudgeClient> = Arc::new(StubJudge {
        provider: "demo",
        model: "demo-merger",
        response: String::new(),
    });

    let mut config = RunConfig::default();
    config.generators = vec![
        plan_entry(GeneratorKind::Fpf, "provider-a", "fpf-large"),
        plan_entry(GeneratorKind::Gptr, "provider-b", "gptr-large"),
    ];

    let deps = RunExecutorDeps {
        storage,
        artifact_index,
        generators,
        judges: vec![WeightedJudge { client: single_doc_judge, weight: 1.0, iterations: 1 }],
        judge_weights: HashMap::new(),
        rubric: Rubric::default(),
        single_doc_config: SingleDocConfig::default(),
        pairwise_judge,
        pairwise_temperature: 0.0,
        pairwise_timeout_seconds: 30,
        combine_config: CombineConfig::Concatenate(ConcatenateConfig::default()),
        merger,
        event_sink: Arc::new(LoggingEventSink),
        task_deadline: Duration::from_secs(30),
        output_path_prefix: "runs/demo".to_string(),
    };

    let documents = vec![
        ResolvedDocument {
            id: DocumentId::new(),
            content: "Summarize the quarterly infrastructure migration.".to_string(),
            sort_order: 0,
        },
        ResolvedDocument {
            id: DocumentId::new(),
            content: "Explain the new on-call rotation policy.".to_string(),
            sort_order: 1,
        },
    ];

    let executor = RunExecutor::new(config, documents, deps);
    let run = executor.run_to_completion().await?;

    info!(
        status = ?run.status,
        documents_completed = run.summary.documents_completed,
        documents_failed = run.summary.documents_failed,
        artifacts_generated = run.summary.artifacts_generated,
        artifacts_combined = run.summary.artifacts_combined,
        "run finished"
    );

    Ok(())
}
