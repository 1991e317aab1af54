//! The run executor: the pipeline that drives generation, single-doc
//! evaluation, pairwise comparison, ranking, and combination to completion
//! for one run (spec.md §4.1, §5).
//!
//! Per document: generate every planned (generator, config) entry, with
//! single-eval dispatched against each artifact as soon as it lands rather
//! than after the whole batch finishes; then pairwise-rank the surviving
//! candidates (`EloPool::PreCombine`) and combine the top-N into one
//! artifact. After every document has been through that, a run-level
//! post-combine phase runs single-eval on every document's combined
//! artifact unconditionally and pairwise-compares all of them
//! (`EloPool::PostCombine`), bypassing top-N entirely (spec.md §8 scenario
//! 4).

use crate::abort_guard::EarlyAbortGuard;
use crate::error::ExecutorError;
use crate::events::EventSink;
use crate::semaphores::ConcurrencyLimits;

use acm_combine::{combine as run_combine, CombineCandidate, CombineConfig};
use acm_contracts::{
    AcmError, Artifact, ArtifactEvalAggregate, ArtifactGenerator, ArtifactMetadata,
    ArtifactOrigin, ArtifactStatus, DocumentId, EloPool, ErrorKind, GenerationTask,
    GeneratorKind, GeneratorPlanEntry, Phase, Run, RunConfig, RunDocument, RunDocumentStatus,
    RunId, RunStatus, Rubric, TimelineEvent,
};
use acm_eval::{
    aggregate, compare, evaluate_artifact_with_judge, select_pairs, select_top_n, EloTable,
    JudgeClient, PairwiseCandidate, RankingInput, SingleDocConfig, WeightedJudge,
};
use acm_generators::{GenerationOutcome, GenerationRequest, GeneratorAdapter};
use acm_resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerOpenError, ProviderGuard};
use acm_storage::{content_hash, decide_skip, ArtifactIndex, SkipDecision, StorageProvider};

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// One document as resolved for this run: its id and already-read content.
/// Resolution from `SourceRef` (via `StorageProvider`) happens before the
/// executor is constructed, since the core never interprets storage paths
/// itself beyond the capability trait.
#[derive(Debug, Clone)]
pub struct ResolvedDocument {
    pub id: DocumentId,
    pub content: String,
    pub sort_order: u32,
}

/// Everything the executor needs that isn't part of `RunConfig` itself:
/// adapters, judges, storage, and the combiner's merge client. Kept out of
/// `RunConfig` because `acm-contracts` is the workspace's base leaf crate
/// and must not depend on `acm-combine`/`acm-eval`.
pub struct RunExecutorDeps {
    pub storage: Arc<dyn StorageProvider>,
    pub artifact_index: Arc<ArtifactIndex>,
    pub generators: HashMap<GeneratorKind, Arc<dyn GeneratorAdapter>>,
    pub judges: Vec<WeightedJudge>,
    pub judge_weights: HashMap<String, f64>,
    pub rubric: Rubric,
    pub single_doc_config: SingleDocConfig,
    pub pairwise_judge: Arc<dyn JudgeClient>,
    pub pairwise_temperature: f32,
    pub pairwise_timeout_seconds: u64,
    pub combine_config: CombineConfig,
    pub merger: Arc<dyn JudgeClient>,
    pub event_sink: Arc<dyn EventSink>,
    /// Per-generation-attempt wall-clock budget (spec.md §4.2 `deadline`).
    pub task_deadline: Duration,
    /// Storage path prefix artifacts are written under, e.g. `"runs/<id>"`.
    pub output_path_prefix: String,
}

/// Per-document working state accumulated while the pipeline runs.
struct DocumentOutcome {
    document_id: DocumentId,
    combined_artifact: Option<Artifact>,
    any_generation_succeeded: bool,
    any_generation_failed: bool,
}

/// Orchestrates one run end to end. Construct with `new`, call `start()` to
/// kick off a background pipeline (returns immediately), poll `status()`,
/// and call `cancel()` for cooperative cancellation. `run_to_completion()`
/// is a synchronous convenience for tests and demos.
pub struct RunExecutor {
    run: RwLock<Run>,
    documents: Vec<ResolvedDocument>,
    run_documents: DashMap<DocumentId, RunDocument>,
    deps: RunExecutorDeps,
    limits: ConcurrencyLimits,
    provider_guards: DashMap<String, Arc<ProviderGuard>>,
    circuit_breakers: DashMap<(GeneratorKind, String), Arc<CircuitBreaker>>,
    pre_combine_elo: EloTable,
    post_combine_elo: EloTable,
    abort_guard: EarlyAbortGuard,
    cancel: CancellationToken,
    task: RwLock<GenerationTask>,
}

impl RunExecutor {
    pub fn new(config: RunConfig, documents: Vec<ResolvedDocument>, deps: RunExecutorDeps) -> Arc<Self> {
        let run = Run::new(config);
        let run_id = run.id;
        let k_factor = run.config.elo_k_factor;
        let initial_rating = run.config.elo_initial_rating;
        let limits = ConcurrencyLimits::from_config(&run.config);

        let run_documents = DashMap::new();
        for document in &documents {
            run_documents.insert(document.id, RunDocument::new(run_id, document.id, document.sort_order));
        }

        let task = GenerationTask::new(run_id, documents.len() as u32);

        Arc::new(Self {
            run: RwLock::new(run),
            documents,
            run_documents,
            deps,
            limits,
            provider_guards: DashMap::new(),
            circuit_breakers: DashMap::new(),
            pre_combine_elo: EloTable::new(run_id, k_factor, initial_rating),
            post_combine_elo: EloTable::new(run_id, k_factor, initial_rating),
            abort_guard: EarlyAbortGuard::new(),
            cancel: CancellationToken::new(),
            task: RwLock::new(task),
        })
    }

    pub async fn run_id(&self) -> RunId {
        self.run.read().await.id
    }

    pub async fn status(&self) -> GenerationTask {
        self.task.read().await.clone()
    }

    /// Requests cooperative cancellation. Queued generation attempts are
    /// skipped outright; an in-flight subprocess-backed attempt is dropped
    /// (its `Child` was constructed with `kill_on_drop(true)`, so the
    /// process is reaped, though not necessarily via the graceful
    /// SIGTERM-then-SIGKILL sequence the subprocess runner uses for its own
    /// timeouts). No further single-eval or pairwise work is dispatched
    /// once cancellation has been requested.
    pub async fn cancel(&self) {
        self.cancel.cancel();
        let mut run = self.run.write().await;
        if matches!(run.status, RunStatus::Pending | RunStatus::Queued) {
            let _ = run.transition(RunStatus::Cancelled);
        }
    }

    /// Validates the run plan, runs generator health checks, transitions
    /// the run to `Running`, and spawns the pipeline in the background.
    /// Returns as soon as the run is accepted, not when it finishes.
    pub async fn start(self: &Arc<Self>) -> Result<(), ExecutorError> {
        {
            let run = self.run.read().await;
            if run.config.generators.is_empty() {
                return Err(ExecutorError::EmptyGeneratorPlan);
            }
        }

        self.transition_run(RunStatus::Queued).await?;
        self.transition_run(RunStatus::Running).await?;
        {
            let mut task = self.task.write().await;
            task.status = acm_contracts::TaskStatus::Running;
        }
        self.emit(Phase::Initialization, "run.started", true, "run transitioned to running", None);

        for kind in self.planned_generator_kinds().await {
            let Some(adapter) = self.deps.generators.get(&kind) else {
                continue;
            };
            if !adapter.health_check().await {
                self.emit(
                    Phase::Initialization,
                    "generator.health_check_failed",
                    false,
                    &format!("{kind} failed its health check"),
                    None,
                );
                let _ = self.transition_run(RunStatus::Failed).await;
                return Err(ExecutorError::HealthCheckFailed(kind.to_string()));
            }
        }

        let executor = Arc::clone(self);
        tokio::spawn(async move {
            executor.drive().await;
        });
        Ok(())
    }

    /// Runs the full pipeline and awaits completion, for tests and demos
    /// that want the finished `Run` rather than a background handle.
    pub async fn run_to_completion(self: &Arc<Self>) -> Result<Run, ExecutorError> {
        self.start().await?;
        loop {
            {
                let run = self.run.read().await;
                if run.status.is_terminal() {
                    return Ok(run.clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn planned_generator_kinds(&self) -> Vec<GeneratorKind> {
        let run = self.run.read().await;
        let mut kinds: Vec<GeneratorKind> = run.config.generators.iter().map(|e| e.generator).collect();
        kinds.sort_by_key(|k| k.to_string());
        kinds.dedup();
        kinds
    }

    async fn transition_run(&self, next: RunStatus) -> Result<(), ExecutorError> {
        let mut run = self.run.write().await;
        let from = run.status;
        run.transition(next).map_err(|_| ExecutorError::IllegalTransition { from, to: next })
    }

    fn emit(&self, phase: Phase, event_type: &str, success: bool, description: &str, model: Option<&str>) {
        let run_id = self
            .run
            .try_read()
            .map(|r| r.id)
            .unwrap_or_else(|_| RunId::new());
        let mut event = TimelineEvent::new(run_id, phase, event_type.to_string(), success)
            .with_description(description.to_string());
        if let Some(model) = model {
            event = event.with_model(model.to_string());
        }
        self.deps.event_sink.emit(event);
    }

    /// Top-level pipeline body, run as a detached background task from
    /// `start()`. Never panics out: every fallible step is caught and
    /// folded into the run's terminal status.
    async fn drive(self: Arc<Self>) {
        let plan = { self.run.read().await.config.generators.clone() };
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move { while progress_rx.recv().await.is_some() {} });

        let mut join_set = tokio::task::JoinSet::new();
        for document in self.documents.clone() {
            let executor = Arc::clone(&self);
            let plan = plan.clone();
            let progress_tx = progress_tx.clone();
            join_set.spawn(async move { executor.run_document(document, plan, progress_tx).await });
        }

        let mut outcomes = Vec::new();
        let mut aborted = false;
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(outcome) => {
                    let failed = outcome.any_generation_failed && !outcome.any_generation_succeeded;
                    if self.abort_guard.record(failed) {
                        aborted = true;
                    }
                    outcomes.push(outcome);
                }
                Err(join_error) => {
                    warn!(error = %join_error, "document task panicked");
                }
            }
        }

        if !aborted && !self.cancel.is_cancelled() {
            self.run_post_combine_phase(&outcomes).await;
        }

        self.finalize(outcomes, aborted).await;
    }

    /// One document's full pipeline: generate -> stream single-eval ->
    /// pairwise -> rank/top-N -> combine.
    async fn run_document(
        &self,
        document: ResolvedDocument,
        plan: Vec<GeneratorPlanEntry>,
        progress_tx: mpsc::UnboundedSender<acm_generators::ProgressMessage>,
    ) -> DocumentOutcome {
        if self.cancel.is_cancelled() {
            self.set_document_status(document.id, RunDocumentStatus::Skipped).await;
            return DocumentOutcome {
                document_id: document.id,
                combined_artifact: None,
                any_generation_succeeded: false,
                any_generation_failed: false,
            };
        }

        self.set_document_status(document.id, RunDocumentStatus::Processing).await;
        self.emit(Phase::Generation, "document.started", true, &document.id.to_string(), None);

        let config_hash_force = { self.run.read().await.config.force };

        let mut candidates: Vec<Artifact> = Vec::new();
        let mut eval_join = tokio::task::JoinSet::new();
        let mut any_succeeded = false;
        let mut any_failed = false;

        for entry in &plan {
            if self.cancel.is_cancelled() {
                break;
            }
            let skip = decide_skip(
                &self.deps.artifact_index,
                document.id,
                &document.content,
                ArtifactGenerator::from(entry.generator),
                &entry.config,
                config_hash_force,
            );
            if skip == SkipDecision::Skip {
                self.emit(
                    Phase::Generation,
                    "generation.skipped",
                    true,
                    &format!("{} iteration {} reused from artifact index", entry.generator, entry.config.iteration),
                    Some(entry.config.model.as_str()),
                );
                let key = acm_storage::ArtifactKey {
                    document_id: document.id,
                    content_hash: content_hash(&document.content),
                    config_hash: acm_storage::config_hash(&entry.config),
                    generator: ArtifactGenerator::from(entry.generator),
                    iteration: entry.config.iteration,
                };
                if let Some(artifact) = self.deps.artifact_index.lookup(&key) {
                    any_succeeded = true;
                    let evaluator = self.spawn_single_eval(artifact.clone());
                    eval_join.spawn(evaluator);
                    candidates.push(artifact);
                }
                continue;
            }

            match self.run_generation_entry(&document, entry, progress_tx.clone()).await {
                Some(artifact) => {
                    any_succeeded = true;
                    self.deps.artifact_index.record(artifact.clone());
                    let evaluator = self.spawn_single_eval(artifact.clone());
                    eval_join.spawn(evaluator);
                    candidates.push(artifact);
                }
                None => any_failed = true,
            }
        }

        let mut aggregates: HashMap<acm_contracts::ArtifactId, ArtifactEvalAggregate> = HashMap::new();
        while let Some(result) = eval_join.join_next().await {
            if let Ok(Some(aggregate)) = result {
                aggregates.insert(aggregate.artifact_id, aggregate);
            }
        }

        if candidates.is_empty() {
            let status = if any_failed {
                RunDocumentStatus::Failed
            } else {
                RunDocumentStatus::Skipped
            };
            self.set_document_status(document.id, status).await;
            return DocumentOutcome {
                document_id: document.id,
                combined_artifact: None,
                any_generation_succeeded: any_succeeded,
                any_generation_failed: any_failed,
            };
        }

        if candidates.len() >= 2 && !self.cancel.is_cancelled() {
            self.run_pairwise(&candidates, &aggregates, EloPool::PreCombine).await;
        }

        let selected = self.select_candidates(&candidates, &aggregates).await;
        let combined = if !self.cancel.is_cancelled() {
            self.combine_document(&document, &selected, &aggregates).await
        } else {
            None
        };

        let status = if combined.is_some() {
            RunDocumentStatus::Completed
        } else if any_succeeded {
            RunDocumentStatus::Failed
        } else {
            RunDocumentStatus::Failed
        };
        self.set_document_status(document.id, status).await;
        self.bump_task_progress(status).await;

        DocumentOutcome {
            document_id: document.id,
            combined_artifact: combined,
            any_generation_succeeded: any_succeeded,
            any_generation_failed: any_failed,
        }
    }

    async fn set_document_status(&self, document_id: DocumentId, status: RunDocumentStatus) {
        if let Some(mut entry) = self.run_documents.get_mut(&document_id) {
            let _ = entry.transition(status);
        }
    }

    async fn bump_task_progress(&self, status: RunDocumentStatus) {
        let mut task = self.task.write().await;
        match status {
            RunDocumentStatus::Completed => task.documents_completed += 1,
            RunDocumentStatus::Failed => task.documents_failed += 1,
            RunDocumentStatus::Skipped => task.documents_skipped += 1,
            _ => {}
        }
        task.recompute_progress();
    }

    /// Runs one generator-plan entry against a document through the
    /// circuit breaker and provider guard, racing it against cancellation.
    /// Returns `None` on any failure (including an empty-content success
    /// reclassified by `enforce_content_presence`, and circuit-open
    /// rejection), always emitting an event either way.
    async fn run_generation_entry(
        &self,
        document: &ResolvedDocument,
        entry: &GeneratorPlanEntry,
        progress_tx: acm_generators::ProgressSink,
    ) -> Option<Artifact> {
        let Some(adapter) = self.deps.generators.get(&entry.generator).cloned() else {
            return None;
        };

        let _global_permit = self.limits.global.acquire().await.ok()?;
        let _generator_permit = match self.limits.generator_semaphore(entry.generator) {
            Some(sem) => Some(sem.acquire_owned().await.ok()?),
            None => None,
        };
        let _provider_permit = match self.limits.provider_semaphore(&entry.config.provider) {
            Some(sem) => Some(sem.acquire_owned().await.ok()?),
            None => None,
        };

        let guard = self.provider_guard(&entry.config.provider);
        if guard.is_paused().await {
            self.emit(
                Phase::Generation,
                "generation.provider_paused",
                false,
                &format!("provider '{}' is paused", entry.config.provider),
                Some(entry.config.model.as_str()),
            );
            return None;
        }

        if self.cancel.is_cancelled() {
            self.emit(
                Phase::Generation,
                "generation.cancelled",
                false,
                &format!("{} iteration {} cancelled before dispatch", entry.generator, entry.config.iteration),
                Some(entry.config.model.as_str()),
            );
            return None;
        }

        let breaker = self.circuit_breaker(entry.generator, &entry.config.provider);
        let request = GenerationRequest {
            document_id: document.id,
            document_content: document.content.clone(),
            config: entry.config.clone(),
        };
        let deadline = Instant::now() + self.deps.task_deadline;
        let adapter_for_call = Arc::clone(&adapter);
        let request_for_call = request.clone();
        let progress_for_call = progress_tx.clone();

        let call = move || -> Pin<Box<dyn Future<Output = Result<GenerationOutcome, Box<dyn std::error::Error + Send + Sync>>> + Send>> {
            Box::pin(async move {
                let outcome = adapter_for_call.generate(&request_for_call, progress_for_call, deadline).await;
                if outcome.success {
                    Ok(outcome)
                } else {
                    let error = outcome.error.clone().unwrap_or_else(|| AcmError::new(ErrorKind::Unknown, "generation failed with no error detail"));
                    Err(Box::new(error) as Box<dyn std::error::Error + Send + Sync>)
                }
            })
        };

        let breaker_result = tokio::select! {
            _ = self.cancel.cancelled() => {
                self.emit(
                    Phase::Generation,
                    "generation.cancelled",
                    false,
                    &format!("{} iteration {} cancelled before completion", entry.generator, entry.config.iteration),
                    Some(entry.config.model.as_str()),
                );
                return None;
            }
            result = breaker.execute(call, None) => result,
        };

        match breaker_result {
            Ok(outcome) => {
                guard.record(None).await;
                self.emit(
                    Phase::Generation,
                    "generation.completed",
                    true,
                    &format!("{} iteration {} succeeded", entry.generator, entry.config.iteration),
                    Some(entry.config.model.as_str()),
                );
                Some(self.build_artifact(document.id, entry, &request, outcome).await)
            }
            Err(error) => {
                if let Some(open) = error.downcast_ref::<CircuitBreakerOpenError>() {
                    self.emit(
                        Phase::Generation,
                        "generation.circuit_open",
                        false,
                        &open.message,
                        Some(entry.config.model.as_str()),
                    );
                } else if let Ok(acm_error) = error.downcast::<AcmError>() {
                    guard.record(Some(acm_error.code)).await;
                    self.emit(
                        Phase::Generation,
                        "generation.failed",
                        false,
                        &acm_error.message,
                        Some(entry.config.model.as_str()),
                    );
                } else {
                    self.emit(
                        Phase::Generation,
                        "generation.failed",
                        false,
                        "generation failed with an unclassified error",
                        Some(entry.config.model.as_str()),
                    );
                }
                None
            }
        }
    }

    async fn build_artifact(
        &self,
        document_id: DocumentId,
        entry: &GeneratorPlanEntry,
        request: &GenerationRequest,
        outcome: GenerationOutcome,
    ) -> Artifact {
        let run_id = self.run.read().await.id;
        let content = outcome.content.unwrap_or_default();
        let storage_path = format!(
            "{}/{}/{}-{}.md",
            self.deps.output_path_prefix, document_id, entry.generator, entry.config.iteration
        );
        let _ = self
            .deps
            .storage
            .write(&storage_path, content.as_bytes(), "generator output")
            .await;

        Artifact {
            id: acm_contracts::ArtifactId::new(),
            run_id,
            origin: ArtifactOrigin::Document(document_id),
            generator: ArtifactGenerator::from(entry.generator),
            iteration: entry.config.iteration,
            storage_path,
            content_hash: outcome.content_hash.unwrap_or_else(|| content_hash(&content)),
            config_hash: Some(acm_storage::config_hash(&request.config)),
            status: ArtifactStatus::Completed,
            metadata: ArtifactMetadata {
                input_tokens: outcome.metadata.input_tokens,
                output_tokens: outcome.metadata.output_tokens,
                duration_seconds: Some(outcome.metadata.duration_seconds),
                provider: Some(outcome.metadata.provider),
                model: Some(outcome.metadata.model),
                sections: HashMap::new(),
                sources: Vec::new(),
            },
            created_at: Utc::now(),
        }
    }

    /// Dispatches single-eval for one artifact, bounded by the single-eval
    /// semaphore. Runs concurrently with any still-in-flight generation
    /// (spec.md §4.3 "streaming guarantee").
    fn spawn_single_eval(&self, artifact: Artifact) -> Pin<Box<dyn Future<Output = Option<ArtifactEvalAggregate>> + Send>> {
        let semaphore = Arc::clone(&self.limits.single_eval);
        let rubric = self.deps.rubric.clone();
        let config = self.deps.single_doc_config.clone();
        let weights = self.deps.judge_weights.clone();
        let artifact_content_path = artifact.storage_path.clone();
        let storage = Arc::clone(&self.deps.storage);
        let artifact_id = artifact.id;

        let weighted_judges: Vec<(Arc<dyn JudgeClient>, f64, u32)> = self
            .deps
            .judges
            .iter()
            .map(|j| (j.client.clone(), j.weight, j.iterations))
            .collect();

        Box::pin(async move {
            let _permit = semaphore.acquire().await.ok()?;
            let read = storage.read(&artifact_content_path).await.ok()?;
            let content = String::from_utf8_lossy(&read.bytes).into_owned();

            let mut all_results = Vec::new();
            for (client, weight, iterations) in &weighted_judges {
                let judge = WeightedJudge {
                    client: client.clone(),
                    weight: *weight,
                    iterations: *iterations,
                };
                let results = evaluate_artifact_with_judge(artifact_id, &content, "", &rubric, &judge, &config).await;
                all_results.extend(results);
            }
            if all_results.is_empty() {
                return None;
            }
            Some(aggregate(artifact_id, &all_results, &weights))
        })
    }

    async fn run_pairwise(
        &self,
        candidates: &[Artifact],
        aggregates: &HashMap<acm_contracts::ArtifactId, ArtifactEvalAggregate>,
        pool: EloPool,
    ) {
        let pairwise_candidates: Vec<PairwiseCandidate> = candidates
            .iter()
            .map(|artifact| PairwiseCandidate {
                artifact_id: artifact.id,
                content: artifact.storage_path.clone(),
                overall_score: aggregates.get(&artifact.id).map(|a| a.overall_score),
            })
            .collect();

        let pairs = select_pairs(&pairwise_candidates);
        let table = match pool {
            EloPool::PreCombine => &self.pre_combine_elo,
            EloPool::PostCombine => &self.post_combine_elo,
        };

        for (i, j) in pairs {
            if self.cancel.is_cancelled() {
                break;
            }
            let Ok(_permit) = self.limits.pairwise.acquire().await else {
                continue;
            };
            let a = &pairwise_candidates[i];
            let b = &pairwise_candidates[j];
            let content_a = self.read_artifact_content(candidates, a.artifact_id).await;
            let content_b = self.read_artifact_content(candidates, b.artifact_id).await;
            let (Some(content_a), Some(content_b)) = (content_a, content_b) else {
                continue;
            };

            let result = compare(
                self.deps.pairwise_judge.clone(),
                a.artifact_id,
                &content_a,
                b.artifact_id,
                &content_b,
                0,
                self.deps.pairwise_temperature,
                self.deps.pairwise_timeout_seconds,
            )
            .await;

            match result {
                Ok(comparison) => {
                    table.apply(&comparison, pool).await;
                    self.emit(
                        Phase::Pairwise,
                        "pairwise.compared",
                        true,
                        &format!("{:?} vs {:?} -> {:?}", a.artifact_id, b.artifact_id, comparison.winner),
                        None,
                    );
                }
                Err(error) => {
                    self.emit(Phase::Pairwise, "pairwise.failed", false, &error.message, None);
                }
            }
        }
    }

    async fn read_artifact_content(&self, candidates: &[Artifact], artifact_id: acm_contracts::ArtifactId) -> Option<String> {
        let artifact = candidates.iter().find(|a| a.id == artifact_id)?;
        let read = self.deps.storage.read(&artifact.storage_path).await.ok()?;
        Some(String::from_utf8_lossy(&read.bytes).into_owned())
    }

    async fn select_candidates(&self, candidates: &[Artifact], aggregates: &HashMap<acm_contracts::ArtifactId, ArtifactEvalAggregate>) -> Vec<Artifact> {
        let config = self.run.read().await.config.clone();
        let mut inputs = Vec::new();
        for artifact in candidates {
            let elo = self.pre_combine_elo.rating(artifact.id, EloPool::PreCombine).await;
            let aggregate = aggregates.get(&artifact.id);
            inputs.push(RankingInput {
                artifact_id: artifact.id,
                overall_score: aggregate.map(|a| a.overall_score).unwrap_or(0.0),
                elo_rating: elo.as_ref().map(|e| e.rating),
                pairwise_wins: elo.as_ref().map(|e| e.wins).unwrap_or(0),
                stddev: aggregate
                    .map(|a| a.per_judge.iter().map(|j| j.stddev).fold(0.0_f64, f64::max))
                    .unwrap_or(0.0),
                created_at: artifact.created_at,
            });
        }

        let ranked = select_top_n(inputs, config.top_n_count, config.top_n_threshold, config.top_n_min, config.top_n_max);
        let ranked_ids: Vec<_> = ranked.iter().map(|r| r.artifact_id).collect();
        candidates.iter().filter(|a| ranked_ids.contains(&a.id)).cloned().collect()
    }

    async fn combine_document(
        &self,
        document: &ResolvedDocument,
        selected: &[Artifact],
        aggregates: &HashMap<acm_contracts::ArtifactId, ArtifactEvalAggregate>,
    ) -> Option<Artifact> {
        if selected.is_empty() {
            return None;
        }
        let mut candidates = Vec::new();
        for (order, artifact) in selected.iter().enumerate() {
            let read = self.deps.storage.read(&artifact.storage_path).await.ok()?;
            candidates.push(CombineCandidate {
                artifact_id: artifact.id,
                content: String::from_utf8_lossy(&read.bytes).into_owned(),
                document_order: order as u32,
                sections: artifact.metadata.sections.clone(),
                sources: artifact.metadata.sources.clone(),
                score: aggregates.get(&artifact.id).map(|a| a.overall_score),
            });
        }

        let result = run_combine(candidates, self.deps.combine_config.clone(), self.deps.merger.clone()).await;
        if !result.success {
            self.emit(
                Phase::Combination,
                "combine.failed",
                false,
                &result.warnings.join("; "),
                None,
            );
            return None;
        }

        let run_id = self.run.read().await.id;
        let storage_path = format!("{}/{}/combined.md", self.deps.output_path_prefix, document.id);
        let _ = self
            .deps
            .storage
            .write(&storage_path, result.combined_content.as_bytes(), "combiner output")
            .await;

        self.emit(Phase::Combination, "combine.completed", true, &storage_path, None);

        Some(Artifact {
            id: acm_contracts::ArtifactId::new(),
            run_id,
            origin: ArtifactOrigin::Combined { source_artifact_ids: result.source_artifact_ids },
            generator: ArtifactGenerator::Combine,
            iteration: 0,
            storage_path,
            content_hash: content_hash(&result.combined_content),
            config_hash: None,
            status: ArtifactStatus::Completed,
            metadata: ArtifactMetadata {
                input_tokens: None,
                output_tokens: None,
                duration_seconds: Some(result.metrics.duration_seconds),
                provider: None,
                model: None,
                sections: HashMap::new(),
                sources: result.sources,
            },
            created_at: Utc::now(),
        })
    }

    /// Run-level phase after every document's own pipeline has finished:
    /// single-eval runs unconditionally on every combined artifact (unless
    /// `skip_post_combine_eval`), and pairwise runs across all of them in
    /// the `PostCombine` pool with no top-N filtering (spec.md §8 scenario
    /// 4, §9 Open Question resolution).
    async fn run_post_combine_phase(&self, outcomes: &[DocumentOutcome]) {
        let combined: Vec<Artifact> = outcomes.iter().filter_map(|o| o.combined_artifact.clone()).collect();
        if combined.is_empty() {
            return;
        }

        self.emit(Phase::PostCombine, "post_combine.started", true, &format!("{} combined artifacts", combined.len()), None);

        let skip_eval = self.run.read().await.config.skip_post_combine_eval;
        let mut aggregates = HashMap::new();
        if !skip_eval {
            let mut join_set = tokio::task::JoinSet::new();
            for artifact in &combined {
                join_set.spawn(self.spawn_single_eval(artifact.clone()));
            }
            while let Some(result) = join_set.join_next().await {
                if let Ok(Some(aggregate)) = result {
                    aggregates.insert(aggregate.artifact_id, aggregate);
                }
            }
        }

        if combined.len() >= 2 {
            self.run_pairwise(&combined, &aggregates, EloPool::PostCombine).await;
        }

        self.emit(Phase::PostCombine, "post_combine.completed", true, "post-combine phase finished", None);
    }

    /// Computes the run's terminal status from per-document outcomes
    /// (spec.md §7): all documents skipped or completed -> `Completed`;
    /// some generation failures but at least one success ->
    /// `PartialFailure`; every document's generation failed -> `Failed`;
    /// cancellation requested -> `Cancelled`.
    async fn finalize(&self, outcomes: Vec<DocumentOutcome>, aborted: bool) {
        let mut summary = acm_contracts::RunSummary::default();
        summary.documents_total = self.documents.len() as u32;

        let mut any_succeeded = false;
        let mut any_failed = false;
        for outcome in &outcomes {
            if outcome.combined_artifact.is_some() {
                summary.documents_completed += 1;
                summary.artifacts_combined += 1;
            } else if outcome.any_generation_failed {
                summary.documents_failed += 1;
            } else {
                summary.documents_skipped += 1;
            }
            any_succeeded |= outcome.any_generation_succeeded;
            any_failed |= outcome.any_generation_failed;
        }

        let next_status = if aborted || self.cancel.is_cancelled() {
            if self.cancel.is_cancelled() {
                RunStatus::Cancelled
            } else {
                RunStatus::Failed
            }
        } else if any_failed && any_succeeded {
            RunStatus::PartialFailure
        } else if any_failed && !any_succeeded {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };

        {
            let mut run = self.run.write().await;
            run.summary = summary;
            let _ = run.transition(next_status);
        }
        {
            let mut task = self.task.write().await;
            task.status = match next_status {
                RunStatus::Completed | RunStatus::PartialFailure => acm_contracts::TaskStatus::Completed,
                RunStatus::Cancelled => acm_contracts::TaskStatus::Cancelled,
                _ => acm_contracts::TaskStatus::Failed,
            };
            task.recompute_progress();
        }

        self.emit(Phase::Completion, "run.finished", !matches!(next_status, RunStatus::Failed | RunStatus::Cancelled), &format!("{next_status:?}"), None);
        info!(status = ?next_status, "run finished");
    }

    fn provider_guard(&self, provider: &str) -> Arc<ProviderGuard> {
        self.provider_guards
            .entry(provider.to_string())
            .or_insert_with(|| Arc::new(ProviderGuard::new(Duration::from_secs(60))))
            .clone()
    }

    fn circuit_breaker(&self, generator: GeneratorKind, provider: &str) -> Arc<CircuitBreaker> {
        self.circuit_breakers
            .entry((generator, provider.to_string()))
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(CircuitBreakerConfig {
                    name: Some(format!("{generator}:{provider}")),
                    ..Default::default()
                }))
            })
            .clone()
    }
}
