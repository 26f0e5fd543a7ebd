use extract::{CancellationToken, EventExtractor, LanguageModel, RelationshipExtractor};
use ingest::{Chunker, Document};
use pathway::{AssembledGraph, GraphAssembler, Pathway, PathwaySelector};
use report::ReportGenerator;
use score::{CachedScorer, EvidenceScorer, HeuristicScorer, ModelScorer, PinnedScores, ScoreCache, score_all};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{AppConfig, ScorerKind};
use crate::error::{PipelineError, RunWarning, Stage};
use crate::metrics::{Metrics, TimedOperation};
use crate::pool::WorkerPool;
use crate::status::{Checkpoint, LogReporter, StatusReporter};
use crate::topic::resolve_topic;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    /// Lets the caller cancel the run by id while it executes
    #[serde(default)]
    pub run_id: Option<Uuid>,
    #[serde(default)]
    pub doc_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    pub run_id: Uuid,
    pub doc_id: String,
    pub topic: String,
    pub graph: AssembledGraph,
    pub pathway: Pathway,
    pub warnings: Vec<RunWarning>,
    pub report: String,
}

/// The full extraction-to-report pipeline. Holds no per-run state, so one
/// instance serves any number of concurrent runs.
pub struct Pipeline {
    model: Arc<dyn LanguageModel>,
    scorer: Arc<dyn EvidenceScorer>,
    pins: PinnedScores,
    status: Arc<dyn StatusReporter>,
    metrics: Arc<Metrics>,
    config: AppConfig,
}

impl Pipeline {
    pub fn new(model: Arc<dyn LanguageModel>, config: AppConfig) -> Self {
        let scorer: Arc<dyn EvidenceScorer> = match config.scoring.scorer {
            ScorerKind::Heuristic => Arc::new(HeuristicScorer::new()),
            ScorerKind::Model => Arc::new(
                ModelScorer::new(model.clone(), config.retry_policy()).with_min_strength(config.scoring.min_strength),
            ),
        };

        Self {
            model,
            scorer,
            pins: Arc::new(HashMap::new()),
            status: Arc::new(LogReporter),
            metrics: Metrics::new(),
            config,
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn EvidenceScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_pins(mut self, pins: PinnedScores) -> Self {
        self.pins = pins;
        self
    }

    pub fn with_status_reporter(mut self, status: Arc<dyn StatusReporter>) -> Self {
        self.status = status;
        self
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn run(&self, request: RunRequest, cancel: &CancellationToken) -> Result<RunOutput, PipelineError> {
        let run_id = request.run_id.unwrap_or_else(Uuid::new_v4);
        self.metrics.record_started();
        info!(%run_id, "Run started");

        let result = self.execute(run_id, request, cancel).await;
        let cancelled = matches!(result, Err(PipelineError::Cancelled { .. }));
        self.metrics.record_finished(result.is_ok(), cancelled);

        match &result {
            Ok(output) => info!(
                %run_id,
                events = output.graph.events.len(),
                relationships = output.graph.relationships.len(),
                pathway_steps = output.pathway.events.len(),
                warnings = output.warnings.len(),
                "Run complete"
            ),
            Err(e) => warn!(%run_id, stage = %e.stage(), error = %e, "Run failed"),
        }
        result
    }

    async fn execute(
        &self,
        run_id: Uuid,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<RunOutput, PipelineError> {
        let retry = self.config.retry_policy();
        let document = match request.doc_id {
            Some(doc_id) => Document::with_id(doc_id, request.title.clone(), request.text),
            None => Document::new(request.title.clone(), request.text),
        };
        if document.is_blank() {
            return Err(PipelineError::ExtractionEmpty {
                stage: Stage::Events,
                reason: "document has no text".to_string(),
            });
        }

        let topic = resolve_topic(
            self.model.as_ref(),
            &retry,
            cancel,
            request.topic.as_deref(),
            request.query.as_deref(),
            document.title.as_deref(),
        )
        .await
        .map_err(|e| PipelineError::from_extract(Stage::Topic, e))?;
        info!(%run_id, %topic, "Topic resolved");

        // Extraction
        let timer = TimedOperation::start();
        let chunks = Chunker::new(self.config.chunker_config()).chunk_document(&document);
        let concurrency = self.config.concurrency.max_concurrent_llm_calls;

        let events = EventExtractor::new(self.model.clone(), retry.clone())
            .with_concurrency(concurrency)
            .with_max_excerpt_chars(self.config.extraction.max_excerpt_chars)
            .extract(&topic, &chunks, cancel)
            .await
            .map_err(|e| PipelineError::from_extract(Stage::Events, e))?;

        check_cancel(cancel, Stage::Relationships)?;
        let relationships = RelationshipExtractor::new(self.model.clone(), retry.clone(), self.config.relationship_config())
            .extract(&document, &chunks, &events.events, cancel)
            .await
            .map_err(|e| PipelineError::from_extract(Stage::Relationships, e))?;
        self.metrics
            .record_extract(timer.elapsed(), chunks.len(), events.events.len());

        let mut warnings: Vec<RunWarning> = relationships.rejected.iter().map(RunWarning::rejected).collect();
        self.checkpoint(run_id, Checkpoint::ExtractionComplete).await;

        // Scoring
        check_cancel(cancel, Stage::Scoring)?;
        let timer = TimedOperation::start();
        let scorer = self.run_scorer();
        let scored = score_all(
            scorer.as_ref(),
            &events.events,
            relationships.relationships,
            concurrency,
            cancel,
        )
        .await
        .map_err(PipelineError::from_score)?;
        self.metrics.record_stage(Stage::Scoring, timer.elapsed());

        // Assembly and selection
        check_cancel(cancel, Stage::Assembly)?;
        let timer = TimedOperation::start();
        let assembly = GraphAssembler::new().assemble(events.events, events.evidence, scored);
        warnings.extend(RunWarning::from_drops(&assembly.dropped));
        let graph = assembly.graph;
        self.metrics.record_relationships(graph.relationships.len());
        self.checkpoint(run_id, Checkpoint::AssemblyComplete).await;

        let pathway = match PathwaySelector::new().select(&graph) {
            Ok(pathway) => pathway,
            Err(reason) => {
                warn!(%run_id, %reason, "No pathway found");
                warnings.push(RunWarning::no_pathway(reason));
                Pathway::default()
            }
        };
        self.metrics.record_stage(Stage::Selection, timer.elapsed());
        self.checkpoint(run_id, Checkpoint::PathwaySelected).await;

        // Report
        let timer = TimedOperation::start();
        let report = ReportGenerator::new(self.config.report_config()).render(&topic, &graph, &pathway, &warnings);
        self.metrics.record_stage(Stage::Report, timer.elapsed());
        self.checkpoint(run_id, Checkpoint::ReportRendered).await;

        Ok(RunOutput {
            run_id,
            doc_id: document.doc_id,
            topic,
            graph,
            pathway,
            warnings,
            report,
        })
    }

    /// Per-run scorer: a fresh cache seeded with the shared pins, so no
    /// mutable state crosses runs.
    fn run_scorer(&self) -> Arc<dyn EvidenceScorer> {
        if !self.config.cache.enabled {
            return self.scorer.clone();
        }
        let cache = ScoreCache::with_pins(self.config.cache.max_entries, self.pins.clone());
        Arc::new(CachedScorer::new(self.scorer.clone(), cache))
    }

    async fn checkpoint(&self, run_id: Uuid, checkpoint: Checkpoint) {
        if let Err(e) = self.status.report(run_id, checkpoint).await {
            warn!(%run_id, checkpoint = checkpoint.as_str(), error = %e, "Status report failed");
        }
    }
}

fn check_cancel(cancel: &CancellationToken, stage: Stage) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled { stage });
    }
    Ok(())
}

/// Run several documents through `pipeline`, at most `pool.capacity()` at a
/// time. Results keep the order of `requests`.
pub async fn run_many(
    pipeline: &Pipeline,
    pool: &WorkerPool,
    requests: Vec<RunRequest>,
    cancel: &CancellationToken,
) -> Vec<Result<RunOutput, PipelineError>> {
    let jobs = requests.into_iter().map(|request| async move {
        // A closed pool admits nothing new
        pool.run(pipeline.run(request, cancel))
            .await
            .unwrap_or(Err(PipelineError::Cancelled { stage: Stage::Events }))
    });
    futures::future::join_all(jobs).await
}
