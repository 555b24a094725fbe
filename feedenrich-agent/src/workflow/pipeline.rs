//! Pipeline Orchestrator
//!
//! Runs one record through the evidence-gated stages and always returns a
//! `PipelineResult`, whether the run completed, failed or was cancelled.
//!
//! # Architecture
//! - **Validating**: hard rules; violations annotate the result, never block
//! - **Evidence gathering**: feed facts, then visual and web collectors joined concurrently
//! - **Generating**: one oracle call bounded by `oracle_timeout`
//! - **Screening**: deterministic candidate rejection, no oracle call
//! - **Risk assessing**: risk classification, human gate, auto-apply of safe edits
//! - **Finalized**: summary block
//!
//! # Error Handling
//! - Collector failures degrade to fewer facts (`EvidenceDegraded` event + warning)
//! - Oracle failure or timeout in generation is terminal; the partial result is returned
//! - Cancellation is observed at every stage boundary and inside blocking calls,
//!   and reported as `cancelled`, never as `failed`
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(PipelineConfig::default(), oracle).with_events(tx);
//! let result = pipeline.run(&mut record, CancellationToken::new()).await;
//! ```

use super::{Disposition, PipelineEvent};
use crate::evidence::{EvidenceOrigin, EvidenceRegistry};
use crate::extractors::build_search_query;
use crate::generation::{
    parse_source_label, GeneratedCandidate, GenerationRequest, OptimizationScope,
    ProposalGenerator,
};
use crate::models::{
    field_alias, HumanReviewItem, PipelineFailure, PipelineResult, PipelineRun, PipelineState,
    PipelineSummary, Proposal, ProposalSource, ProposalStatus, Rejection, Record, RunStatus,
    SourceType, StageResult,
};
use crate::oracle::{OracleError, ReasoningOracle};
use crate::types::{CollectorError, VisualAnalyzer, VisualEvidence, WebEvidence, WebRetriever};
use crate::validators::hard_rule_validator::has_http_scheme;
use crate::validators::risk_classifier::{
    DEFAULT_BATCH_MEDIUM_THRESHOLD, DEFAULT_BATCH_SIZE_THRESHOLD,
};
use crate::validators::{
    screen_candidate, Candidate, ChangeRequest, DiffEngine, HardRuleValidator, RiskClassifier,
    ScreenPolicy,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Actor stamped on proposals the pipeline accepts on its own
pub const PIPELINE_ACTOR: &str = "pipeline";

/// Actor stamped on web facts promoted by a matching visual observation
const CORROBORATION_ACTOR: &str = "visual-corroboration";

/// Score estimate gain per accepted proposal
const SCORE_GAIN_PER_ACCEPTED: f64 = 0.05;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Which fields and evidence sources the run targets
    pub scope: OptimizationScope,
    /// Run the visual collector when an image URL is present
    pub enable_vision: bool,
    /// Run the web collector when a search query can be built
    pub enable_web_search: bool,
    /// Bound on the generation oracle call
    pub oracle_timeout: Duration,
    /// Bound on each evidence collector
    pub evidence_timeout: Duration,
    /// Candidates below this confidence are screened out (0.0-1.0)
    pub min_confidence: f64,
    /// Medium-risk changes in one batch before the batch is high risk
    pub batch_medium_threshold: usize,
    /// Changes in one batch before the batch is at least medium risk
    pub batch_size_threshold: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scope: OptimizationScope::All,
            enable_vision: true,
            enable_web_search: true,
            oracle_timeout: Duration::from_secs(120),
            evidence_timeout: Duration::from_secs(30),
            min_confidence: 0.3,
            batch_medium_threshold: DEFAULT_BATCH_MEDIUM_THRESHOLD,
            batch_size_threshold: DEFAULT_BATCH_SIZE_THRESHOLD,
        }
    }
}

/// Reason a run stopped before finalization
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Generation oracle failed
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Cancellation token fired
    #[error("Run cancelled")]
    Cancelled,

    /// A bounded call exceeded its timeout
    #[error("Stage {stage} timed out")]
    Timeout { stage: PipelineState },

    /// Input record could not be parsed
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Whether and how an optional collector runs for a record
enum CollectorPlan<T: ?Sized> {
    /// Scope or configuration does not ask for it
    NotRequested,
    /// Wanted but unavailable; reported as degraded
    Unavailable(String),
    Run(Arc<T>, String),
}

/// Mutable state of one run
struct RunContext {
    run: PipelineRun,
    result: PipelineResult,
    registry: Arc<EvidenceRegistry>,
    cancel: CancellationToken,
    clock: Instant,
    /// Current stage start, cleared on completion
    stage_started: Option<(DateTime<Utc>, Instant)>,
    oracle_score: Option<f64>,
    candidates_created: usize,
}

/// Evidence-gated enrichment pipeline
pub struct Pipeline {
    config: PipelineConfig,
    validator: HardRuleValidator,
    generator: ProposalGenerator,
    risk: RiskClassifier,
    diff: DiffEngine,
    visual: Option<Arc<dyn VisualAnalyzer>>,
    web: Option<Arc<dyn WebRetriever>>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    /// Create new pipeline with configuration and a generation oracle
    pub fn new(config: PipelineConfig, oracle: Arc<dyn ReasoningOracle>) -> Self {
        let risk =
            RiskClassifier::with_thresholds(config.batch_medium_threshold, config.batch_size_threshold);
        Self {
            config,
            validator: HardRuleValidator::new(),
            generator: ProposalGenerator::new(oracle),
            risk,
            diff: DiffEngine::new(),
            visual: None,
            web: None,
            event_tx: None,
        }
    }

    pub fn with_visual(mut self, analyzer: Arc<dyn VisualAnalyzer>) -> Self {
        self.visual = Some(analyzer);
        self
    }

    pub fn with_web(mut self, retriever: Arc<dyn WebRetriever>) -> Self {
        self.web = Some(retriever);
        self
    }

    /// Replace the default hard-rule set
    pub fn with_validator(mut self, validator: HardRuleValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Attach event channel for progress reporting
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one record
    ///
    /// Accepted proposals are written into `record.current`. The returned
    /// result is complete on success and partial on failure or cancellation,
    /// with `error` naming the stage.
    pub async fn run(&self, record: &mut Record, cancel: CancellationToken) -> PipelineResult {
        let mut ctx = self.start(&record.id, cancel).await;
        let outcome = self.execute(record, &mut ctx).await;
        self.finish(ctx, outcome).await
    }

    /// Parse a JSON record and run the pipeline on it
    ///
    /// A record that does not parse fails in the validating stage; the
    /// result carries the parse violation and no record is returned.
    pub async fn run_json(
        &self,
        json: &str,
        cancel: CancellationToken,
    ) -> (Option<Record>, PipelineResult) {
        match Record::from_json(json) {
            Ok(mut record) => {
                let result = self.run(&mut record, cancel).await;
                (Some(record), result)
            }
            Err(e) => {
                warn!("Rejecting unparseable record: {}", e);
                let mut ctx = self.start("unknown", cancel).await;
                let outcome = match self.enter_stage(&mut ctx, PipelineState::Validating).await {
                    Ok(()) => {
                        ctx.result.validation = Some(self.validator.validate_json(json));
                        Err(PipelineError::InvalidRecord(e.to_string()))
                    }
                    Err(cancelled) => Err(cancelled),
                };
                (None, self.finish(ctx, outcome).await)
            }
        }
    }

    /// Run independent records concurrently
    ///
    /// At most `concurrency` runs are in flight. Each run gets a child of
    /// `cancel`. Results come back in input order; a run whose task panicked
    /// is logged and left out.
    pub async fn run_batch(
        self: Arc<Self>,
        records: Vec<Record>,
        concurrency: usize,
        cancel: CancellationToken,
    ) -> Vec<(Record, PipelineResult)> {
        let total = records.len();
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = JoinSet::new();

        info!("Batch started: {} records, concurrency {}", total, concurrency.max(1));

        for (index, mut record) in records.into_iter().enumerate() {
            let pipeline = Arc::clone(&self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.child_token();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let result = pipeline.run(&mut record, cancel).await;
                (index, record, result)
            });
        }

        let mut slots: Vec<Option<(Record, PipelineResult)>> = (0..total).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, record, result)) => slots[index] = Some((record, result)),
                Err(e) => error!("Batch task failed: {}", e),
            }
        }

        let results: Vec<_> = slots.into_iter().flatten().collect();
        info!("Batch finished: {}/{} records returned", results.len(), total);
        results
    }

    // ------------------------------------------------------------------------
    // Run lifecycle
    // ------------------------------------------------------------------------

    async fn start(&self, record_id: &str, cancel: CancellationToken) -> RunContext {
        let run = PipelineRun::new(record_id);
        let mut result = PipelineResult::new(run.run_id, record_id, self.config.scope);
        result.started_at = run.started_at;

        info!(
            record_id = %record_id,
            run_id = %run.run_id,
            scope = %self.config.scope,
            "Pipeline run started"
        );
        self.emit_event(PipelineEvent::RunStarted {
            run_id: run.run_id,
            record_id: record_id.to_string(),
            scope: self.config.scope,
        })
        .await;

        RunContext {
            registry: Arc::new(EvidenceRegistry::new(record_id)),
            run,
            result,
            cancel,
            clock: Instant::now(),
            stage_started: None,
            oracle_score: None,
            candidates_created: 0,
        }
    }

    async fn execute(&self, record: &mut Record, ctx: &mut RunContext) -> Result<(), PipelineError> {
        // Validating
        self.enter_stage(ctx, PipelineState::Validating).await?;
        let validation = self.validator.validate(&record.current);
        debug!(
            record_id = %record.id,
            valid = validation.valid,
            violations = validation.violations.len(),
            warnings = validation.warnings.len(),
            "Hard rules checked"
        );
        let output = validation.report();
        ctx.result.validation = Some(validation);
        self.complete_stage(ctx, output).await;

        // Evidence gathering
        self.enter_stage(ctx, PipelineState::EvidenceGathering).await?;
        let (evidence_context, output) = self.gather_evidence(record, ctx).await?;
        self.complete_stage(ctx, output).await;

        // Generating
        self.enter_stage(ctx, PipelineState::Generating).await?;
        let candidates = self.generate(record, ctx, &evidence_context).await?;

        // Screening
        self.enter_stage(ctx, PipelineState::Screening).await?;
        let proposals = self.screen(record, ctx, candidates).await;

        // Risk assessing
        self.enter_stage(ctx, PipelineState::RiskAssessing).await?;
        self.assess_and_apply(record, ctx, proposals).await;

        Ok(())
    }

    async fn finish(&self, mut ctx: RunContext, outcome: Result<(), PipelineError>) -> PipelineResult {
        let record_id = ctx.registry.record_id().to_string();

        match outcome {
            Ok(()) => {
                self.transition(&mut ctx, PipelineState::Finalized).await;
                ctx.result.status = RunStatus::Completed;
            }
            Err(err) => {
                let stage = ctx.run.state;
                let message = err.to_string();
                let (terminal, status) = match err {
                    PipelineError::Cancelled => {
                        warn!(record_id = %record_id, stage = %stage, "Pipeline run cancelled");
                        (PipelineState::Cancelled, RunStatus::Cancelled)
                    }
                    _ => {
                        error!(record_id = %record_id, stage = %stage, "Pipeline run failed: {}", message);
                        (PipelineState::Failed, RunStatus::Failed)
                    }
                };

                if let Some((started_at, started)) = ctx.stage_started.take() {
                    ctx.result.stages.push(StageResult {
                        stage,
                        started_at,
                        ended_at: Utc::now(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        output: serde_json::Value::Null,
                        error: Some(message.clone()),
                    });
                }
                self.emit_event(PipelineEvent::Error {
                    run_id: ctx.run.run_id,
                    record_id: record_id.clone(),
                    stage,
                    message: message.clone(),
                })
                .await;

                ctx.result.error = Some(PipelineFailure { stage, message });
                ctx.result.status = status;
                self.transition(&mut ctx, terminal).await;
            }
        }

        let summary = self.summarize(&ctx);
        ctx.result.state = ctx.run.state;
        ctx.result.completed_at = Some(ctx.run.ended_at.unwrap_or_else(Utc::now));
        ctx.result.evidence_trail = ctx.registry.export_trail();

        info!(
            record_id = %record_id,
            status = ctx.result.status.as_str(),
            accepted = summary.proposals_accepted,
            rejected = summary.proposals_rejected,
            human_review = summary.human_review_needed,
            duration_ms = summary.duration_ms,
            "Pipeline run finished"
        );
        self.emit_event(PipelineEvent::Finished {
            run_id: ctx.run.run_id,
            record_id,
            status: ctx.result.status,
            accepted: summary.proposals_accepted,
            rejected: summary.proposals_rejected,
            human_review: summary.human_review_needed,
            duration_ms: summary.duration_ms,
        })
        .await;

        ctx.result.summary = Some(summary);
        ctx.result
    }

    fn summarize(&self, ctx: &RunContext) -> PipelineSummary {
        let result = &ctx.result;
        let score_before = ctx
            .oracle_score
            .or_else(|| result.validation.as_ref().map(|v| v.pass_ratio()))
            .unwrap_or(0.0);
        let accepted = result.proposals.len();

        PipelineSummary {
            total_stages: result.stages.len(),
            proposals_created: ctx.candidates_created,
            proposals_accepted: accepted,
            proposals_rejected: result.rejections.len(),
            human_review_needed: result.human_required.len(),
            duration_ms: ctx.clock.elapsed().as_millis() as u64,
            score_before,
            score_after: (score_before + SCORE_GAIN_PER_ACCEPTED * accepted as f64).min(1.0),
        }
    }

    // ------------------------------------------------------------------------
    // Stage bookkeeping
    // ------------------------------------------------------------------------

    async fn transition(&self, ctx: &mut RunContext, to: PipelineState) {
        match ctx.run.transition_to(to) {
            Some(transition) => {
                self.emit_event(PipelineEvent::StateChanged {
                    run_id: transition.run_id,
                    record_id: ctx.run.record_id.clone(),
                    from: transition.old_state,
                    to: transition.new_state,
                })
                .await;
            }
            None => warn!(
                record_id = %ctx.run.record_id,
                "Illegal state transition {} -> {}", ctx.run.state, to
            ),
        }
    }

    /// Observe cancellation, then move into `stage`
    async fn enter_stage(&self, ctx: &mut RunContext, stage: PipelineState) -> Result<(), PipelineError> {
        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        self.transition(ctx, stage).await;
        ctx.stage_started = Some((Utc::now(), Instant::now()));

        info!(record_id = %ctx.run.record_id, stage = %stage, "Stage started");
        self.emit_event(PipelineEvent::StageStarted {
            run_id: ctx.run.run_id,
            record_id: ctx.run.record_id.clone(),
            stage,
        })
        .await;
        Ok(())
    }

    async fn complete_stage(&self, ctx: &mut RunContext, output: serde_json::Value) {
        let stage = ctx.run.state;
        let (started_at, started) = ctx
            .stage_started
            .take()
            .unwrap_or_else(|| (Utc::now(), Instant::now()));
        let duration_ms = started.elapsed().as_millis() as u64;

        ctx.result.stages.push(StageResult {
            stage,
            started_at,
            ended_at: Utc::now(),
            duration_ms,
            output,
            error: None,
        });

        info!(record_id = %ctx.run.record_id, stage = %stage, duration_ms = duration_ms, "Stage completed");
        self.emit_event(PipelineEvent::StageCompleted {
            run_id: ctx.run.run_id,
            record_id: ctx.run.record_id.clone(),
            stage,
            duration_ms,
        })
        .await;
    }

    async fn reject(
        &self,
        ctx: &mut RunContext,
        field: &str,
        value: &str,
        reason: String,
        evidence: Vec<String>,
    ) {
        let stage = ctx.run.state;
        debug!(record_id = %ctx.run.record_id, field = %field, stage = %stage, reason = %reason, "Candidate rejected");
        self.emit_event(PipelineEvent::ProposalEmitted {
            run_id: ctx.run.run_id,
            record_id: ctx.run.record_id.clone(),
            field: field.to_string(),
            disposition: Disposition::Rejected,
            risk_level: None,
            reason: Some(reason.clone()),
        })
        .await;
        ctx.result.rejections.push(Rejection {
            field: field.to_string(),
            value: value.to_string(),
            reason,
            stage,
            evidence,
        });
    }

    // ------------------------------------------------------------------------
    // Evidence gathering
    // ------------------------------------------------------------------------

    fn plan_visual(&self, record: &Record) -> CollectorPlan<dyn VisualAnalyzer> {
        if !self.config.scope.runs_visual() || !self.config.enable_vision {
            return CollectorPlan::NotRequested;
        }
        let Some(analyzer) = &self.visual else {
            return CollectorPlan::Unavailable("no visual analyzer configured".to_string());
        };
        let image_url = record.field_text("image_link");
        if image_url.is_empty() {
            return CollectorPlan::Unavailable("no image URL".to_string());
        }
        if !has_http_scheme(&image_url) {
            return CollectorPlan::Unavailable(format!("image URL is not http(s): {}", image_url));
        }
        CollectorPlan::Run(Arc::clone(analyzer), image_url)
    }

    fn plan_web(&self, record: &Record) -> CollectorPlan<dyn WebRetriever> {
        if !self.config.scope.runs_web() || !self.config.enable_web_search {
            return CollectorPlan::NotRequested;
        }
        let Some(retriever) = &self.web else {
            return CollectorPlan::Unavailable("no web retriever configured".to_string());
        };
        match build_search_query(&record.current) {
            Some(query) => CollectorPlan::Run(Arc::clone(retriever), query),
            None => CollectorPlan::Unavailable("no gtin, brand or title to search for".to_string()),
        }
    }

    /// Seed feed facts, run the optional collectors concurrently and register
    /// what they found
    ///
    /// Returns the evidence context text for generation and the stage output.
    async fn gather_evidence(
        &self,
        record: &Record,
        ctx: &mut RunContext,
    ) -> Result<(String, serde_json::Value), PipelineError> {
        let feed_facts = ctx.registry.load_from_feed(&record.current);
        let limit = self.config.evidence_timeout;

        let visual_plan = self.plan_visual(record);
        let web_plan = self.plan_web(record);

        let visual_task = async {
            match &visual_plan {
                CollectorPlan::Run(analyzer, image_url) => {
                    Some(bounded(limit, analyzer.analyze(image_url)).await)
                }
                _ => None,
            }
        };
        let web_task = async {
            match &web_plan {
                CollectorPlan::Run(retriever, query) => Some(bounded(limit, retriever.retrieve(query)).await),
                _ => None,
            }
        };

        let cancel = ctx.cancel.clone();
        let (visual, web) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            joined = async { tokio::join!(visual_task, web_task) } => joined,
        };

        let mut sections = Vec::new();
        let mut output = json!({ "feed_facts": feed_facts });

        match (visual, visual_plan) {
            (Some(Ok(evidence)), _) => {
                let registered = self.register_visual(ctx, &evidence);
                if !evidence.context.trim().is_empty() {
                    sections.push(format!("Image Analysis Results:\n{}", evidence.context.trim()));
                }
                output["visual"] = json!({ "status": "ok", "observations": registered });
            }
            (Some(Err(reason)), _) | (None, CollectorPlan::Unavailable(reason)) => {
                self.degrade(ctx, "visual", &reason).await;
                output["visual"] = json!({ "status": "degraded", "reason": reason });
            }
            (None, _) => output["visual"] = json!({ "status": "skipped" }),
        }

        match (web, web_plan) {
            (Some(Ok(evidence)), _) => {
                let (registered, corroborated) = self.register_web(ctx, &evidence);
                if !evidence.context.trim().is_empty() {
                    sections.push(format!("Web Search Results:\n{}", evidence.context.trim()));
                }
                output["web"] = json!({
                    "status": "ok",
                    "query": evidence.query,
                    "facts": registered,
                    "corroborated": corroborated,
                });
            }
            (Some(Err(reason)), _) | (None, CollectorPlan::Unavailable(reason)) => {
                self.degrade(ctx, "web", &reason).await;
                output["web"] = json!({ "status": "degraded", "reason": reason });
            }
            (None, _) => output["web"] = json!({ "status": "skipped" }),
        }

        output["allowed_facts"] = json!(ctx.registry.allowed_facts().len());
        Ok((sections.join("\n\n"), output))
    }

    fn register_visual(&self, ctx: &RunContext, evidence: &VisualEvidence) -> usize {
        for observation in &evidence.observations {
            ctx.registry.register_from_visual(
                &observation.attribute,
                &observation.value,
                &evidence.image_url,
                &observation.reasoning,
                observation.confidence,
            );
        }
        evidence.observations.len()
    }

    /// Register web facts; a fact matching a verified visual observation of
    /// the same field is promoted to verified
    fn register_web(&self, ctx: &RunContext, evidence: &WebEvidence) -> (usize, usize) {
        let mut corroborated = 0;
        for fact in &evidence.facts {
            let registered = ctx.registry.register_from_external_page(
                &fact.field,
                &fact.value,
                &fact.source_url,
                &fact.snippet,
                fact.confidence,
            );
            let seen = ctx.registry.evidence_for_field(&fact.field).into_iter().any(|e| {
                e.origin == EvidenceOrigin::VisualObservation
                    && e.verified
                    && e.value.trim().eq_ignore_ascii_case(fact.value.trim())
            });
            if seen && matches!(ctx.registry.verify(registered.id, CORROBORATION_ACTOR), Ok(true)) {
                corroborated += 1;
            }
        }
        (evidence.facts.len(), corroborated)
    }

    async fn degrade(&self, ctx: &RunContext, source: &str, reason: &str) {
        warn!(record_id = %ctx.run.record_id, source = %source, "Evidence source degraded: {}", reason);
        self.emit_event(PipelineEvent::EvidenceDegraded {
            run_id: ctx.run.run_id,
            record_id: ctx.run.record_id.clone(),
            source: source.to_string(),
            reason: reason.to_string(),
        })
        .await;
    }

    // ------------------------------------------------------------------------
    // Generation
    // ------------------------------------------------------------------------

    async fn generate(
        &self,
        record: &Record,
        ctx: &mut RunContext,
        evidence_context: &str,
    ) -> Result<Vec<GeneratedCandidate>, PipelineError> {
        let allowed_facts = ctx.registry.allowed_facts();
        let request = GenerationRequest {
            record,
            scope: self.config.scope,
            allowed_facts: &allowed_facts,
            evidence_context,
        };

        let call = tokio::time::timeout(self.config.oracle_timeout, self.generator.generate(request));
        let cancel = ctx.cancel.clone();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            outcome = call => match outcome {
                Err(_) => return Err(PipelineError::Timeout { stage: PipelineState::Generating }),
                Ok(generated) => generated?,
            },
        };

        ctx.oracle_score = output.analysis.score;
        ctx.candidates_created = output.candidates.len() + output.filtered.len();

        for filtered in &output.filtered {
            self.reject(
                ctx,
                &filtered.candidate.field,
                &filtered.candidate.after,
                filtered.reason.clone(),
                filtered.candidate.sources.clone(),
            )
            .await;
        }

        let stage_output = json!({
            "score": output.analysis.score,
            "missing_fields": output.analysis.missing_fields,
            "weak_fields": output.analysis.weak_fields,
            "issues": output.issues,
            "candidates": output.candidates.len(),
            "filtered": output.filtered.len(),
        });
        self.complete_stage(ctx, stage_output).await;
        Ok(output.candidates)
    }

    // ------------------------------------------------------------------------
    // Screening
    // ------------------------------------------------------------------------

    async fn screen(
        &self,
        record: &Record,
        ctx: &mut RunContext,
        candidates: Vec<GeneratedCandidate>,
    ) -> Vec<Proposal> {
        let policy = ScreenPolicy {
            min_confidence: self.config.min_confidence,
            scope: self.config.scope,
        };
        let screened = candidates.len();
        let mut passed = Vec::with_capacity(screened);

        for candidate in candidates {
            let verdict = screen_candidate(
                &Candidate {
                    field: &candidate.field,
                    before: &candidate.before,
                    after: &candidate.after,
                    confidence: candidate.confidence,
                },
                &policy,
            );
            if let Some(reason) = verdict {
                self.reject(ctx, &candidate.field, &candidate.after, reason, candidate.sources).await;
                continue;
            }

            // None: the field did not exist on the record
            let before = (!candidate.before.trim().is_empty()).then(|| candidate.before.clone());
            match Proposal::new(
                record.id.clone(),
                candidate.field.clone(),
                before,
                candidate.after.clone(),
                candidate.confidence,
            ) {
                Ok(mut proposal) => {
                    proposal.sources =
                        link_sources(&ctx.registry, &candidate.field, &candidate.sources, candidate.confidence);
                    proposal.rationale = candidate.rationale;
                    passed.push(proposal);
                }
                Err(e) => {
                    self.reject(ctx, &candidate.field, &candidate.after, e.to_string(), candidate.sources)
                        .await
                }
            }
        }

        let output = json!({
            "screened": screened,
            "passed": passed.len(),
            "rejected": screened - passed.len(),
        });
        self.complete_stage(ctx, output).await;
        passed
    }

    // ------------------------------------------------------------------------
    // Risk assessment and human gate
    // ------------------------------------------------------------------------

    async fn assess_and_apply(&self, record: &mut Record, ctx: &mut RunContext, proposals: Vec<Proposal>) {
        let changes: Vec<ChangeRequest> = proposals
            .iter()
            .map(|p| ChangeRequest {
                field: p.field.clone(),
                before: p.before_text().to_string(),
                after: p.after.clone(),
                source_type: p.source_type(),
                confidence: p.confidence,
            })
            .collect();
        let batch = self.risk.assess_batch(&changes);
        let mut diffs = Vec::with_capacity(proposals.len());

        for mut proposal in proposals {
            let assessment = self.risk.assess_change(
                &proposal.field,
                proposal.before_text(),
                &proposal.after,
                proposal.source_type(),
                proposal.confidence,
            );
            diffs.push(self.diff.compute_diff(&proposal.field, proposal.before_text(), &proposal.after));

            let needs_human = self.risk.should_require_human_review(&assessment);
            let level = assessment.level;
            let reason = if assessment.reasons.is_empty() {
                "high risk change".to_string()
            } else {
                assessment.reasons.join("; ")
            };
            proposal.set_risk(assessment);

            let disposition = if needs_human {
                ctx.result.human_required.push(HumanReviewItem {
                    proposal: proposal.clone(),
                    reason: reason.clone(),
                    risk_level: level,
                });
                Disposition::HumanReview
            } else {
                if let Err(e) = proposal.transition_to(ProposalStatus::Accepted, Some(PIPELINE_ACTOR)) {
                    warn!(record_id = %record.id, field = %proposal.field, "Cannot accept proposal: {}", e);
                    continue;
                }
                record.apply_value(&proposal.field, proposal.after.clone());
                ctx.result.proposals.push(proposal.clone());
                Disposition::Accepted
            };

            debug!(
                record_id = %record.id,
                field = %proposal.field,
                risk = %level,
                disposition = disposition.as_str(),
                "Proposal decided"
            );
            self.emit_event(PipelineEvent::ProposalEmitted {
                run_id: ctx.run.run_id,
                record_id: record.id.clone(),
                field: proposal.field.clone(),
                disposition,
                risk_level: Some(level),
                reason: needs_human.then_some(reason),
            })
            .await;
        }

        let output = json!({
            "batch": batch,
            "diffs": diffs,
            "accepted": ctx.result.proposals.len(),
            "human_review": ctx.result.human_required.len(),
        });
        self.complete_stage(ctx, output).await;
    }

    /// Emit workflow event (if event channel configured)
    async fn emit_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }
}

/// Bound a collector call, flattening timeout and error into a reason
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, CollectorError>>,
) -> Result<T, String> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
    }
}

/// Resolve source labels against the registry
///
/// Feed and image labels link to the matching evidence entry for the named
/// field (the candidate's own field when the label names none); URLs link to
/// the page evidence they cite.
fn link_sources(
    registry: &EvidenceRegistry,
    field: &str,
    labels: &[String],
    confidence: f64,
) -> Vec<ProposalSource> {
    labels
        .iter()
        .map(|label| {
            let (source_type, reference) = parse_source_label(label);
            let target = if reference.is_empty() {
                field.to_string()
            } else {
                field_alias::canonical_name(&reference)
            };
            let evidence = match source_type {
                SourceType::Feed => registry
                    .evidence_for_field(&target)
                    .into_iter()
                    .find(|e| e.origin == EvidenceOrigin::OriginalFeed),
                SourceType::Image => registry
                    .evidence_for_field(&target)
                    .into_iter()
                    .find(|e| e.origin == EvidenceOrigin::VisualObservation),
                SourceType::Web if !reference.is_empty() => registry
                    .all()
                    .into_iter()
                    .find(|e| e.origin == EvidenceOrigin::ExternalPage && e.source.reference() == reference),
                _ => None,
            };
            ProposalSource {
                source_type,
                reference,
                evidence_id: evidence.as_ref().map(|e| e.id),
                confidence: evidence.map_or(confidence, |e| e.confidence),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::oracle::OracleRequest;

    struct FixedOracle(String);

    #[async_trait]
    impl ReasoningOracle for FixedOracle {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: OracleRequest) -> Result<String, OracleError> {
            Ok(self.0.clone())
        }
    }

    fn record() -> Record {
        Record::from_json(
            r#"{"id": "sku-1", "title": "Basket Nike Air Max 90 Homme Blanc Cuir", "brand": "Nike",
                "price": "129.99 EUR", "link": "https://shop.example.com/p/1", "availability": "in_stock"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.scope, OptimizationScope::All);
        assert_eq!(config.min_confidence, 0.3);
        assert_eq!(config.oracle_timeout, Duration::from_secs(120));
        assert_eq!(config.batch_medium_threshold, 3);
        assert_eq!(config.batch_size_threshold, 5);
    }

    #[test]
    fn test_link_sources_resolves_feed_evidence() {
        let registry = EvidenceRegistry::new("sku-1");
        let brand = registry.register_from_feed("brand", "Nike");
        let sources = link_sources(
            &registry,
            "title",
            &["feed:marque".to_string(), "inferred".to_string()],
            0.7,
        );
        assert_eq!(sources[0].source_type, SourceType::Feed);
        assert_eq!(sources[0].evidence_id, Some(brand.id));
        assert_eq!(sources[0].confidence, 1.0);
        assert_eq!(sources[1].source_type, SourceType::Mixed);
        assert_eq!(sources[1].evidence_id, None);
        assert_eq!(sources[1].confidence, 0.7);
    }

    #[tokio::test]
    async fn test_run_without_collectors_degrades() {
        let oracle = FixedOracle(r#"{"analysis": {"score": 0.8}, "proposals": []}"#.to_string());
        let (tx, mut rx) = mpsc::channel(64);
        let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(oracle)).with_events(tx);

        let mut record = record();
        let result = pipeline.run(&mut record, CancellationToken::new()).await;
        drop(pipeline);

        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.state, PipelineState::Finalized);
        assert_eq!(result.stages.len(), 5);
        let summary = result.summary.unwrap();
        assert_eq!(summary.score_before, 0.8);
        assert_eq!(summary.score_after, 0.8);

        let mut degraded = Vec::new();
        while let Some(event) = rx.recv().await {
            if let PipelineEvent::EvidenceDegraded { source, .. } = event {
                degraded.push(source);
            }
        }
        assert_eq!(degraded, vec!["visual", "web"]);
    }

    #[tokio::test]
    async fn test_run_json_rejects_unparseable_record() {
        let oracle = FixedOracle("{}".to_string());
        let pipeline = Pipeline::new(PipelineConfig::default(), Arc::new(oracle));

        let (record, result) = pipeline.run_json("{not json", CancellationToken::new()).await;
        assert!(record.is_none());
        assert_eq!(result.status, RunStatus::Failed);
        let failure = result.error.unwrap();
        assert_eq!(failure.stage, PipelineState::Validating);
        assert!(!result.validation.unwrap().valid);
    }
}
