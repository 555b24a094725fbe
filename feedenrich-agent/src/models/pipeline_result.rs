//! Pipeline output
//!
//! A `PipelineResult` is returned for every run, including failed and
//! cancelled ones. Whatever was computed before the run stopped stays in the
//! result so it can be audited.

use super::{PipelineState, Proposal, RiskLevel};
use crate::generation::OptimizationScope;
use crate::validators::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

/// Timing and output of one executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: PipelineState,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Stage-specific summary for audit display
    pub output: serde_json::Value,
    pub error: Option<String>,
}

/// A candidate that was screened out
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rejection {
    pub field: String,
    /// After-value the candidate proposed, as received
    pub value: String,
    pub reason: String,
    /// Stage that rejected it
    pub stage: PipelineState,
    /// Sources the candidate claimed
    pub evidence: Vec<String>,
}

/// A proposal routed to a human reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanReviewItem {
    pub proposal: Proposal,
    pub reason: String,
    pub risk_level: RiskLevel,
}

/// Stage that stopped a run, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    pub stage: PipelineState,
    pub message: String,
}

/// Counts, scores and duration of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub total_stages: usize,
    pub proposals_created: usize,
    pub proposals_accepted: usize,
    pub proposals_rejected: usize,
    pub human_review_needed: usize,
    pub duration_ms: u64,
    /// Quality estimate before enrichment (0.0-1.0)
    pub score_before: f64,
    /// Quality estimate after accepted changes (0.0-1.0)
    pub score_after: f64,
}

/// Everything a pipeline run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub record_id: String,
    pub scope: OptimizationScope,
    pub status: RunStatus,
    /// Last state reached
    pub state: PipelineState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageResult>,
    pub validation: Option<ValidationResult>,
    /// Accepted proposals, in generation order
    pub proposals: Vec<Proposal>,
    /// Screened-out candidates, in generation order
    pub rejections: Vec<Rejection>,
    /// Proposals escalated to human review, in generation order
    pub human_required: Vec<HumanReviewItem>,
    /// Serialized evidence registry
    pub evidence_trail: serde_json::Value,
    pub summary: Option<PipelineSummary>,
    pub error: Option<PipelineFailure>,
}

impl PipelineResult {
    pub fn new(run_id: Uuid, record_id: impl Into<String>, scope: OptimizationScope) -> Self {
        Self {
            run_id,
            record_id: record_id.into(),
            scope,
            status: RunStatus::Completed,
            state: PipelineState::Initialized,
            started_at: Utc::now(),
            completed_at: None,
            stages: Vec::new(),
            validation: None,
            proposals: Vec::new(),
            rejections: Vec::new(),
            human_required: Vec::new(),
            evidence_trail: serde_json::Value::Array(Vec::new()),
            summary: None,
            error: None,
        }
    }

    /// Stage record for a given state, if it ran
    pub fn stage(&self, stage: PipelineState) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
