//! Per-record enrichment workflow
//!
//! Drives one record through the evidence-gated stages:
//! - **Validating**: hard rules, annotations only
//! - **Evidence gathering**: feed facts, then visual and web evidence concurrently
//! - **Generating**: oracle proposals restricted to allowed facts
//! - **Screening**: deterministic rejection of invalid candidates
//! - **Risk assessing**: risk classification and the human gate
//!
//! # Architecture
//!
//! The pipeline reports progress over a typed `PipelineEvent` channel. The
//! `event_bridge` task forwards that channel onto the shared `EventBus` for
//! any number of subscribers.

pub mod event_bridge;
pub mod pipeline;

use crate::generation::OptimizationScope;
use crate::models::{PipelineState, RiskLevel, RunStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use pipeline::{Pipeline, PipelineConfig, PipelineError};

/// Final disposition of one candidate within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Accepted,
    Rejected,
    HumanReview,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Accepted => "accepted",
            Disposition::Rejected => "rejected",
            Disposition::HumanReview => "human_review",
        }
    }
}

/// Workflow events for progress tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Run started for a record
    RunStarted {
        run_id: Uuid,
        record_id: String,
        scope: OptimizationScope,
    },
    /// Stage entered
    StageStarted {
        run_id: Uuid,
        record_id: String,
        stage: PipelineState,
    },
    /// Stage finished without error
    StageCompleted {
        run_id: Uuid,
        record_id: String,
        stage: PipelineState,
        /// Stage wall time
        duration_ms: u64,
    },
    /// State machine transition, including terminal ones
    StateChanged {
        run_id: Uuid,
        record_id: String,
        from: PipelineState,
        to: PipelineState,
    },
    /// Evidence source skipped or failed; the run continues without it
    EvidenceDegraded {
        run_id: Uuid,
        record_id: String,
        /// "visual" or "web"
        source: String,
        reason: String,
    },
    /// A candidate reached its disposition
    ProposalEmitted {
        run_id: Uuid,
        record_id: String,
        field: String,
        disposition: Disposition,
        /// Set once risk has been assessed
        risk_level: Option<RiskLevel>,
        /// Rejection or escalation reason
        reason: Option<String>,
    },
    /// Stage failed, or the run was cancelled in it
    Error {
        run_id: Uuid,
        record_id: String,
        stage: PipelineState,
        message: String,
    },
    /// Run reached a terminal status
    Finished {
        run_id: Uuid,
        record_id: String,
        status: RunStatus,
        accepted: usize,
        rejected: usize,
        human_review: usize,
        duration_ms: u64,
    },
}

impl PipelineEvent {
    pub fn record_id(&self) -> &str {
        match self {
            PipelineEvent::RunStarted { record_id, .. }
            | PipelineEvent::StageStarted { record_id, .. }
            | PipelineEvent::StageCompleted { record_id, .. }
            | PipelineEvent::StateChanged { record_id, .. }
            | PipelineEvent::EvidenceDegraded { record_id, .. }
            | PipelineEvent::ProposalEmitted { record_id, .. }
            | PipelineEvent::Error { record_id, .. }
            | PipelineEvent::Finished { record_id, .. } => record_id,
        }
    }
}
