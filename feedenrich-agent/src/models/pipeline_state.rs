//! Pipeline run state machine
//!
//! A run progresses through fixed stages:
//! INITIALIZED → VALIDATING → EVIDENCE_GATHERING → GENERATING → SCREENING →
//! RISK_ASSESSING → FINALIZED
//!
//! `Failed` and `Cancelled` are absorbing states reachable from any
//! non-terminal stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Pipeline run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Run created, nothing executed yet
    Initialized,
    /// Hard-rule validation
    Validating,
    /// Registry seeding plus visual/web collection
    EvidenceGathering,
    /// Oracle proposal generation
    Generating,
    /// Deterministic proposal screen
    Screening,
    /// Risk classification and human gate
    RiskAssessing,
    /// Summary computed, run completed
    Finalized,
    /// Run stopped by a terminal stage error
    Failed,
    /// Run stopped by the caller
    Cancelled,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Initialized => "initialized",
            PipelineState::Validating => "validating",
            PipelineState::EvidenceGathering => "evidence_gathering",
            PipelineState::Generating => "generating",
            PipelineState::Screening => "screening",
            PipelineState::RiskAssessing => "risk_assessing",
            PipelineState::Finalized => "finalized",
            PipelineState::Failed => "failed",
            PipelineState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Finalized | PipelineState::Failed | PipelineState::Cancelled
        )
    }

    /// The stage that follows this one on the success path
    pub fn next(&self) -> Option<PipelineState> {
        match self {
            PipelineState::Initialized => Some(PipelineState::Validating),
            PipelineState::Validating => Some(PipelineState::EvidenceGathering),
            PipelineState::EvidenceGathering => Some(PipelineState::Generating),
            PipelineState::Generating => Some(PipelineState::Screening),
            PipelineState::Screening => Some(PipelineState::RiskAssessing),
            PipelineState::RiskAssessing => Some(PipelineState::Finalized),
            _ => None,
        }
    }

    /// Whether `to` is a legal successor of this state
    pub fn can_transition_to(&self, to: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(to, PipelineState::Failed | PipelineState::Cancelled) || self.next() == Some(to)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: PipelineState,
    pub new_state: PipelineState,
    pub transitioned_at: DateTime<Utc>,
}

/// In-memory state of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub record_id: String,
    pub state: PipelineState,
    /// Every transition taken, in order
    pub history: Vec<StateTransition>,
    pub started_at: DateTime<Utc>,
    /// Set when a terminal state is reached
    pub ended_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            record_id: record_id.into(),
            state: PipelineState::Initialized,
            history: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state
    ///
    /// Returns `None` and leaves the run unchanged when the transition is
    /// not legal (skipping a stage, leaving a terminal state).
    pub fn transition_to(&mut self, new_state: PipelineState) -> Option<StateTransition> {
        if !self.state.can_transition_to(new_state) {
            return None;
        }

        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        self.history.push(transition.clone());
        Some(transition)
    }

    /// Check if the run is terminal (finished)
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
