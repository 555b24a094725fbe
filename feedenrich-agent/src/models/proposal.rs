//! Proposals and their risk assessments
//!
//! A proposal is a candidate before → after edit to one field. It is created
//! in the `proposed` status and leaves it exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Risk level of a proposed change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of the information behind a change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Original feed data
    Feed,
    /// Visual observation of the product image
    Image,
    /// External web page
    Web,
    /// Human input
    User,
    /// Several origins combined by the oracle
    Mixed,
}

impl SourceType {
    /// Parse a loosely-written source label
    ///
    /// Accepts the canonical names plus the descriptive forms oracles tend to
    /// produce (`feed_field`, `image_observation`, `web_page`, `user_input`,
    /// `original-feed`, `visual-observation`, `external-page`, `human-input`).
    /// Anything else is `Mixed`.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().replace('-', "_").as_str() {
            "feed" | "feed_field" | "original_feed" => SourceType::Feed,
            "image" | "image_observation" | "visual" | "visual_observation" | "vision" => {
                SourceType::Image
            }
            "web" | "web_page" | "external_page" | "web_search" => SourceType::Web,
            "user" | "user_input" | "human" | "human_input" => SourceType::User,
            _ => SourceType::Mixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Feed => "feed",
            SourceType::Image => "image",
            SourceType::Web => "web",
            SourceType::User => "user",
            SourceType::Mixed => "mixed",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk assessment attached to a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub requires_human: bool,
    /// Confidence the assessment was computed from
    pub confidence: f64,
}

/// Lifecycle status of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Proposed,
    Accepted,
    Rejected,
    Edited,
}

/// Source cited by a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposalSource {
    pub source_type: SourceType,
    /// Concrete reference: field name, URL, or actor id
    pub reference: String,
    /// Registry entry backing this source, when one exists
    pub evidence_id: Option<Uuid>,
    pub confidence: f64,
}

/// Proposal construction and lifecycle errors
#[derive(Debug, Error, PartialEq)]
pub enum ProposalError {
    #[error("proposal for '{0}' has an empty after-value")]
    EmptyAfter(String),

    #[error("proposal for '{0}' does not change the value")]
    Unchanged(String),

    #[error("proposal {id} already left 'proposed' (status: {status:?})")]
    AlreadyDecided { id: Uuid, status: ProposalStatus },

    #[error("cannot transition proposal back to 'proposed'")]
    InvalidTransition,
}

/// Candidate edit to one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub record_id: String,
    pub field: String,
    /// `None` means the field did not exist before
    pub before: Option<String>,
    pub after: String,
    pub rationale: Vec<String>,
    pub sources: Vec<ProposalSource>,
    pub confidence: f64,
    pub risk_level: RiskLevel,
    pub risk: Option<RiskAssessment>,
    pub status: ProposalStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Create a new proposal in the `proposed` status
    ///
    /// A blank before-value is normalized to `None`.
    ///
    /// # Errors
    /// * `EmptyAfter` if `after` is blank
    /// * `Unchanged` if `after` equals `before`
    pub fn new(
        record_id: impl Into<String>,
        field: impl Into<String>,
        before: Option<String>,
        after: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, ProposalError> {
        let field = field.into();
        let after = after.into();
        let before = before.filter(|b| !b.trim().is_empty());

        if after.trim().is_empty() {
            return Err(ProposalError::EmptyAfter(field));
        }
        if before.as_deref() == Some(after.as_str()) {
            return Err(ProposalError::Unchanged(field));
        }

        Ok(Self {
            id: Uuid::new_v4(),
            record_id: record_id.into(),
            field,
            before,
            after,
            rationale: Vec::new(),
            sources: Vec::new(),
            confidence: confidence.clamp(0.0, 1.0),
            risk_level: RiskLevel::Low,
            risk: None,
            status: ProposalStatus::Proposed,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
        })
    }

    /// Before-value as text (`""` when the field did not exist)
    pub fn before_text(&self) -> &str {
        self.before.as_deref().unwrap_or("")
    }

    /// Dominant source type across cited sources
    ///
    /// One distinct type → that type; none or several → `Mixed`.
    pub fn source_type(&self) -> SourceType {
        let mut types = self.sources.iter().map(|s| s.source_type);
        match types.next() {
            Some(first) if types.all(|t| t == first) => first,
            _ => SourceType::Mixed,
        }
    }

    /// Attach a risk assessment
    pub fn set_risk(&mut self, assessment: RiskAssessment) {
        self.risk_level = assessment.level;
        self.risk = Some(assessment);
    }

    /// True once the proposal has left `proposed`
    pub fn is_decided(&self) -> bool {
        self.status != ProposalStatus::Proposed
    }

    /// Move the proposal out of `proposed`
    ///
    /// # Errors
    /// * `AlreadyDecided` if the proposal already has a final status
    /// * `InvalidTransition` if `to` is `Proposed`
    pub fn transition_to(
        &mut self,
        to: ProposalStatus,
        actor: Option<&str>,
    ) -> Result<(), ProposalError> {
        if self.is_decided() {
            return Err(ProposalError::AlreadyDecided {
                id: self.id,
                status: self.status,
            });
        }
        if to == ProposalStatus::Proposed {
            return Err(ProposalError::InvalidTransition);
        }

        self.status = to;
        if let Some(actor) = actor {
            self.reviewed_by = Some(actor.to_string());
            self.reviewed_at = Some(Utc::now());
        }
        Ok(())
    }
}
