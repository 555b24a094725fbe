//! Human review decisions
//!
//! Proposals escalated by the human gate stay `proposed` until a reviewer
//! accepts, rejects or edits them. Accepting or editing writes the value into
//! the record; an edit also registers the reviewer's value as human evidence.
//! A proposal takes exactly one decision.

use crate::evidence::EvidenceRegistry;
use crate::models::{Proposal, ProposalSource, ProposalStatus, Record, SourceType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Reviewer decision on one proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Reject { reason: String },
    /// Accept with a reviewer-supplied value
    Edit { value: String },
}

/// Review errors
#[derive(Debug, Error, PartialEq)]
pub enum ReviewError {
    #[error("Proposal {id} already decided (status: {status:?})")]
    AlreadyDecided { id: Uuid, status: ProposalStatus },

    #[error("Invalid edit: {0}")]
    InvalidEdit(String),

    #[error("Proposal belongs to record '{expected}', not '{actual}'")]
    RecordMismatch { expected: String, actual: String },
}

/// Apply a reviewer decision to a proposal and its record
///
/// # Errors
/// * `RecordMismatch` if the proposal, record and registry disagree on the record id
/// * `AlreadyDecided` on a second decision
/// * `InvalidEdit` for a blank or unchanged edit value
pub fn apply_decision(
    record: &mut Record,
    registry: &EvidenceRegistry,
    proposal: &mut Proposal,
    decision: Decision,
    reviewer: &str,
) -> Result<(), ReviewError> {
    for actual in [record.id.as_str(), registry.record_id()] {
        if actual != proposal.record_id {
            return Err(ReviewError::RecordMismatch {
                expected: proposal.record_id.clone(),
                actual: actual.to_string(),
            });
        }
    }
    if proposal.is_decided() {
        return Err(ReviewError::AlreadyDecided {
            id: proposal.id,
            status: proposal.status,
        });
    }

    let status = match decision {
        Decision::Accept => {
            record.apply_value(&proposal.field, proposal.after.clone());
            ProposalStatus::Accepted
        }
        Decision::Reject { reason } => {
            proposal.rationale.push(format!("Rejected by reviewer: {}", reason.trim()));
            ProposalStatus::Rejected
        }
        Decision::Edit { value } => {
            let value = value.trim();
            if value.is_empty() {
                return Err(ReviewError::InvalidEdit("edited value is empty".to_string()));
            }
            if value == proposal.before_text() {
                return Err(ReviewError::InvalidEdit(format!(
                    "edited value equals the current value of '{}'",
                    proposal.field
                )));
            }

            let evidence = registry.register_from_human(&proposal.field, value, reviewer);
            proposal.after = value.to_string();
            proposal.sources.push(ProposalSource {
                source_type: SourceType::User,
                reference: reviewer.to_string(),
                evidence_id: Some(evidence.id),
                confidence: evidence.confidence,
            });
            record.apply_value(&proposal.field, value);
            ProposalStatus::Edited
        }
    };

    proposal
        .transition_to(status, Some(reviewer))
        .map_err(|_| ReviewError::AlreadyDecided {
            id: proposal.id,
            status: proposal.status,
        })?;

    info!(
        record_id = %record.id,
        field = %proposal.field,
        reviewer = %reviewer,
        status = ?status,
        "Review decision applied"
    );
    Ok(())
}
