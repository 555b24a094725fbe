//! Data models for the enrichment agent
//!
//! - Record and its field alias table
//! - Proposal lifecycle and risk assessment
//! - Pipeline run state machine
//! - Pipeline result

pub mod field_alias;
pub mod pipeline_result;
pub mod pipeline_state;
pub mod proposal;
pub mod record;

pub use pipeline_result::{
    HumanReviewItem, PipelineFailure, PipelineResult, PipelineSummary, Rejection, RunStatus,
    StageResult,
};
pub use pipeline_state::{PipelineRun, PipelineState, StateTransition};
pub use proposal::{
    Proposal, ProposalError, ProposalSource, ProposalStatus, RiskAssessment, RiskLevel, SourceType,
};
pub use record::Record;
