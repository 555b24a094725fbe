//! Proposal Generation Stage
//!
//! Asks the reasoning oracle for candidate field edits, given the record, the
//! registry's allowed facts and any gathered evidence text. Candidates whose
//! value or claimed source is a placeholder are filtered here, before
//! screening; every other judgment is left to the deterministic stages.

pub mod prompts;
pub mod scope;

pub use scope::{OptimizationScope, ScopeInfo};

use crate::models::{field_alias, Record, SourceType};
use crate::oracle::{
    parse_oracle_response, OracleAnalysis, OracleError, OracleIssue, OracleRequest, OracleTask,
    ReasoningOracle,
};
use crate::validators::screening::contract_violation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs for one generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub record: &'a Record,
    pub scope: OptimizationScope,
    /// Verified field → value whitelist
    pub allowed_facts: &'a BTreeMap<String, String>,
    /// Visual/web evidence summaries, may be empty
    pub evidence_context: &'a str,
}

/// Candidate edit, normalized from the oracle output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedCandidate {
    /// Canonical field name
    pub field: String,
    /// Value currently in the record (the oracle's claim is not trusted)
    pub before: String,
    pub after: String,
    pub rationale: Vec<String>,
    /// Source labels as written by the oracle
    pub sources: Vec<String>,
    pub confidence: f64,
    /// Oracle's own risk label, informational only
    pub risk_hint: Option<String>,
}

/// Candidate dropped for breaking the output contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredCandidate {
    pub candidate: GeneratedCandidate,
    pub reason: String,
}

/// Result of one generation call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub analysis: OracleAnalysis,
    pub issues: Vec<OracleIssue>,
    /// Candidates that reach screening, in oracle order
    pub candidates: Vec<GeneratedCandidate>,
    /// Placeholder values or untraceable sources, in oracle order
    pub filtered: Vec<FilteredCandidate>,
}

/// Proposal generator backed by the reasoning oracle
pub struct ProposalGenerator {
    oracle: Arc<dyn ReasoningOracle>,
}

impl ProposalGenerator {
    pub fn new(oracle: Arc<dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }

    /// Run one generation call
    ///
    /// # Errors
    /// Any oracle failure, including an unparseable response. The pipeline
    /// treats this as terminal for the record.
    pub async fn generate(&self, request: GenerationRequest<'_>) -> Result<GenerationOutput, OracleError> {
        let oracle_request = OracleRequest::new(
            OracleTask::Proposals,
            prompts::system_prompt(request.scope),
            build_user_prompt(&request),
        );
        let completion = self.oracle.complete(oracle_request).await?;
        let response = parse_oracle_response(&completion)?;

        let mut output = GenerationOutput {
            analysis: response.analysis,
            issues: response.issues,
            ..Default::default()
        };

        for raw in response.proposals {
            let field = field_alias::canonical_name(raw.field.trim());
            let candidate = GeneratedCandidate {
                before: request.record.field_text(&field),
                after: raw.after.to_display_string().trim().to_string(),
                field,
                rationale: raw.rationale,
                sources: raw.sources,
                confidence: raw.confidence,
                risk_hint: raw.risk_level,
            };

            match contract_violation(&candidate.after, &candidate.sources) {
                Some(reason) => {
                    warn!(
                        record_id = %request.record.id,
                        field = %candidate.field,
                        reason = %reason,
                        "Filtered non-concrete proposal"
                    );
                    output.filtered.push(FilteredCandidate { candidate, reason });
                }
                None => output.candidates.push(candidate),
            }
        }

        debug!(
            record_id = %request.record.id,
            scope = %request.scope,
            candidates = output.candidates.len(),
            filtered = output.filtered.len(),
            issues = output.issues.len(),
            "Generation complete"
        );
        Ok(output)
    }
}

/// User message for a generation call
pub fn build_user_prompt(request: &GenerationRequest<'_>) -> String {
    let product = serde_json::to_string_pretty(&request.record.current_json())
        .unwrap_or_else(|_| "{}".to_string());
    let facts = serde_json::to_string_pretty(request.allowed_facts).unwrap_or_else(|_| "{}".to_string());

    let mut prompt = format!(
        "Product Data:\n{}\n\nALLOWED FACTS (verified evidence, the only facts you may use):\n{}",
        product, facts
    );
    if !request.evidence_context.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(request.evidence_context.trim());
    }
    prompt.push_str(&format!(
        "\n\nGenerate optimization proposals for {} only.",
        request.scope
    ));
    prompt
}

/// Split a source label into its type and concrete reference
///
/// `feed:brand` → (Feed, "brand"), `image:color` → (Image, "color"),
/// `https://...` → (Web, url). Unrecognized labels are `Mixed` with the
/// whole label as reference.
pub fn parse_source_label(label: &str) -> (SourceType, String) {
    let label = label.trim();
    let lower = label.to_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return (SourceType::Web, label.to_string());
    }
    if let Some((kind, reference)) = label.split_once(':') {
        let source_type = SourceType::parse(kind);
        if source_type != SourceType::Mixed {
            let reference = reference.trim();
            return (source_type, reference.to_string());
        }
    }
    match SourceType::parse(label) {
        SourceType::Mixed => (SourceType::Mixed, label.to_string()),
        source_type => (source_type, String::new()),
    }
}
