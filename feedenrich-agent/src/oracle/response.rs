//! Oracle response contract
//!
//! Expected shape of a `proposals` completion:
//!
//! ```json
//! {
//!   "analysis": {"score": 0.65, "missing_fields": [], "weak_fields": [], "violations": []},
//!   "proposals": [
//!     {"field": "color", "before": "", "after": "blue", "rationale": "...",
//!      "sources": ["feed:title", "image:color"], "confidence": 0.9, "risk_level": "low"}
//!   ]
//! }
//! ```
//!
//! `source` (string) is accepted in place of `sources`, and `rationale` may be
//! a string or a list. `before`/`after` may be any JSON scalar. Focused scopes
//! may answer with a top-level `score` and an `issues` list instead of the
//! `analysis` block.

use super::OracleError;
use feedenrich_common::FieldValue;
use serde::{Deserialize, Deserializer, Serialize};

/// Quality analysis returned with the proposals
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleAnalysis {
    /// Quality estimate (0.0-1.0), absent if the oracle gave none
    pub score: Option<f64>,
    pub missing_fields: Vec<String>,
    pub weak_fields: Vec<String>,
    pub violations: Vec<String>,
}

/// Candidate edit as returned by the oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleProposal {
    pub field: String,
    #[serde(default)]
    pub before: FieldValue,
    #[serde(default)]
    pub after: FieldValue,
    #[serde(default, deserialize_with = "string_or_list")]
    pub rationale: Vec<String>,
    #[serde(default, alias = "source", deserialize_with = "string_or_list")]
    pub sources: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub risk_level: Option<String>,
}

/// Problem flagged for a human instead of being proposed as an edit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleIssue {
    #[serde(rename = "type")]
    pub kind: String,
    pub field: String,
    pub severity: String,
    pub description: String,
}

/// Parsed `proposals` completion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleResponse {
    #[serde(default)]
    pub analysis: OracleAnalysis,
    /// Top-level score, folded into `analysis.score` by the parser
    #[serde(default, skip_serializing)]
    pub score: Option<f64>,
    #[serde(default)]
    pub issues: Vec<OracleIssue>,
    #[serde(default)]
    pub proposals: Vec<OracleProposal>,
}

/// Accept `"text"`, `["a", "b"]` or `null`
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<FieldValue>),
        None,
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(s)) if s.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(items)) => items
            .iter()
            .map(FieldValue::to_display_string)
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(OneOrMany::None) | None => Vec::new(),
    })
}

/// Remove a surrounding Markdown code fence, if any
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json)
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse a `proposals` completion
///
/// # Errors
/// Returns `OracleError::Parse` if the text is not a JSON object of the
/// expected shape.
pub fn parse_oracle_response(text: &str) -> Result<OracleResponse, OracleError> {
    let body = strip_code_fences(text);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| OracleError::Parse(format!("Oracle response is not JSON: {}", e)))?;
    if !value.is_object() {
        return Err(OracleError::Parse(
            "Oracle response is not a JSON object".to_string(),
        ));
    }

    let mut response: OracleResponse = serde_json::from_value(value)
        .map_err(|e| OracleError::Parse(format!("Unexpected oracle response shape: {}", e)))?;

    if response.analysis.score.is_none() {
        response.analysis.score = response.score.take();
    }
    if let Some(score) = response.analysis.score {
        response.analysis.score = score.is_finite().then(|| score.clamp(0.0, 1.0));
    }
    for proposal in &mut response.proposals {
        proposal.confidence = if proposal.confidence.is_finite() {
            proposal.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
    }
    Ok(response)
}
