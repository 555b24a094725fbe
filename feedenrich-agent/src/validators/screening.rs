//! Deterministic proposal screen
//!
//! No oracle calls. Every candidate either passes or gets one rejection
//! reason; the first failing check wins.
//!
//! `contract_violation` is the output-shape check applied while parsing
//! oracle candidates; `screen_candidate` is the screening stage proper.

use super::hard_rule_validator::has_http_scheme;
use crate::generation::OptimizationScope;
use reqwest::Url;

/// Phrases that mark an instruction or description instead of a real value
const PLACEHOLDER_PHRASES: &[&str] = &[
    "correct price",
    "valid product",
    "should be",
    "needs to be",
    "must be",
    "from landing page",
    "without watermarks",
    "recommended action",
    "needs update",
    "to be fixed",
    "requires review",
    "human review",
    "manual check",
    "verify this",
    "check the",
];

const PRICE_FIELDS: &[&str] = &["price", "sale_price"];

/// Screening thresholds
#[derive(Debug, Clone, Copy)]
pub struct ScreenPolicy {
    /// Candidates below this confidence are rejected
    pub min_confidence: f64,
    pub scope: OptimizationScope,
}

/// Candidate as seen by the screen
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub field: &'a str,
    pub before: &'a str,
    pub after: &'a str,
    pub confidence: f64,
}

/// True if the value is a placeholder rather than concrete data
pub fn is_placeholder_value(value: &str) -> bool {
    let lower = value.to_lowercase();
    PLACEHOLDER_PHRASES.iter().any(|p| lower.contains(p))
}

/// Field holds a URL (name mentions link, url or image)
pub fn is_url_field(field: &str) -> bool {
    let lower = field.to_lowercase();
    lower.contains("link") || lower.contains("url") || lower.contains("image")
}

pub fn is_price_field(field: &str) -> bool {
    PRICE_FIELDS.contains(&field.to_lowercase().as_str())
}

/// Absolute http(s) URL with a host
pub fn is_well_formed_url(value: &str) -> bool {
    let value = value.trim();
    if !has_http_scheme(value) || value.contains(char::is_whitespace) {
        return false;
    }
    Url::parse(value)
        .map(|url| url.host_str().is_some_and(|h| !h.is_empty()))
        .unwrap_or(false)
}

/// Placeholder after-value or non-traceable claimed source
pub fn contract_violation(after: &str, sources: &[String]) -> Option<String> {
    if is_placeholder_value(after) {
        return Some("placeholder value instead of concrete data".to_string());
    }
    sources
        .iter()
        .find(|s| is_placeholder_value(s))
        .map(|s| format!("non-traceable source: {}", s))
}

/// Screen one candidate
///
/// Returns the rejection reason, or `None` if the candidate passes.
pub fn screen_candidate(candidate: &Candidate<'_>, policy: &ScreenPolicy) -> Option<String> {
    let after = candidate.after.trim();
    let before = candidate.before.trim();

    if after.is_empty() {
        return Some("empty value".to_string());
    }
    if after == before {
        return Some("unchanged value".to_string());
    }
    if !policy.scope.covers_field(candidate.field) {
        return Some("outside optimization scope".to_string());
    }
    if candidate.confidence < policy.min_confidence {
        return Some(format!(
            "confidence {:.2} below minimum {:.2}",
            candidate.confidence, policy.min_confidence
        ));
    }
    if is_url_field(candidate.field) && !is_well_formed_url(after) {
        return Some("invalid URL".to_string());
    }
    if is_price_field(candidate.field) && !after.chars().any(|c| c.is_ascii_digit()) {
        return Some("price without digits".to_string());
    }
    if !before.is_empty() && after.chars().count() * 2 < before.chars().count() {
        return Some("content truncated".to_string());
    }
    None
}
