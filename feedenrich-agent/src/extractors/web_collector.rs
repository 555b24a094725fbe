//! Web evidence collector
//!
//! Searches the web for the product, then asks the oracle to extract facts
//! that the returned pages state explicitly. A fact must cite one of the
//! returned result URLs or it is dropped.

use super::brave_search_client::{format_results, BraveSearchClient, SearchResult};
use crate::models::field_alias;
use crate::oracle::{strip_code_fences, OracleRequest, OracleTask, ReasoningOracle};
use crate::types::{CollectorError, WebEvidence, WebFact, WebRetriever};
use async_trait::async_trait;
use feedenrich_common::{FieldMap, FieldValue};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Minimum GTIN length used as a search key
const MIN_GTIN_LEN: usize = 8;

/// Fields the extractor is asked for
const WEB_FACT_FIELDS: &[&str] = &[
    "brand",
    "gtin",
    "mpn",
    "material",
    "color",
    "pattern",
    "gender",
    "age_group",
    "product_type",
    "dimensions",
    "weight",
];

/// Build the web search query for a record
///
/// GTIN (8+ characters) → `"<gtin> product specifications"`, else brand +
/// title, else title. `None` when the record has none of these.
pub fn build_search_query(fields: &FieldMap) -> Option<String> {
    let gtin = field_alias::field_text(fields, "gtin");
    if gtin.chars().count() >= MIN_GTIN_LEN {
        return Some(format!("{} product specifications", gtin));
    }

    let brand = field_alias::field_text(fields, "brand");
    let title = field_alias::field_text(fields, "title");
    match (brand.is_empty(), title.is_empty()) {
        (false, false) => Some(format!("{} {}", brand, title)),
        (_, false) => Some(title),
        _ => None,
    }
}

/// Web retriever: Brave Search + oracle fact extraction
pub struct BraveWebRetriever {
    search: BraveSearchClient,
    oracle: Arc<dyn ReasoningOracle>,
}

impl BraveWebRetriever {
    pub fn new(search: BraveSearchClient, oracle: Arc<dyn ReasoningOracle>) -> Self {
        Self { search, oracle }
    }
}

#[async_trait]
impl WebRetriever for BraveWebRetriever {
    fn name(&self) -> &'static str {
        "web"
    }

    async fn retrieve(&self, query: &str) -> Result<WebEvidence, CollectorError> {
        let results = self.search.search(query).await?;
        if results.is_empty() {
            debug!(query = %query, "Web search returned no results");
            return Ok(WebEvidence {
                query: query.to_string(),
                ..Default::default()
            });
        }

        let context = format_results(&results);
        let request = OracleRequest::new(OracleTask::WebFacts, "", fact_prompt(&context));
        let completion = self.oracle.complete(request).await?;
        let facts = parse_web_facts(&completion, &results)?;

        debug!(query = %query, results = results.len(), facts = facts.len(), "Web retrieval complete");
        Ok(WebEvidence {
            query: query.to_string(),
            facts,
            context,
        })
    }
}

fn fact_prompt(context: &str) -> String {
    format!(
        r#"You are a FACT EXTRACTOR. Extract ONLY verifiable product facts from these search results.

CRITICAL CONSTRAINTS:
- Extract ONLY facts that are EXPLICITLY stated in the results
- NO inference, NO assumptions
- Include the EXACT text snippet as evidence and the URL it came from
- If a field is not found, do NOT include it

FIELDS TO EXTRACT: {}

SEARCH RESULTS:
{}

OUTPUT FORMAT (JSON only):
{{
  "facts": [
    {{"field": "material", "value": "100% cotton", "source_url": "https://...", "snippet": "Made from 100% cotton", "confidence": 0.9}}
  ]
}}

Return ONLY the JSON. Empty array if nothing found."#,
        WEB_FACT_FIELDS.join(", "),
        context
    )
}

#[derive(Debug, Deserialize)]
struct RawFacts {
    #[serde(default)]
    facts: Vec<RawFact>,
}

#[derive(Debug, Deserialize)]
struct RawFact {
    #[serde(default)]
    field: String,
    #[serde(default)]
    value: FieldValue,
    #[serde(default, alias = "url")]
    source_url: String,
    #[serde(default, alias = "evidence")]
    snippet: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Parse a `web_facts` completion, keeping facts that cite a returned result
///
/// # Errors
/// `Parse` if the completion is not the expected JSON shape.
pub fn parse_web_facts(text: &str, results: &[SearchResult]) -> Result<Vec<WebFact>, CollectorError> {
    let raw: RawFacts = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| CollectorError::Parse(format!("Web facts response is not valid: {}", e)))?;

    let known_urls: HashSet<&str> = results.iter().map(|r| r.url.as_str()).collect();
    let mut facts = Vec::new();
    for fact in raw.facts {
        let value = fact.value.to_display_string().trim().to_string();
        let field = field_alias::canonical_name(fact.field.trim());
        if field.is_empty() || value.is_empty() {
            continue;
        }
        let source_url = fact.source_url.trim();
        if !known_urls.contains(source_url) {
            warn!(field = %field, source_url = %source_url, "Dropping web fact with untraceable source");
            continue;
        }
        facts.push(WebFact {
            field,
            value,
            source_url: source_url.to_string(),
            snippet: fact.snippet,
            confidence: fact
                .confidence
                .filter(|c| c.is_finite())
                .unwrap_or(0.5)
                .clamp(0.0, 1.0),
        });
    }
    Ok(facts)
}
