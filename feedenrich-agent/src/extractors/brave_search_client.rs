//! Brave Search client
//!
//! Web search backend for the web-evidence collector.
//!
//! # API Reference
//! - Endpoint: https://api.search.brave.com/res/v1/web/search
//! - Auth: `X-Subscription-Token` header
//! - Rate Limit: 1 request/second (free plan)

use crate::types::CollectorError;
use governor::{Quota, RateLimiter};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Brave Search API URL
const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";

/// Default timeout for search requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Results requested per query
const DEFAULT_RESULT_COUNT: u32 = 3;

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    /// Description plus any extra snippets
    pub snippet: String,
}

/// Brave Search client
pub struct BraveSearchClient {
    http_client: Client,
    base_url: String,
    count: u32,
    /// Rate limiter: 1 request per second
    rate_limiter: RateLimiter<
        governor::state::direct::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl BraveSearchClient {
    /// Create new Brave Search client
    ///
    /// # Errors
    /// `NotAvailable` if the API key is blank, `Internal` if the HTTP client
    /// cannot be built.
    pub fn new(api_key: &str) -> Result<Self, CollectorError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(CollectorError::NotAvailable(
                "Brave Search API key not configured".to_string(),
            ));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        let mut token = header::HeaderValue::from_str(api_key)
            .map_err(|e| CollectorError::Internal(format!("Invalid Brave API key: {}", e)))?;
        token.set_sensitive(true);
        headers.insert("X-Subscription-Token", token);

        let http_client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| CollectorError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: BRAVE_API_URL.to_string(),
            count: DEFAULT_RESULT_COUNT,
            rate_limiter: RateLimiter::direct(Quota::per_second(NonZeroU32::MIN)),
        })
    }

    /// Point the client at another endpoint (self-hosted proxy)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Run one web search
    ///
    /// # Errors
    /// - `Network` if the request fails
    /// - `Api` if Brave returns an error status
    /// - `Parse` if the body is not the expected JSON
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, CollectorError> {
        self.rate_limiter.until_ready().await;
        debug!(query = %query, "Querying Brave Search");

        let count = self.count.to_string();
        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("count", count.as_str()),
                ("extra_snippets", "true"),
            ])
            .send()
            .await
            .map_err(|e| CollectorError::Network(format!("Brave Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollectorError::Api(format!(
                "Brave Search returned error {}: {}",
                status, body
            )));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| CollectorError::Parse(format!("Failed to parse Brave response: {}", e)))?;

        let results = body.into_results();
        debug!(query = %query, results = results.len(), "Brave Search complete");
        Ok(results)
    }
}

/// Render search results as evidence context for the oracle
pub fn format_results(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| format!("- {}\n  {}\n  Source: {}", r.title, r.snippet, r.url))
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Brave response types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    url: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    extra_snippets: Vec<String>,
}

impl BraveResponse {
    fn into_results(self) -> Vec<SearchResult> {
        self.web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                let mut snippet = r.description;
                if !r.extra_snippets.is_empty() {
                    snippet.push(' ');
                    snippet.push_str(&r.extra_snippets.join(" "));
                }
                SearchResult {
                    title: r.title,
                    url: r.url,
                    snippet,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_key_not_available() {
        assert!(matches!(
            BraveSearchClient::new(""),
            Err(CollectorError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_response_mapping() {
        let body: BraveResponse = serde_json::from_str(
            r#"{"web": {"results": [
                {"title": "Air Max 90", "url": "https://nike.com/air-max-90",
                 "description": "Leather upper.", "extra_snippets": ["Rubber sole."]},
                {"title": "Review", "url": "https://blog.example.com/review"}
            ]}}"#,
        )
        .unwrap();
        let results = body.into_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet, "Leather upper. Rubber sole.");
        assert_eq!(results[1].snippet, "");
    }

    #[test]
    fn test_missing_web_section() {
        let body: BraveResponse = serde_json::from_str(r#"{"query": {"original": "x"}}"#).unwrap();
        assert!(body.into_results().is_empty());
    }

    #[test]
    fn test_format_results() {
        let text = format_results(&[SearchResult {
            title: "Air Max 90".into(),
            url: "https://nike.com/air-max-90".into(),
            snippet: "Leather upper.".into(),
        }]);
        assert_eq!(text, "- Air Max 90\n  Leather upper.\n  Source: https://nike.com/air-max-90");
    }
}
