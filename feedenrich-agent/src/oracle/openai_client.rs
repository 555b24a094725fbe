//! OpenAI-compatible chat completion client
//!
//! Posts to `{base_url}/chat/completions` with a JSON-object response format.
//! Requests that carry an image are sent as a multi-part user message and use
//! the vision model.
//!
//! # API Reference
//! - Endpoint: {base_url}/chat/completions
//! - Auth: `Authorization: Bearer <api key>`

use super::{OracleError, OracleRequest, OracleTask, ReasoningOracle};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default text model
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default model for image requests
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o-mini";

/// Default timeout for completion requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// User-Agent header
const USER_AGENT: &str = concat!("feedenrich-agent/", env!("CARGO_PKG_VERSION"));

/// Token cap for image analysis
const VISION_MAX_TOKENS: u32 = 300;

/// OpenAI-compatible oracle
pub struct OpenAiOracle {
    http_client: Client,
    base_url: String,
    model: String,
    vision_model: String,
}

impl OpenAiOracle {
    /// Create client with the default base URL, models and timeout
    ///
    /// # Errors
    /// `NotConfigured` if the API key is blank or the HTTP client cannot be built.
    pub fn new(api_key: &str) -> Result<Self, OracleError> {
        Self::with_options(api_key, DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_VISION_MODEL, DEFAULT_TIMEOUT)
    }

    /// Create client with explicit endpoint, models and timeout
    pub fn with_options(
        api_key: &str,
        base_url: &str,
        model: &str,
        vision_model: &str,
        timeout: Duration,
    ) -> Result<Self, OracleError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(OracleError::NotConfigured("API key is empty".to_string()));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));
        let mut auth = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| OracleError::NotConfigured(format!("Invalid API key: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let http_client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| OracleError::NotConfigured(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            vision_model: vision_model.to_string(),
        })
    }

    fn request_body(&self, request: &OracleRequest) -> serde_json::Value {
        let temperature = match request.task {
            OracleTask::Proposals => 0.3,
            OracleTask::VisualAttributes | OracleTask::WebFacts => 0.1,
        };
        // Any request carrying an image goes to the vision model
        let model = if request.image_url.is_some() || request.task == OracleTask::VisualAttributes {
            &self.vision_model
        } else {
            &self.model
        };

        let user_content = match &request.image_url {
            Some(url) => json!([
                {"type": "text", "text": request.user},
                {"type": "image_url", "image_url": {"url": url}},
            ]),
            None => json!(request.user),
        };

        let mut messages = Vec::new();
        if !request.system.is_empty() {
            messages.push(json!({"role": "system", "content": request.system}));
        }
        messages.push(json!({"role": "user", "content": user_content}));

        let mut body = json!({
            "model": model,
            "messages": messages,
            "response_format": {"type": "json_object"},
            "temperature": temperature,
        });
        if request.image_url.is_some() {
            body["max_tokens"] = json!(VISION_MAX_TOKENS);
        }
        body
    }
}

#[async_trait]
impl ReasoningOracle for OpenAiOracle {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: OracleRequest) -> Result<String, OracleError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(task = %request.task, has_image = request.image_url.is_some(), "Calling oracle");

        let response = self
            .http_client
            .post(&url)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(format!("Oracle request timed out: {}", e))
                } else {
                    OracleError::Network(format!("Oracle request failed: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Api(format!(
                "Oracle API returned error {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| OracleError::Parse(format!("Failed to parse oracle response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| OracleError::Api("Oracle returned no completion".to_string()))?;

        debug!(task = %request.task, chars = content.len(), "Oracle call complete");
        Ok(content)
    }
}

// ============================================================================
// Chat completion response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
