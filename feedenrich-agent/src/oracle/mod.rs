//! Reasoning oracle
//!
//! The external text-generation backend that proposes edits and extracts
//! evidence from images and web pages. It is injected into the pipeline and
//! the collectors as `Arc<dyn ReasoningOracle>`; there is no process-wide
//! client.

pub mod openai_client;
pub mod response;

pub use openai_client::OpenAiOracle;
pub use response::{
    parse_oracle_response, strip_code_fences, OracleAnalysis, OracleIssue, OracleProposal,
    OracleResponse,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of work requested from the oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleTask {
    /// Candidate field proposals for a record
    Proposals,
    /// Attributes visible in a product image
    VisualAttributes,
    /// Facts stated in retrieved web pages
    WebFacts,
}

impl OracleTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleTask::Proposals => "proposals",
            OracleTask::VisualAttributes => "visual_attributes",
            OracleTask::WebFacts => "web_facts",
        }
    }
}

impl fmt::Display for OracleTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One oracle call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    pub task: OracleTask,
    pub system: String,
    pub user: String,
    /// Image sent alongside the user message
    pub image_url: Option<String>,
}

impl OracleRequest {
    pub fn new(task: OracleTask, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            task,
            system: system.into(),
            user: user.into(),
            image_url: None,
        }
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Oracle error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OracleError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// Backend returned an error status or an empty completion
    #[error("API error: {0}")]
    Api(String),

    /// Completion was not the expected JSON shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// No API key or endpoint configured
    #[error("Oracle not configured: {0}")]
    NotConfigured(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// Reasoning oracle trait
///
/// Implementations return the raw completion text; callers parse it with the
/// task-specific parser so malformed output becomes a typed error.
#[async_trait::async_trait]
pub trait ReasoningOracle: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Run one completion
    async fn complete(&self, request: OracleRequest) -> Result<String, OracleError>;
}
