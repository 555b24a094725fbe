//! Core Types and Trait Definitions for evidence collection
//!
//! Defines the two optional evidence collaborators consumed by the
//! evidence-gathering stage:
//! - **VisualAnalyzer:** image reference → attribute observations
//! - **WebRetriever:** search query → page-backed facts
//!
//! Both are optional. A missing image URL or search key is a normal
//! degraded path, reported as `CollectorError::NotAvailable`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Collected evidence
// ============================================================================

/// Attribute read from a product image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualObservation {
    /// Canonical field name (color, material, ...)
    pub attribute: String,
    pub value: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
    pub reasoning: String,
}

/// Fact extracted from a retrieved web page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebFact {
    pub field: String,
    pub value: String,
    /// Page the fact was read from (always one of the retrieved results)
    pub source_url: String,
    pub snippet: String,
    /// Confidence score (0.0-1.0)
    pub confidence: f64,
}

/// Output of one visual analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualEvidence {
    pub image_url: String,
    pub observations: Vec<VisualObservation>,
    /// Human-readable summary passed to generation as evidence context
    pub context: String,
}

/// Output of one web retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebEvidence {
    pub query: String,
    pub facts: Vec<WebFact>,
    /// Search result listing passed to generation as evidence context
    pub context: String,
}

// ============================================================================
// Collector traits
// ============================================================================

/// Visual-evidence collaborator
#[async_trait::async_trait]
pub trait VisualAnalyzer: Send + Sync {
    /// Collector name for logs and events
    fn name(&self) -> &'static str;

    /// Analyze one product image
    ///
    /// # Errors
    /// Returns `CollectorError` on network/oracle failure. The pipeline treats
    /// every error as "no evidence from this source".
    async fn analyze(&self, image_url: &str) -> Result<VisualEvidence, CollectorError>;
}

/// Web-retrieval collaborator
#[async_trait::async_trait]
pub trait WebRetriever: Send + Sync {
    /// Collector name for logs and events
    fn name(&self) -> &'static str;

    /// Retrieve facts for one search query
    ///
    /// # Errors
    /// Returns `CollectorError::NotAvailable` when no search backend is
    /// configured, other variants on failure.
    async fn retrieve(&self, query: &str) -> Result<WebEvidence, CollectorError>;
}

/// Collector error
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Network communication error
    #[error("Network error: {0}")]
    Network(String),

    /// External API error
    #[error("API error: {0}")]
    Api(String),

    /// Failed to parse response or data
    #[error("Parse error: {0}")]
    Parse(String),

    /// Collector not configured or input missing
    #[error("Collector not available: {0}")]
    NotAvailable(String),

    /// Internal processing error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::oracle::OracleError> for CollectorError {
    fn from(err: crate::oracle::OracleError) -> Self {
        use crate::oracle::OracleError;
        match err {
            OracleError::Network(msg) | OracleError::Timeout(msg) => CollectorError::Network(msg),
            OracleError::Api(msg) => CollectorError::Api(msg),
            OracleError::Parse(msg) => CollectorError::Parse(msg),
            OracleError::NotConfigured(msg) => CollectorError::NotAvailable(msg),
        }
    }
}
