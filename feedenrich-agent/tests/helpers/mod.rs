//! Shared test helpers
//!
//! Scripted oracle, mock evidence collectors and record builders for the
//! pipeline integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use feedenrich_agent::models::Record;
use feedenrich_agent::oracle::{OracleError, OracleRequest, OracleTask, ReasoningOracle};
use feedenrich_agent::types::{
    CollectorError, VisualAnalyzer, VisualEvidence, VisualObservation, WebEvidence, WebFact,
    WebRetriever,
};
use feedenrich_agent::workflow::PipelineEvent;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Oracle
// ============================================================================

/// Oracle answering each task with a fixed response
#[derive(Default)]
pub struct ScriptedOracle {
    responses: HashMap<OracleTask, Result<String, OracleError>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `proposals` calls with this text
    pub fn proposals(self, text: &str) -> Self {
        self.respond(OracleTask::Proposals, Ok(text.to_string()))
    }

    pub fn respond(mut self, task: OracleTask, response: Result<String, OracleError>) -> Self {
        self.responses.insert(task, response);
        self
    }

    /// Sleep before answering
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far, in order
    pub fn calls(&self) -> Vec<OracleRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningOracle for ScriptedOracle {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: OracleRequest) -> Result<String, OracleError> {
        let task = request.task;
        self.calls.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(&task)
            .cloned()
            .unwrap_or_else(|| Err(OracleError::Api(format!("no scripted response for {}", task))))
    }
}

// ============================================================================
// Collectors
// ============================================================================

/// Visual analyzer returning fixed observations or a fixed error
pub struct MockVisual {
    observations: Vec<VisualObservation>,
    error: Option<String>,
    delay: Option<Duration>,
}

impl MockVisual {
    pub fn observing(observations: &[(&str, &str, f64)]) -> Self {
        Self {
            observations: observations
                .iter()
                .map(|(attribute, value, confidence)| VisualObservation {
                    attribute: attribute.to_string(),
                    value: value.to_string(),
                    confidence: *confidence,
                    reasoning: format!("{} visible in image", attribute),
                })
                .collect(),
            error: None,
            delay: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            observations: Vec::new(),
            error: Some(message.to_string()),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl VisualAnalyzer for MockVisual {
    fn name(&self) -> &'static str {
        "mock-visual"
    }

    async fn analyze(&self, image_url: &str) -> Result<VisualEvidence, CollectorError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.error {
            return Err(CollectorError::Network(message.clone()));
        }
        let context = self
            .observations
            .iter()
            .map(|o| format!("- {}: {} (confidence {:.2})", o.attribute, o.value, o.confidence))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(VisualEvidence {
            image_url: image_url.to_string(),
            observations: self.observations.clone(),
            context,
        })
    }
}

/// Web retriever returning fixed facts or a fixed error
pub struct MockWeb {
    facts: Vec<WebFact>,
    error: Option<String>,
}

impl MockWeb {
    pub fn finding(facts: &[(&str, &str, &str, f64)]) -> Self {
        Self {
            facts: facts
                .iter()
                .map(|(field, value, url, confidence)| WebFact {
                    field: field.to_string(),
                    value: value.to_string(),
                    source_url: url.to_string(),
                    snippet: format!("{}: {}", field, value),
                    confidence: *confidence,
                })
                .collect(),
            error: None,
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            facts: Vec::new(),
            error: Some(message.to_string()),
        }
    }
}

#[async_trait]
impl WebRetriever for MockWeb {
    fn name(&self) -> &'static str {
        "mock-web"
    }

    async fn retrieve(&self, query: &str) -> Result<WebEvidence, CollectorError> {
        if let Some(message) = &self.error {
            return Err(CollectorError::Api(message.clone()));
        }
        Ok(WebEvidence {
            query: query.to_string(),
            facts: self.facts.clone(),
            context: self
                .facts
                .iter()
                .map(|f| format!("- {}\n  Source: {}", f.snippet, f.source_url))
                .collect::<Vec<_>>()
                .join("\n"),
        })
    }
}

// ============================================================================
// Records and events
// ============================================================================

/// Record passing every default hard rule
pub fn complete_record(id: &str) -> Record {
    Record::from_json_value(serde_json::json!({
        "id": id,
        "title": "Basket Nike Air Max 90 Homme Blanc",
        "description": "Basket Nike Air Max 90 pour homme, tige en cuir blanc, semelle amortissante Air visible.",
        "link": "https://shop.example.com/p/air-max-90",
        "image_link": "https://cdn.example.com/img/air-max-90.jpg",
        "price": "129.99 EUR",
        "brand": "Nike",
        "color": "",
        "availability": "in_stock"
    }))
    .unwrap()
}

/// Record with no image URL and no search key material beyond the title
pub fn bare_record(id: &str) -> Record {
    Record::from_json_value(serde_json::json!({
        "id": id,
        "title": "basket nike",
        "brand": "Nike"
    }))
    .unwrap()
}

/// Drain every event once all senders are gone
pub async fn collect_events(mut rx: mpsc::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}
