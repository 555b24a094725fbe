//! Visual evidence collector
//!
//! Sends the product image to the oracle and turns the returned attributes
//! into `VisualObservation`s. Only attributes the oracle can see are kept;
//! nothing is inferred here.

use crate::oracle::{strip_code_fences, OracleRequest, OracleTask, ReasoningOracle};
use crate::types::{CollectorError, VisualAnalyzer, VisualEvidence, VisualObservation};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Attributes read from images
pub const VISUAL_ATTRIBUTES: &[&str] = &[
    "color",
    "material",
    "pattern",
    "style",
    "gender",
    "age_group",
    "product_type",
];

/// Confidence given to attributes returned as bare strings
const BASE_CONFIDENCE: f64 = 0.8;

/// Values meaning "could not tell"
const UNKNOWN_VALUES: &[&str] = &["unknown", "n/a", "none", "not visible", "unclear"];

const VISUAL_PROMPT: &str = r#"Extract the factual product attributes visible in this image. Output JSON:
{
  "color": {"value": "primary color (black, blue, red, white, beige)", "confidence": 0.0-1.0, "reasoning": "what you see"},
  "material": {"value": "visible material (cotton, leather, denim, wool, polyester)", "confidence": 0.0-1.0, "reasoning": "..."},
  "pattern": {"value": "solid, striped, floral, checkered, printed, geometric", "confidence": 0.0-1.0, "reasoning": "..."},
  "style": {"value": "casual, formal, sporty, vintage", "confidence": 0.0-1.0, "reasoning": "..."},
  "gender": {"value": "male, female, unisex (only if obvious)", "confidence": 0.0-1.0, "reasoning": "..."},
  "age_group": {"value": "adult, kids, infant (only if obvious)", "confidence": 0.0-1.0, "reasoning": "..."},
  "product_type": {"value": "what the product is (t-shirt, sneakers, handbag)", "confidence": 0.0-1.0, "reasoning": "..."},
  "other_observations": ["any other relevant facts"]
}

ONLY state what you can clearly see. Omit attributes you cannot see. Do NOT invent or guess."#;

/// Visual analyzer backed by the reasoning oracle
pub struct OracleVisualAnalyzer {
    oracle: Arc<dyn ReasoningOracle>,
}

impl OracleVisualAnalyzer {
    pub fn new(oracle: Arc<dyn ReasoningOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl VisualAnalyzer for OracleVisualAnalyzer {
    fn name(&self) -> &'static str {
        "visual"
    }

    async fn analyze(&self, image_url: &str) -> Result<VisualEvidence, CollectorError> {
        if image_url.trim().is_empty() {
            return Err(CollectorError::NotAvailable("no image URL".to_string()));
        }

        let request =
            OracleRequest::new(OracleTask::VisualAttributes, "", VISUAL_PROMPT).with_image(image_url);
        let completion = self.oracle.complete(request).await?;
        let evidence = parse_visual_response(image_url, &completion)?;

        debug!(
            image_url = %image_url,
            observations = evidence.observations.len(),
            "Visual analysis complete"
        );
        Ok(evidence)
    }
}

/// Parse a `visual_attributes` completion
///
/// # Errors
/// `Parse` if the completion is not a JSON object.
pub fn parse_visual_response(image_url: &str, text: &str) -> Result<VisualEvidence, CollectorError> {
    let value: Value = serde_json::from_str(strip_code_fences(text))
        .map_err(|e| CollectorError::Parse(format!("Visual response is not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| CollectorError::Parse("Visual response is not a JSON object".to_string()))?;

    let mut observations = Vec::new();
    for attribute in VISUAL_ATTRIBUTES {
        let Some(raw) = object.get(*attribute) else {
            continue;
        };
        if let Some(obs) = observation_from_value(attribute, raw) {
            observations.push(obs);
        }
    }

    let extras: Vec<String> = object
        .get("other_observations")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut lines: Vec<String> = observations
        .iter()
        .map(|o| format!("- {}: {} (confidence {:.2})", o.attribute, o.value, o.confidence))
        .collect();
    lines.extend(extras.iter().map(|e| format!("- {}", e)));

    Ok(VisualEvidence {
        image_url: image_url.to_string(),
        observations,
        context: lines.join("\n"),
    })
}

fn observation_from_value(attribute: &str, raw: &Value) -> Option<VisualObservation> {
    let (value, confidence, reasoning) = match raw {
        Value::String(s) => (s.clone(), BASE_CONFIDENCE, String::new()),
        Value::Object(obj) => {
            let value = obj.get("value").and_then(Value::as_str)?.to_string();
            let confidence = obj
                .get("confidence")
                .and_then(Value::as_f64)
                .filter(|c| c.is_finite())
                .unwrap_or(BASE_CONFIDENCE)
                .clamp(0.0, 1.0);
            let reasoning = obj
                .get("reasoning")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            (value, confidence, reasoning)
        }
        _ => return None,
    };

    let value = value.trim();
    if value.is_empty() || UNKNOWN_VALUES.contains(&value.to_lowercase().as_str()) {
        return None;
    }

    Some(VisualObservation {
        attribute: attribute.to_string(),
        value: value.to_string(),
        confidence,
        reasoning: if reasoning.is_empty() {
            "visible in product image".to_string()
        } else {
            reasoning
        },
    })
}
