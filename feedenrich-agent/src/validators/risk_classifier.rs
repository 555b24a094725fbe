//! Risk Classifier
//!
//! Trust gate deciding whether a proposed change may be applied
//! automatically or must go to a human reviewer.
//!
//! # Precedence
//! Checks run in a fixed order and can only raise the level:
//! 1. High-risk field → high
//! 2. Newly introduced high-risk keyword → high
//! 3. Web or image source → medium
//! 4. Confidence < 0.7 → medium
//! 5. Confidence < 0.5 → high (hard floor)
//! 6. Word-overlap change ratio > 0.7 → medium, > 0.9 → high
//!
//! A change that ends up low with no reasons gets affirmative reasons so the
//! audit trail explains why it was trusted.

use super::diff_engine::change_ratio;
use crate::models::{RiskAssessment, RiskLevel, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Fields whose values carry legal/safety weight
const HIGH_RISK_FIELDS: &[&str] = &[
    "material",
    "ingredients",
    "weight",
    "dimensions",
    "capacity",
    "voltage",
    "wattage",
    "compatibility",
    "certifications",
    "warranty",
    "age_group",
    "energy_class",
];

/// Health, safety, legal, performance and origin claims
const HIGH_RISK_KEYWORDS: &[&str] = &[
    // Health
    "organic",
    "bio",
    "natural",
    "hypoallergenic",
    "dermatologically tested",
    "clinically proven",
    "medical",
    "therapeutic",
    "healing",
    // Safety
    "fireproof",
    "waterproof",
    "shockproof",
    "childproof",
    "non-toxic",
    "food-grade",
    "bpa-free",
    "lead-free",
    // Legal
    "certified",
    "approved",
    "compliant",
    "patented",
    "trademarked",
    // Performance
    "best",
    "fastest",
    "strongest",
    "most efficient",
    "guaranteed",
    // Origin
    "made in",
    "manufactured in",
    "assembled in",
];

/// Medium confidence threshold
const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Below this, risk is forced to high
const CONFIDENCE_FLOOR: f64 = 0.5;

/// Below this, the human gate always fires
const HUMAN_REVIEW_CONFIDENCE: f64 = 0.6;

const HIGH_CONFIDENCE: f64 = 0.9;
const SIGNIFICANT_CHANGE_RATIO: f64 = 0.7;
const REWRITE_CHANGE_RATIO: f64 = 0.9;
const MINOR_CHANGE_RATIO: f64 = 0.3;

/// Default number of medium-risk changes that makes a batch medium
pub const DEFAULT_BATCH_MEDIUM_THRESHOLD: usize = 3;

/// Default batch size above which a batch is at least medium
pub const DEFAULT_BATCH_SIZE_THRESHOLD: usize = 5;

/// One change in a batch assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub field: String,
    pub before: String,
    pub after: String,
    pub source_type: SourceType,
    pub confidence: f64,
}

/// Aggregate assessment of several changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub requires_human: bool,
    /// Mean confidence of the changes (1.0 for an empty batch)
    pub confidence: f64,
    /// Individual assessments, input order
    pub per_change: Vec<RiskAssessment>,
}

/// Risk classifier
pub struct RiskClassifier {
    high_risk_fields: HashSet<&'static str>,
    batch_medium_threshold: usize,
    batch_size_threshold: usize,
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskClassifier {
    /// Create classifier with default batch thresholds
    pub fn new() -> Self {
        Self::with_thresholds(DEFAULT_BATCH_MEDIUM_THRESHOLD, DEFAULT_BATCH_SIZE_THRESHOLD)
    }

    /// Create classifier with custom batch thresholds
    ///
    /// # Arguments
    /// * `batch_medium_threshold` - Medium-risk changes that make a batch medium
    /// * `batch_size_threshold` - Batch size above which a batch is medium
    pub fn with_thresholds(batch_medium_threshold: usize, batch_size_threshold: usize) -> Self {
        Self {
            high_risk_fields: HIGH_RISK_FIELDS.iter().copied().collect(),
            batch_medium_threshold,
            batch_size_threshold,
        }
    }

    /// Assess one proposed change
    pub fn assess_change(
        &self,
        field: &str,
        before: &str,
        after: &str,
        source_type: SourceType,
        confidence: f64,
    ) -> RiskAssessment {
        let mut level = RiskLevel::Low;
        let mut requires_human = false;
        let mut reasons = Vec::new();

        if self.high_risk_fields.contains(field.to_lowercase().as_str()) {
            level = RiskLevel::High;
            requires_human = true;
            reasons.push(format!("high-risk field: {}", field));
        }

        let lower_before = before.to_lowercase();
        let lower_after = after.to_lowercase();
        for keyword in HIGH_RISK_KEYWORDS {
            if lower_after.contains(keyword) && !lower_before.contains(keyword) {
                level = RiskLevel::High;
                requires_human = true;
                reasons.push(format!("new high-risk keyword: {}", keyword));
            }
        }

        if level != RiskLevel::High {
            match source_type {
                SourceType::Web => {
                    level = RiskLevel::Medium;
                    reasons.push("sourced from web".to_string());
                }
                SourceType::Image => {
                    level = RiskLevel::Medium;
                    reasons.push("inferred from image".to_string());
                }
                _ => {}
            }
        }

        if confidence < MEDIUM_CONFIDENCE_THRESHOLD && level != RiskLevel::High {
            level = RiskLevel::Medium;
            reasons.push(format!("low confidence: {}%", (confidence * 100.0).round() as i64));
        }

        if confidence < CONFIDENCE_FLOOR {
            level = RiskLevel::High;
            requires_human = true;
            reasons.push("very low confidence".to_string());
        }

        let ratio = change_ratio(before, after);
        if ratio > SIGNIFICANT_CHANGE_RATIO && level != RiskLevel::High {
            level = RiskLevel::Medium;
            reasons.push("significant content change".to_string());
        }
        if ratio > REWRITE_CHANGE_RATIO {
            level = RiskLevel::High;
            requires_human = true;
            reasons.push("near-complete rewrite".to_string());
        }

        if level == RiskLevel::Low && reasons.is_empty() {
            if source_type == SourceType::Feed {
                reasons.push("data from original feed".to_string());
            }
            if confidence >= HIGH_CONFIDENCE {
                reasons.push("high confidence".to_string());
            }
            if ratio < MINOR_CHANGE_RATIO {
                reasons.push("minor change".to_string());
            }
        }

        debug!(
            field = %field,
            level = %level,
            requires_human = requires_human,
            change_ratio = ratio,
            "Change assessed"
        );

        RiskAssessment {
            level,
            reasons,
            requires_human,
            confidence,
        }
    }

    /// Assess several changes together
    ///
    /// Any high change makes the batch high. Reaching the medium-count
    /// threshold, or exceeding the batch-size threshold, makes it medium.
    pub fn assess_batch(&self, changes: &[ChangeRequest]) -> BatchRiskAssessment {
        let per_change: Vec<RiskAssessment> = changes
            .iter()
            .map(|c| self.assess_change(&c.field, &c.before, &c.after, c.source_type, c.confidence))
            .collect();

        let mut reasons = Vec::new();
        let mut high_count = 0;
        let mut medium_count = 0;
        for assessment in &per_change {
            match assessment.level {
                RiskLevel::High => {
                    high_count += 1;
                    reasons.extend(assessment.reasons.iter().cloned());
                }
                RiskLevel::Medium => medium_count += 1,
                RiskLevel::Low => {}
            }
        }

        let mut requires_human = per_change.iter().any(|a| a.requires_human);
        let level = if high_count > 0 {
            requires_human = true;
            RiskLevel::High
        } else if medium_count >= self.batch_medium_threshold
            || changes.len() > self.batch_size_threshold
        {
            reasons.push("multiple medium-risk changes".to_string());
            RiskLevel::Medium
        } else if medium_count > 0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        };

        let confidence = if per_change.is_empty() {
            1.0
        } else {
            per_change.iter().map(|a| a.confidence).sum::<f64>() / per_change.len() as f64
        };

        BatchRiskAssessment {
            level,
            reasons,
            requires_human,
            confidence,
            per_change,
        }
    }

    /// The human gate
    ///
    /// True if the assessment requires a human, is high risk, or has
    /// confidence below 0.6. Callers must consult this before applying
    /// anything automatically.
    pub fn should_require_human_review(&self, assessment: &RiskAssessment) -> bool {
        assessment.requires_human
            || assessment.level == RiskLevel::High
            || assessment.confidence < HUMAN_REVIEW_CONFIDENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(field: &str, before: &str, after: &str, source: SourceType, confidence: f64) -> ChangeRequest {
        ChangeRequest {
            field: field.into(),
            before: before.into(),
            after: after.into(),
            source_type: source,
            confidence,
        }
    }

    #[test]
    fn test_high_risk_field_is_case_insensitive() {
        let a = RiskClassifier::new().assess_change("Material", "cotton", "cotton blend", SourceType::Feed, 0.95);
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.requires_human);
        assert_eq!(a.reasons[0], "high-risk field: Material");
    }

    #[test]
    fn test_new_keyword_flagged() {
        let a = RiskClassifier::new().assess_change("material", "", "organic cotton", SourceType::Web, 0.8);
        assert_eq!(a.level, RiskLevel::High);
        assert!(a.requires_human);
        assert!(a.reasons.contains(&"new high-risk keyword: organic".to_string()));
    }

    #[test]
    fn test_existing_keyword_not_reflagged() {
        let a = RiskClassifier::new().assess_change(
            "title",
            "T-shirt waterproof homme bleu",
            "T-shirt waterproof homme bleu marine",
            SourceType::Feed,
            0.95,
        );
        assert_eq!(a.level, RiskLevel::Low, "{:?}", a.reasons);
    }

    #[test]
    fn test_unchanged_value_stays_low() {
        let classifier = RiskClassifier::new();
        let a = classifier.assess_change("color", "blue", "blue", SourceType::Feed, 0.95);
        assert_eq!(a.level, RiskLevel::Low);
        assert!(!a.requires_human);
        assert_eq!(a.reasons, vec!["data from original feed", "high confidence", "minor change"]);
        assert!(!classifier.should_require_human_review(&a));
    }

    #[test]
    fn test_source_type_raises_to_medium() {
        let classifier = RiskClassifier::new();
        let web = classifier.assess_change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Web, 0.9);
        assert_eq!(web.level, RiskLevel::Medium);
        assert!(web.reasons.contains(&"sourced from web".to_string()));

        let img = classifier.assess_change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Image, 0.9);
        assert_eq!(img.level, RiskLevel::Medium);
        assert!(img.reasons.contains(&"inferred from image".to_string()));

        let mixed = classifier.assess_change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Mixed, 0.9);
        assert_eq!(mixed.level, RiskLevel::Low);
    }

    #[test]
    fn test_low_confidence_reason_formats_percent() {
        let a = RiskClassifier::new().assess_change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Mixed, 0.65);
        assert_eq!(a.level, RiskLevel::Medium);
        assert!(a.reasons.contains(&"low confidence: 65%".to_string()));
    }

    #[test]
    fn test_confidence_floor_overrides_everything() {
        let classifier = RiskClassifier::new();
        for source in [SourceType::Feed, SourceType::User, SourceType::Web, SourceType::Image, SourceType::Mixed] {
            for confidence in [0.0, 0.2, 0.49, 0.4999] {
                let a = classifier.assess_change("color", "blue", "blue", source, confidence);
                assert_eq!(a.level, RiskLevel::High);
                assert!(a.requires_human);
            }
        }
    }

    #[test]
    fn test_change_magnitude() {
        let classifier = RiskClassifier::new();
        // 1 shared word out of 4 distinct → ratio 0.75
        let significant = classifier.assess_change("title", "red shoe", "red boot big", SourceType::Mixed, 0.95);
        assert_eq!(significant.level, RiskLevel::Medium);
        assert!(significant.reasons.contains(&"significant content change".to_string()));

        let rewrite = classifier.assess_change("title", "red shoe", "blue boot", SourceType::Mixed, 0.95);
        assert_eq!(rewrite.level, RiskLevel::High);
        assert!(rewrite.requires_human);
        assert!(rewrite.reasons.contains(&"near-complete rewrite".to_string()));
    }

    #[test]
    fn test_human_gate() {
        let classifier = RiskClassifier::new();
        let gate = |level, requires_human, confidence| {
            classifier.should_require_human_review(&RiskAssessment {
                level,
                reasons: vec![],
                requires_human,
                confidence,
            })
        };
        assert!(gate(RiskLevel::Low, true, 0.99));
        assert!(gate(RiskLevel::High, false, 0.99));
        assert!(gate(RiskLevel::Medium, false, 0.59));
        assert!(!gate(RiskLevel::Medium, false, 0.6));
        assert!(!gate(RiskLevel::Low, false, 0.9));
    }

    #[test]
    fn test_batch_any_high_makes_high() {
        let batch = RiskClassifier::new().assess_batch(&[
            change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Mixed, 0.95),
            change("material", "", "cuir", SourceType::Web, 0.9),
        ]);
        assert_eq!(batch.level, RiskLevel::High);
        assert!(batch.requires_human);
        assert_eq!(batch.per_change.len(), 2);
        assert!((batch.confidence - 0.925).abs() < 1e-9);
    }

    #[test]
    fn test_batch_medium_threshold() {
        let medium = change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Web, 0.9);
        let classifier = RiskClassifier::new();

        let two = classifier.assess_batch(&[medium.clone(), medium.clone()]);
        assert_eq!(two.level, RiskLevel::Medium);
        assert!(two.reasons.is_empty());

        let three = classifier.assess_batch(&[medium.clone(), medium.clone(), medium.clone()]);
        assert_eq!(three.level, RiskLevel::Medium);
        assert_eq!(three.reasons, vec!["multiple medium-risk changes"]);

        let strict = RiskClassifier::with_thresholds(2, 5).assess_batch(&[medium.clone(), medium]);
        assert_eq!(strict.reasons, vec!["multiple medium-risk changes"]);
    }

    #[test]
    fn test_batch_size_threshold() {
        let low = change("title", "Basket Nike Air", "Basket Nike Air Max", SourceType::Mixed, 0.95);
        let classifier = RiskClassifier::new();

        let five = classifier.assess_batch(&vec![low.clone(); 5]);
        assert_eq!(five.level, RiskLevel::Low);

        let six = classifier.assess_batch(&vec![low; 6]);
        assert_eq!(six.level, RiskLevel::Medium);
        assert!(!six.requires_human);
    }

    #[test]
    fn test_empty_batch() {
        let batch = RiskClassifier::new().assess_batch(&[]);
        assert_eq!(batch.level, RiskLevel::Low);
        assert_eq!(batch.confidence, 1.0);
    }
}
