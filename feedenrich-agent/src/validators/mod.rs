//! Deterministic validation layer
//!
//! Everything here is pure and safe to share across concurrent runs.
//!
//! # Validators
//! 1. **hard_rule_validator** - Marketplace compliance rules, run first
//! 2. **diff_engine** - Explainable before/after comparison
//! 3. **risk_classifier** - Trust gate for auto-applying changes
//! 4. **screening** - Proposal screen (placeholders, URLs, prices)

pub mod diff_engine;
pub mod hard_rule_validator;
pub mod risk_classifier;
pub mod screening;

pub use diff_engine::{ChangeOp, ChangeType, DiffChange, DiffEngine, FieldDiff};
pub use hard_rule_validator::{
    default_rules, HardRuleValidator, Rule, RuleKind, RuleViolation, Severity, ValidationResult,
};
pub use risk_classifier::{BatchRiskAssessment, ChangeRequest, RiskClassifier};
pub use screening::{screen_candidate, Candidate, ScreenPolicy};
