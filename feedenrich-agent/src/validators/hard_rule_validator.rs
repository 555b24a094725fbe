//! Hard Rule Validator
//!
//! Deterministic, explainable compliance screen over a record's field map.
//! No oracle is involved: the same record and rule set always produce the same
//! result.
//!
//! # Rule types
//! - `required`: fails if the field is empty after trimming
//! - `min_length` / `max_length`: fails if the character count is out of bounds
//! - `pattern`: fails if the value does not match the regular expression
//! - `forbidden_words`: fails on a case-insensitive substring match of any token
//! - `url`: fails if the value is non-empty and lacks an `http://` or
//!   `https://` prefix
//!
//! A missing field is evaluated as the empty string.

use crate::models::field_alias;
use feedenrich_common::values::parse_field_map;
use feedenrich_common::FieldMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Rule id of the synthetic violation for unparseable records
pub const PARSE_ERROR_RULE_ID: &str = "parse_error";

/// Field name of the synthetic violation for unparseable records
pub const PARSE_ERROR_FIELD: &str = "_json";

/// Rule severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks compliance
    Error,
    /// Reported, never affects validity
    Warning,
}

/// Rule type and its parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleKind {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Pattern(String),
    ForbiddenWords(Vec<String>),
    Url,
}

/// One validation rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub field: String,
    #[serde(flatten)]
    pub kind: RuleKind,
    pub message: String,
    pub severity: Severity,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        field: impl Into<String>,
        kind: RuleKind,
        message: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            field: field.into(),
            kind,
            message: message.into(),
            severity,
        }
    }
}

/// A failed rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub rule_id: String,
    pub field: String,
    pub message: String,
    pub expected: String,
    pub actual: String,
}

/// Validation outcome for one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// False iff at least one violation exists
    pub valid: bool,
    /// Error-severity failures
    pub violations: Vec<RuleViolation>,
    /// Warning-severity failures
    pub warnings: Vec<RuleViolation>,
    pub rules_checked: usize,
}

impl ValidationResult {
    /// Fraction of checked rules that passed without an error (0.0-1.0)
    pub fn pass_ratio(&self) -> f64 {
        if self.rules_checked == 0 {
            return 1.0;
        }
        let failed = self.violations.len().min(self.rules_checked);
        (self.rules_checked - failed) as f64 / self.rules_checked as f64
    }

    /// Observability report
    pub fn report(&self) -> serde_json::Value {
        serde_json::json!({
            "valid": self.valid,
            "rules_checked": self.rules_checked,
            "violation_count": self.violations.len(),
            "warning_count": self.warnings.len(),
            "violated_fields": self.violations.iter().map(|v| v.field.as_str()).collect::<Vec<_>>(),
        })
    }
}

/// Default marketplace rule set
pub fn default_rules() -> Vec<Rule> {
    use RuleKind::*;
    use Severity::*;

    let mut rules: Vec<Rule> = ["id", "title", "description", "link", "image_link", "price"]
        .iter()
        .map(|field| {
            Rule::new(
                format!("gmc_{}_required", field),
                *field,
                Required,
                format!("{} is required", field),
                Error,
            )
        })
        .collect();

    rules.extend([
        Rule::new("gmc_title_min", "title", MinLength(30), "Title should be at least 30 characters", Error),
        Rule::new("gmc_title_max", "title", MaxLength(150), "Title must not exceed 150 characters", Error),
        Rule::new(
            "gmc_description_min",
            "description",
            MinLength(50),
            "Description should be at least 50 characters",
            Warning,
        ),
        Rule::new(
            "gmc_description_max",
            "description",
            MaxLength(5000),
            "Description must not exceed 5000 characters",
            Error,
        ),
        Rule::new("gmc_link_url", "link", Url, "Link must be a valid URL", Error),
        Rule::new("gmc_image_url", "image_link", Url, "Image link must be a valid URL", Error),
        Rule::new(
            "gmc_title_promo",
            "title",
            ForbiddenWords(
                [
                    "free shipping",
                    "sale",
                    "discount",
                    "promo",
                    "soldes",
                    "-50%",
                    "-30%",
                    "livraison gratuite",
                ]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            ),
            "Title must not contain promotional text",
            Error,
        ),
    ]);

    rules
}

/// Deterministic rule-driven validator
pub struct HardRuleValidator {
    rules: Vec<Rule>,
    /// Compiled pattern per rule, same index as `rules`; `Err` holds the compile error
    patterns: Vec<Option<Result<Regex, String>>>,
}

impl Default for HardRuleValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl HardRuleValidator {
    /// Create validator with the default rule set
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    /// Create validator with exactly the given rules
    pub fn with_rules(rules: Vec<Rule>) -> Self {
        let mut validator = Self {
            rules: Vec::new(),
            patterns: Vec::new(),
        };
        validator.add_rules(rules);
        validator
    }

    /// Append custom rules
    pub fn add_rules(&mut self, rules: Vec<Rule>) {
        for rule in rules {
            let compiled = match &rule.kind {
                RuleKind::Pattern(pattern) => {
                    let compiled = Regex::new(pattern).map_err(|e| e.to_string());
                    if let Err(e) = &compiled {
                        warn!(rule_id = %rule.id, pattern = %pattern, "Invalid rule pattern: {}", e);
                    }
                    Some(compiled)
                }
                _ => None,
            };
            self.patterns.push(compiled);
            self.rules.push(rule);
        }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Validate a record given as JSON text
    ///
    /// Text that is not a JSON object yields a single `parse_error` violation
    /// on `_json` and an invalid result.
    pub fn validate_json(&self, json: &str) -> ValidationResult {
        match parse_field_map(json) {
            Ok(fields) => self.validate(&fields),
            Err(e) => {
                debug!("Record failed to parse: {}", e);
                ValidationResult {
                    valid: false,
                    violations: vec![RuleViolation {
                        rule_id: PARSE_ERROR_RULE_ID.to_string(),
                        field: PARSE_ERROR_FIELD.to_string(),
                        message: "Failed to parse product data".to_string(),
                        expected: "JSON object".to_string(),
                        actual: e.to_string(),
                    }],
                    warnings: Vec::new(),
                    rules_checked: 0,
                }
            }
        }
    }

    /// Validate a record's field map against every rule
    pub fn validate(&self, fields: &FieldMap) -> ValidationResult {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        for (rule, pattern) in self.rules.iter().zip(&self.patterns) {
            let value = field_alias::field_text(fields, &rule.field);
            if let Some(violation) = check_rule(rule, pattern.as_ref(), &value) {
                match rule.severity {
                    Severity::Error => violations.push(violation),
                    Severity::Warning => warnings.push(violation),
                }
            }
        }

        let result = ValidationResult {
            valid: violations.is_empty(),
            violations,
            warnings,
            rules_checked: self.rules.len(),
        };

        debug!(
            valid = result.valid,
            rules_checked = result.rules_checked,
            violations = result.violations.len(),
            warnings = result.warnings.len(),
            "Hard rule validation complete"
        );

        result
    }
}

/// True if the value starts with `http://` or `https://`
pub fn has_http_scheme(value: &str) -> bool {
    let v = value.trim_start();
    v.starts_with("http://") || v.starts_with("https://")
}

fn check_rule(
    rule: &Rule,
    compiled: Option<&Result<Regex, String>>,
    value: &str,
) -> Option<RuleViolation> {
    let violation = |expected: String, actual: String| RuleViolation {
        rule_id: rule.id.clone(),
        field: rule.field.clone(),
        message: rule.message.clone(),
        expected,
        actual,
    };

    let length = value.chars().count();
    match &rule.kind {
        RuleKind::Required if value.trim().is_empty() => {
            Some(violation("non-empty value".into(), "empty".into()))
        }
        RuleKind::MinLength(min) if length < *min => Some(violation(
            format!("{}+ characters", min),
            format!("{} characters", length),
        )),
        RuleKind::MaxLength(max) if length > *max => Some(violation(
            format!("max {} characters", max),
            format!("{} characters", length),
        )),
        RuleKind::Pattern(pattern) => match compiled {
            Some(Ok(re)) if re.is_match(value) => None,
            Some(Err(e)) => Some(violation(
                format!("match pattern: {}", pattern),
                format!("invalid pattern: {}", e),
            )),
            _ => Some(violation(format!("match pattern: {}", pattern), value.to_string())),
        },
        RuleKind::ForbiddenWords(words) => {
            let lower = value.to_lowercase();
            words
                .iter()
                .find(|w| lower.contains(&w.to_lowercase()))
                .map(|w| violation("no forbidden words".into(), format!("contains '{}'", w)))
        }
        RuleKind::Url if !value.trim().is_empty() && !has_http_scheme(value) => Some(violation(
            "valid URL starting with http:// or https://".into(),
            value.to_string(),
        )),
        _ => None,
    }
}
