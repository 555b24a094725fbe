//! Field values decoded from catalog feeds
//!
//! Feed records arrive as loosely-typed JSON objects. Every value is decoded
//! into [`FieldValue`] once, at the boundary, and rendered back to text through
//! [`FieldValue::to_display_string`] only.
//!
//! # Formatting rules
//! - Strings are returned verbatim
//! - Integral finite numbers print without a fractional part (`42`, `-3`)
//! - Other finite numbers use the shortest round-trip decimal form (`19.99`)
//! - Non-finite numbers and null render as the empty string
//! - Arrays and objects render as compact JSON text

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Field name → value map for one record
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Tokens that feeds use to mean "no value"
const MISSING_VALUE_TOKENS: &[&str] = &["N/A", "n/a", "-"];

/// Largest magnitude rendered through the integer path (exact in f64)
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Tagged union over the JSON scalar types a feed field can hold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    /// Explicit null or absent value
    #[default]
    Null,
    /// Boolean flag
    Bool(bool),
    /// Any JSON number
    Number(f64),
    /// Text value
    Text(String),
    /// Nested array/object, kept as-is for display
    Structured(serde_json::Value),
}

impl FieldValue {
    /// Render the value as display text
    pub fn to_display_string(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(b) => b.to_string(),
            FieldValue::Number(n) => format_number(*n),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Structured(v) => v.to_string(),
        }
    }

    /// True when the value carries no usable content
    ///
    /// Empty/whitespace text and the feed placeholders `N/A`, `n/a`, `-`
    /// count as blank.
    pub fn is_blank(&self) -> bool {
        let text = self.to_display_string();
        let trimmed = text.trim();
        trimmed.is_empty() || MISSING_VALUE_TOKENS.contains(&trimmed)
    }

    /// Borrow the text payload, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return String::new();
    }
    if n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER {
        // -0.0 prints as "0"
        return format!("{}", n as i64);
    }
    format!("{}", n)
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => FieldValue::Number(f),
                None => FieldValue::Text(n.to_string()),
            },
            serde_json::Value::String(s) => FieldValue::Text(s),
            other => FieldValue::Structured(other),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Number(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

/// Parse a JSON object into a field map
///
/// # Errors
/// Returns `Error::Json` for malformed JSON and `Error::InvalidInput` when the
/// document is valid JSON but not an object.
pub fn parse_field_map(json: &str) -> Result<FieldMap> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    field_map_from_json(value)
}

/// Convert an already-decoded JSON document into a field map
pub fn field_map_from_json(value: serde_json::Value) -> Result<FieldMap> {
    match value {
        serde_json::Value::Object(obj) => Ok(obj
            .into_iter()
            .map(|(k, v)| (k, FieldValue::from(v)))
            .collect()),
        other => Err(Error::InvalidInput(format!(
            "record must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integral_numbers_have_no_fraction() {
        assert_eq!(FieldValue::Number(42.0).to_display_string(), "42");
        assert_eq!(FieldValue::Number(-3.0).to_display_string(), "-3");
        assert_eq!(FieldValue::Number(-0.0).to_display_string(), "0");
    }

    #[test]
    fn test_fractional_numbers_keep_precision() {
        // Truncating to an integer would lose the cents
        assert_eq!(FieldValue::Number(19.99).to_display_string(), "19.99");
        assert_eq!(FieldValue::Number(0.1).to_display_string(), "0.1");
    }

    #[test]
    fn test_non_finite_numbers_render_empty() {
        assert_eq!(FieldValue::Number(f64::NAN).to_display_string(), "");
        assert_eq!(FieldValue::Number(f64::INFINITY).to_display_string(), "");
    }

    #[test]
    fn test_bool_and_null() {
        assert_eq!(FieldValue::Bool(true).to_display_string(), "true");
        assert_eq!(FieldValue::Null.to_display_string(), "");
    }

    #[test]
    fn test_blank_detection() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::from("   ").is_blank());
        assert!(FieldValue::from("N/A").is_blank());
        assert!(FieldValue::from("n/a").is_blank());
        assert!(FieldValue::from("-").is_blank());
        assert!(!FieldValue::from("Nike").is_blank());
        assert!(!FieldValue::Number(0.0).is_blank());
    }

    #[test]
    fn test_parse_field_map_mixed_types() {
        let map = parse_field_map(
            r#"{"title": "Basket", "price": 49.9, "stock": 3, "active": true, "gtin": null, "tags": ["a","b"]}"#,
        )
        .unwrap();

        assert_eq!(map["title"], FieldValue::Text("Basket".into()));
        assert_eq!(map["price"].to_display_string(), "49.9");
        assert_eq!(map["stock"].to_display_string(), "3");
        assert_eq!(map["active"].to_display_string(), "true");
        assert!(map["gtin"].is_blank());
        assert_eq!(map["tags"].to_display_string(), r#"["a","b"]"#);
    }

    #[test]
    fn test_parse_field_map_rejects_non_object() {
        let err = parse_field_map("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let err = parse_field_map("{not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }
}
