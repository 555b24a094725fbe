//! Catalog record being enriched

use super::field_alias;
use feedenrich_common::values::{field_map_from_json, parse_field_map};
use feedenrich_common::{FieldMap, FieldValue, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One catalog entry (product)
///
/// `raw` is the feed data as ingested and never changes. `current` starts as a
/// copy of `raw` and evolves only through accepted proposals: fields are added
/// or replaced, never removed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub id: String,
    pub raw: FieldMap,
    pub current: FieldMap,
    /// Incremented on every applied change
    pub version: u32,
}

impl Record {
    /// Create a record from its original field map
    pub fn new(id: impl Into<String>, raw: FieldMap) -> Self {
        Self {
            id: id.into(),
            current: raw.clone(),
            raw,
            version: 1,
        }
    }

    /// Parse a record from a JSON object
    ///
    /// The record id is taken from the `id` field; a random id is generated
    /// when the feed has none.
    ///
    /// # Errors
    /// Returns an error if the text is not a JSON object.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw = parse_field_map(json)?;
        Ok(Self::from_field_map(raw))
    }

    /// Build a record from an already-decoded JSON value
    pub fn from_json_value(value: serde_json::Value) -> Result<Self> {
        Ok(Self::from_field_map(field_map_from_json(value)?))
    }

    fn from_field_map(raw: FieldMap) -> Self {
        let id = match field_alias::field_text(&raw, "id") {
            id if id.is_empty() => Uuid::new_v4().to_string(),
            id => id,
        };
        Self::new(id, raw)
    }

    /// Current value of a canonical field (alias-aware)
    pub fn field(&self, canonical: &str) -> Option<&FieldValue> {
        field_alias::lookup_field(&self.current, canonical).map(|(_, v)| v)
    }

    /// Current display text of a canonical field, `""` if absent
    pub fn field_text(&self, canonical: &str) -> String {
        field_alias::field_text(&self.current, canonical)
    }

    /// Write a value into the current field map
    ///
    /// Replaces the field under the key the feed already uses for it (so a
    /// `titre` column stays `titre`), or adds it under `field` if absent.
    pub fn apply_value(&mut self, field: &str, value: impl Into<String>) {
        let key = field_alias::lookup_field(&self.current, field)
            .map(|(k, _)| k.to_string())
            .or_else(|| {
                self.current
                    .keys()
                    .find(|k| k.eq_ignore_ascii_case(field))
                    .cloned()
            })
            .unwrap_or_else(|| field.to_string());
        self.current.insert(key, FieldValue::Text(value.into()));
        self.version += 1;
    }

    /// Current field map as a JSON object
    pub fn current_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.current).unwrap_or(serde_json::Value::Null)
    }
}
