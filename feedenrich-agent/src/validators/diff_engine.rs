//! Diff Engine
//!
//! Explainable before/after comparison for audit display and risk scoring.
//! Pure and stateless.
//!
//! The character-level change list is a longest-common-affix diff: equal
//! prefix, one delete (old middle), one insert (new middle), equal suffix.
//! It is meant for human display, not for patch/merge.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Word delimiters besides whitespace
const PUNCTUATION_DELIMITERS: &[char] = &[',', '.', ';', ':', '!', '?'];

/// Kind of change between two values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Removed,
    Modified,
    Unchanged,
}

/// Segment kind in the character-level change list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Equal,
    Delete,
    Insert,
}

/// One segment of the change list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffChange {
    pub op: ChangeOp,
    pub text: String,
    /// Character offset (in `before` for delete, in `after` otherwise)
    pub position: usize,
}

/// Comparison of one field's before/after values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field: String,
    pub before: String,
    pub after: String,
    pub change_type: ChangeType,
    pub changes: Vec<DiffChange>,
    pub added_words: Vec<String>,
    pub removed_words: Vec<String>,
    /// Jaccard index of the word sets (0.0-1.0)
    pub similarity: f64,
}

/// Split text into words on whitespace and punctuation
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || PUNCTUATION_DELIMITERS.contains(&c))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Lowercased word set
fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().map(str::to_lowercase).collect()
}

/// Jaccard similarity of the lowercased word sets
///
/// 1.0 when both sides have no words.
pub fn word_similarity(before: &str, after: &str) -> f64 {
    let a = word_set(before);
    let b = word_set(after);
    let union = a.union(&b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Word-overlap distance (`1 − Jaccard similarity`)
pub fn change_ratio(before: &str, after: &str) -> f64 {
    1.0 - word_similarity(before, after)
}

/// Words of `from` absent (case-insensitively) from `other`
///
/// Original case is kept; duplicates are removed case-insensitively,
/// first occurrence wins.
fn words_missing_from(from: &str, other: &str) -> Vec<String> {
    let other = word_set(other);
    let mut seen = HashSet::new();
    tokenize(from)
        .into_iter()
        .filter(|w| {
            let lower = w.to_lowercase();
            !other.contains(&lower) && seen.insert(lower)
        })
        .map(str::to_string)
        .collect()
}

/// Stateless diff engine
#[derive(Debug, Default, Clone, Copy)]
pub struct DiffEngine;

impl DiffEngine {
    pub fn new() -> Self {
        Self
    }

    /// Compare two values of one field
    pub fn compute_diff(&self, field: &str, before: &str, after: &str) -> FieldDiff {
        let change_type = if before == after {
            ChangeType::Unchanged
        } else if before.is_empty() {
            ChangeType::Added
        } else if after.is_empty() {
            ChangeType::Removed
        } else {
            ChangeType::Modified
        };

        if change_type == ChangeType::Unchanged {
            return FieldDiff {
                field: field.to_string(),
                before: before.to_string(),
                after: after.to_string(),
                change_type,
                changes: Vec::new(),
                added_words: Vec::new(),
                removed_words: Vec::new(),
                similarity: 1.0,
            };
        }

        FieldDiff {
            field: field.to_string(),
            before: before.to_string(),
            after: after.to_string(),
            change_type,
            changes: affix_changes(before, after),
            added_words: words_missing_from(after, before),
            removed_words: words_missing_from(before, after),
            similarity: word_similarity(before, after),
        }
    }

    /// Diff every field present in either map, sorted by field name
    pub fn compute_multiple(
        &self,
        before: &BTreeMap<String, String>,
        after: &BTreeMap<String, String>,
    ) -> Vec<FieldDiff> {
        let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
        fields
            .into_iter()
            .map(|field| {
                let b = before.get(field).map(String::as_str).unwrap_or("");
                let a = after.get(field).map(String::as_str).unwrap_or("");
                self.compute_diff(field, b, a)
            })
            .collect()
    }
}

/// Common-prefix / common-suffix change list
fn affix_changes(before: &str, after: &str) -> Vec<DiffChange> {
    let b: Vec<char> = before.chars().collect();
    let a: Vec<char> = after.chars().collect();

    let prefix = b.iter().zip(a.iter()).take_while(|(x, y)| x == y).count();
    let max_suffix = b.len().min(a.len()) - prefix;
    let suffix = b
        .iter()
        .rev()
        .zip(a.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();

    let collect = |chars: &[char]| chars.iter().collect::<String>();
    let mut changes = Vec::new();

    if prefix > 0 {
        changes.push(DiffChange {
            op: ChangeOp::Equal,
            text: collect(&a[..prefix]),
            position: 0,
        });
    }
    if b.len() - suffix > prefix {
        changes.push(DiffChange {
            op: ChangeOp::Delete,
            text: collect(&b[prefix..b.len() - suffix]),
            position: prefix,
        });
    }
    if a.len() - suffix > prefix {
        changes.push(DiffChange {
            op: ChangeOp::Insert,
            text: collect(&a[prefix..a.len() - suffix]),
            position: prefix,
        });
    }
    if suffix > 0 {
        changes.push(DiffChange {
            op: ChangeOp::Equal,
            text: collect(&a[a.len() - suffix..]),
            position: a.len() - suffix,
        });
    }

    changes
}
