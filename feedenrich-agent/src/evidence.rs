//! Evidence Registry
//!
//! Single source of truth for where every fact about a record came from
//! during one enrichment session.
//!
//! # Trust model
//! - `original-feed` and `human-input` evidence is ground truth: confidence
//!   1.0, verified on registration
//! - `visual-observation` evidence is verified on registration only if its
//!   confidence is at least [`VISUAL_AUTO_VERIFY_THRESHOLD`]
//! - `external-page` evidence is never verified on registration; it needs an
//!   explicit [`EvidenceRegistry::verify`] call
//!
//! [`EvidenceRegistry::best_evidence`] only ever returns verified entries, so
//! an unverified web fact can never outrank a verified weaker one.
//!
//! Entries are keyed by canonical field name (see
//! [`field_alias`](crate::models::field_alias)), so `couleur` in the feed and
//! `color` from the image compete for the same field. Lookups accept any alias.
//!
//! # Concurrency
//! One registry belongs to one record's session. Registration may happen from
//! concurrent evidence tasks; all access goes through an internal `RwLock`.

use crate::models::field_alias;
use chrono::{DateTime, Utc};
use feedenrich_common::FieldMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Minimum confidence at which a visual observation is verified on registration
pub const VISUAL_AUTO_VERIFY_THRESHOLD: f64 = 0.85;

/// Actor recorded for evidence verified on registration
const SYSTEM_ACTOR: &str = "system";

/// Where a piece of evidence originated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvidenceOrigin {
    OriginalFeed,
    VisualObservation,
    ExternalPage,
    HumanInput,
}

/// Origin-specific source descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvidenceSource {
    FeedField { field: String },
    ImageObservation { image_url: String, reasoning: String },
    WebPage { url: String, snippet: String },
    UserInput { actor_id: String },
}

impl EvidenceSource {
    /// Concrete reference for citation: field name, URL, or actor id
    pub fn reference(&self) -> &str {
        match self {
            EvidenceSource::FeedField { field } => field,
            EvidenceSource::ImageObservation { image_url, .. } => image_url,
            EvidenceSource::WebPage { url, .. } => url,
            EvidenceSource::UserInput { actor_id } => actor_id,
        }
    }
}

/// An atomic fact about one field of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: Uuid,
    pub record_id: String,
    pub field: String,
    pub value: String,
    pub origin: EvidenceOrigin,
    pub source: EvidenceSource,
    pub confidence: f64,
    pub verified: bool,
    pub verified_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Registry errors
#[derive(Debug, Error, PartialEq)]
pub enum EvidenceError {
    #[error("Evidence not found: {0}")]
    NotFound(Uuid),
}

#[derive(Default)]
struct RegistryInner {
    /// Insertion order
    entries: Vec<Evidence>,
    by_id: HashMap<Uuid, usize>,
    /// Field → entry indices, insertion order
    by_field: BTreeMap<String, Vec<usize>>,
}

/// Per-record evidence store
pub struct EvidenceRegistry {
    record_id: String,
    inner: RwLock<RegistryInner>,
}

impl EvidenceRegistry {
    /// Create an empty registry scoped to one record
    pub fn new(record_id: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    pub fn record_id(&self) -> &str {
        &self.record_id
    }

    // Each mutation completes under a single guard, so a poisoned lock
    // still holds a consistent index.
    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        field: &str,
        value: &str,
        origin: EvidenceOrigin,
        source: EvidenceSource,
        confidence: f64,
        verified_by: Option<&str>,
    ) -> Evidence {
        let verified = verified_by.is_some();
        let evidence = Evidence {
            id: Uuid::new_v4(),
            record_id: self.record_id.clone(),
            field: field_alias::canonical_name(field),
            value: value.to_string(),
            origin,
            source,
            confidence: confidence.clamp(0.0, 1.0),
            verified,
            verified_by: verified_by.map(str::to_string),
            created_at: Utc::now(),
        };

        let mut inner = self.write();
        let index = inner.entries.len();
        inner.entries.push(evidence.clone());
        inner.by_id.insert(evidence.id, index);
        inner
            .by_field
            .entry(evidence.field.clone())
            .or_default()
            .push(index);

        debug!(
            record_id = %self.record_id,
            field = %field,
            origin = ?origin,
            confidence = evidence.confidence,
            verified = verified,
            "Evidence registered"
        );

        evidence
    }

    /// Register a value taken from the original feed (ground truth)
    ///
    /// The source descriptor keeps the feed's own key.
    pub fn register_from_feed(&self, field: &str, value: &str) -> Evidence {
        self.register(
            field,
            value,
            EvidenceOrigin::OriginalFeed,
            EvidenceSource::FeedField {
                field: field.to_string(),
            },
            1.0,
            Some(SYSTEM_ACTOR),
        )
    }

    /// Register an attribute observed on the product image
    ///
    /// Verified only if `confidence >= 0.85`.
    pub fn register_from_visual(
        &self,
        field: &str,
        value: &str,
        image_url: &str,
        reasoning: &str,
        confidence: f64,
    ) -> Evidence {
        self.register(
            field,
            value,
            EvidenceOrigin::VisualObservation,
            EvidenceSource::ImageObservation {
                image_url: image_url.to_string(),
                reasoning: reasoning.to_string(),
            },
            confidence,
            (confidence >= VISUAL_AUTO_VERIFY_THRESHOLD).then_some(SYSTEM_ACTOR),
        )
    }

    /// Register a fact found on an external web page (never verified here)
    pub fn register_from_external_page(
        &self,
        field: &str,
        value: &str,
        page_url: &str,
        snippet: &str,
        confidence: f64,
    ) -> Evidence {
        self.register(
            field,
            value,
            EvidenceOrigin::ExternalPage,
            EvidenceSource::WebPage {
                url: page_url.to_string(),
                snippet: snippet.to_string(),
            },
            confidence,
            None,
        )
    }

    /// Register a value provided by a human (ground truth)
    pub fn register_from_human(&self, field: &str, value: &str, actor_id: &str) -> Evidence {
        self.register(
            field,
            value,
            EvidenceOrigin::HumanInput,
            EvidenceSource::UserInput {
                actor_id: actor_id.to_string(),
            },
            1.0,
            Some(actor_id),
        )
    }

    /// Seed the registry from the feed
    ///
    /// Registers every non-blank field as feed evidence.
    ///
    /// # Returns
    /// Number of facts registered
    pub fn load_from_feed(&self, fields: &FieldMap) -> usize {
        let mut count = 0;
        for (field, value) in fields {
            if value.is_blank() {
                continue;
            }
            self.register_from_feed(field, value.to_display_string().trim());
            count += 1;
        }
        debug!(record_id = %self.record_id, count = count, "Registry seeded from feed");
        count
    }

    /// Mark evidence as verified
    ///
    /// # Returns
    /// * `Ok(true)` if the flag flipped
    /// * `Ok(false)` if the evidence was already verified (flag flips at most once)
    ///
    /// # Errors
    /// `EvidenceError::NotFound` for an unknown id
    pub fn verify(&self, evidence_id: Uuid, actor_id: &str) -> Result<bool, EvidenceError> {
        let mut inner = self.write();
        let index = *inner
            .by_id
            .get(&evidence_id)
            .ok_or(EvidenceError::NotFound(evidence_id))?;

        let entry = &mut inner.entries[index];
        if entry.verified {
            return Ok(false);
        }
        entry.verified = true;
        entry.verified_by = Some(actor_id.to_string());

        debug!(
            record_id = %self.record_id,
            evidence_id = %evidence_id,
            actor = %actor_id,
            "Evidence verified"
        );
        Ok(true)
    }

    /// Look up one entry
    pub fn get(&self, evidence_id: Uuid) -> Option<Evidence> {
        let inner = self.read();
        inner
            .by_id
            .get(&evidence_id)
            .map(|&i| inner.entries[i].clone())
    }

    /// All entries for a field, in registration order
    pub fn evidence_for_field(&self, field: &str) -> Vec<Evidence> {
        let inner = self.read();
        inner
            .by_field
            .get(&field_alias::canonical_name(field))
            .map(|idx| idx.iter().map(|&i| inner.entries[i].clone()).collect())
            .unwrap_or_default()
    }

    /// Verified entry with the highest confidence for a field
    ///
    /// Unverified entries are ignored regardless of confidence. Among equal
    /// confidences the earliest registration wins.
    pub fn best_evidence(&self, field: &str) -> Option<Evidence> {
        let inner = self.read();
        Self::best_in(&inner, &field_alias::canonical_name(field)).cloned()
    }

    fn best_in<'a>(inner: &'a RegistryInner, field: &str) -> Option<&'a Evidence> {
        let mut best: Option<&Evidence> = None;
        for &i in inner.by_field.get(field)? {
            let e = &inner.entries[i];
            if !e.verified {
                continue;
            }
            if best.map_or(true, |b| e.confidence > b.confidence) {
                best = Some(e);
            }
        }
        best
    }

    /// Whitelist of facts a generation call may use
    ///
    /// Field → value of [`best_evidence`](Self::best_evidence) for every field
    /// that has verified evidence.
    pub fn allowed_facts(&self) -> BTreeMap<String, String> {
        let inner = self.read();
        inner
            .by_field
            .keys()
            .filter_map(|field| {
                Self::best_in(&inner, field).map(|e| (field.clone(), e.value.clone()))
            })
            .collect()
    }

    /// All entries in registration order
    pub fn all(&self) -> Vec<Evidence> {
        self.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Audit trail as a JSON array, registration order
    pub fn export_trail(&self) -> serde_json::Value {
        serde_json::to_value(&self.read().entries)
            .unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }
}
