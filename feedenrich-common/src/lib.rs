//! # feedenrich Common Library
//!
//! Shared code for the enrichment agent and its callers:
//! - Error type (`Error`, `Result`)
//! - Layered configuration (TOML file + environment)
//! - Tagged field values with a single display conversion
//! - Event types (`EnrichmentEvent`) and the broadcast `EventBus`

pub mod config;
pub mod error;
pub mod events;
pub mod values;

pub use error::{Error, Result};
pub use values::{FieldMap, FieldValue};
