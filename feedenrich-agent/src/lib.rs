//! feedenrich-agent library interface
//!
//! Evidence-gated enrichment of product catalog records: every proposed
//! field edit must trace back to registered evidence, pass deterministic
//! screening and clear a risk gate before it is applied.

pub mod config;
pub mod evidence;
pub mod extractors; // Visual and web evidence collectors
pub mod generation; // Oracle-backed proposal generation
pub mod models;
pub mod oracle;
pub mod review;
pub mod types; // Collector traits and evidence types
pub mod validators; // Deterministic rules, diff, risk, screening
pub mod workflow; // Per-record pipeline orchestration

pub use config::AgentConfig;
pub use evidence::EvidenceRegistry;
pub use generation::OptimizationScope;
pub use models::{PipelineResult, Record};
pub use workflow::{Pipeline, PipelineConfig, PipelineEvent};
