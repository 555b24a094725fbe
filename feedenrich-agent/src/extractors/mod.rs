//! Evidence collectors
//!
//! Optional evidence sources run concurrently during evidence gathering.
//! Each implements a trait from the `types` module.
//!
//! # Collectors
//! 1. **visual_collector** - Product image → attribute observations (oracle vision)
//! 2. **web_collector** - Search query → page-backed facts (Brave + oracle)
//! 3. **brave_search_client** - Brave Search API client used by the web collector
//!
//! # Failure isolation
//! A failed collector never fails the run. The pipeline logs it, emits an
//! `EvidenceDegraded` event and continues with fewer facts.

pub mod brave_search_client;
pub mod visual_collector;
pub mod web_collector;

pub use brave_search_client::{BraveSearchClient, SearchResult};
pub use visual_collector::OracleVisualAnalyzer;
pub use web_collector::{build_search_query, BraveWebRetriever};
