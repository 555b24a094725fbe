//! Configuration resolution for feedenrich-agent
//!
//! Resolves every agent setting with CLI → ENV → TOML → default priority,
//! using the tier helpers from `feedenrich_common::config`.

use crate::generation::OptimizationScope;
use crate::oracle::openai_client::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_VISION_MODEL};
use crate::validators::risk_classifier::{
    DEFAULT_BATCH_MEDIUM_THRESHOLD, DEFAULT_BATCH_SIZE_THRESHOLD,
};
use crate::workflow::PipelineConfig;
use feedenrich_common::config::{env_bool, env_u64, resolve_setting, TomlConfig};
use feedenrich_common::{Error, Result};
use std::time::Duration;
use tracing::info;

pub const ENV_OPENAI_API_KEY: &[&str] = &["FEEDENRICH_OPENAI_API_KEY", "OPENAI_API_KEY"];
pub const ENV_OPENAI_BASE_URL: &str = "FEEDENRICH_OPENAI_BASE_URL";
pub const ENV_OPENAI_MODEL: &str = "FEEDENRICH_OPENAI_MODEL";
pub const ENV_VISION_MODEL: &str = "FEEDENRICH_VISION_MODEL";
pub const ENV_BRAVE_API_KEY: &[&str] = &["FEEDENRICH_BRAVE_API_KEY", "BRAVE_API_KEY"];
pub const ENV_ENABLE_VISION: &str = "FEEDENRICH_ENABLE_VISION";
pub const ENV_ENABLE_WEB_SEARCH: &str = "FEEDENRICH_ENABLE_WEB_SEARCH";
pub const ENV_ORACLE_TIMEOUT_SECS: &str = "FEEDENRICH_ORACLE_TIMEOUT_SECS";
pub const ENV_EVIDENCE_TIMEOUT_SECS: &str = "FEEDENRICH_EVIDENCE_TIMEOUT_SECS";
pub const ENV_LOG_LEVEL: &str = "FEEDENRICH_LOG_LEVEL";

const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_EVIDENCE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub oracle_api_key: Option<String>,
    pub brave_api_key: Option<String>,
    pub oracle_timeout_secs: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved agent configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub oracle_api_key: Option<String>,
    pub oracle_base_url: String,
    pub oracle_model: String,
    pub vision_model: String,
    /// Absent means web evidence is unavailable (not an error)
    pub brave_api_key: Option<String>,
    pub enable_vision: bool,
    pub enable_web_search: bool,
    pub oracle_timeout: Duration,
    pub evidence_timeout: Duration,
    pub batch_medium_threshold: usize,
    pub batch_size_threshold: usize,
    pub log_level: String,
}

impl AgentConfig {
    /// Resolve every setting from CLI, environment and TOML
    pub fn resolve(toml: &TomlConfig, cli: &CliOverrides) -> Self {
        let oracle_api_key = resolve_setting(
            "Oracle API key",
            cli.oracle_api_key.as_deref(),
            ENV_OPENAI_API_KEY,
            toml.oracle.api_key.as_deref(),
        )
        .map(|s| {
            info!("Oracle API key loaded from {:?}", s.source);
            s.value
        });

        let brave_api_key = resolve_setting(
            "Brave Search API key",
            cli.brave_api_key.as_deref(),
            ENV_BRAVE_API_KEY,
            toml.web_search.api_key.as_deref(),
        )
        .map(|s| {
            info!("Brave Search API key loaded from {:?}", s.source);
            s.value
        });

        let string_setting = |name: &str, env: &str, toml_value: Option<&str>, default: &str| {
            resolve_setting(name, None, &[env], toml_value)
                .map(|s| s.value)
                .unwrap_or_else(|| default.to_string())
        };

        let oracle_timeout_secs = cli
            .oracle_timeout_secs
            .or_else(|| env_u64(ENV_ORACLE_TIMEOUT_SECS))
            .or(toml.agent.oracle_timeout_secs)
            .unwrap_or(DEFAULT_ORACLE_TIMEOUT_SECS);
        let evidence_timeout_secs = env_u64(ENV_EVIDENCE_TIMEOUT_SECS)
            .or(toml.agent.evidence_timeout_secs)
            .unwrap_or(DEFAULT_EVIDENCE_TIMEOUT_SECS);

        // TOML always carries a level (serde default), so it is the fallback tier
        let log_level = resolve_setting("Log level", cli.log_level.as_deref(), &[ENV_LOG_LEVEL], None)
            .map(|s| s.value)
            .or_else(|| Some(toml.logging.level.trim().to_string()).filter(|l| !l.is_empty()))
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        Self {
            oracle_api_key,
            oracle_base_url: string_setting(
                "Oracle base URL",
                ENV_OPENAI_BASE_URL,
                toml.oracle.base_url.as_deref(),
                DEFAULT_BASE_URL,
            ),
            oracle_model: string_setting(
                "Oracle model",
                ENV_OPENAI_MODEL,
                toml.oracle.model.as_deref(),
                DEFAULT_MODEL,
            ),
            vision_model: string_setting(
                "Vision model",
                ENV_VISION_MODEL,
                toml.oracle.vision_model.as_deref(),
                DEFAULT_VISION_MODEL,
            ),
            brave_api_key,
            enable_vision: env_bool(ENV_ENABLE_VISION)
                .or(toml.agent.enable_vision)
                .unwrap_or(true),
            enable_web_search: env_bool(ENV_ENABLE_WEB_SEARCH)
                .or(toml.agent.enable_web_search)
                .unwrap_or(true),
            oracle_timeout: Duration::from_secs(oracle_timeout_secs),
            evidence_timeout: Duration::from_secs(evidence_timeout_secs),
            batch_medium_threshold: toml
                .risk
                .batch_medium_threshold
                .unwrap_or(DEFAULT_BATCH_MEDIUM_THRESHOLD),
            batch_size_threshold: toml
                .risk
                .batch_size_threshold
                .unwrap_or(DEFAULT_BATCH_SIZE_THRESHOLD),
            log_level,
        }
    }

    /// Oracle API key, required by every command that calls the oracle
    ///
    /// # Errors
    /// `Error::Config` with setup instructions when no tier holds a key.
    pub fn require_oracle_key(&self) -> Result<&str> {
        self.oracle_api_key.as_deref().ok_or_else(|| {
            Error::Config(
                "Oracle API key not configured. Please configure using one of:\n\
                 1. Command line: --api-key your-key-here\n\
                 2. Environment: FEEDENRICH_OPENAI_API_KEY=your-key-here\n\
                 3. TOML config: ~/.config/feedenrich/config.toml ([oracle] api_key = \"your-key\")"
                    .to_string(),
            )
        })
    }

    /// Pipeline configuration for one scope
    pub fn pipeline_config(&self, scope: OptimizationScope) -> PipelineConfig {
        PipelineConfig {
            scope,
            enable_vision: self.enable_vision,
            enable_web_search: self.enable_web_search,
            oracle_timeout: self.oracle_timeout,
            evidence_timeout: self.evidence_timeout,
            batch_medium_threshold: self.batch_medium_threshold,
            batch_size_threshold: self.batch_size_threshold,
            ..PipelineConfig::default()
        }
    }
}
