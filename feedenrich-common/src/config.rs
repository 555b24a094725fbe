//! Configuration loading and tiered setting resolution
//!
//! Every setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing TOML file is not an error: a warning is logged and defaults are
//! used. A TOML file that exists but does not parse is a `Config` error.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Application directory name under the platform config dir
const APP_DIR: &str = "feedenrich";

/// Config file name
const CONFIG_FILE: &str = "config.toml";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub oracle: OracleSection,
    pub web_search: WebSearchSection,
    pub agent: AgentSection,
    pub risk: RiskSection,
    pub logging: LoggingConfig,
}

/// `[oracle]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleSection {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub vision_model: Option<String>,
}

/// `[web_search]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebSearchSection {
    pub api_key: Option<String>,
}

/// `[agent]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSection {
    pub enable_vision: Option<bool>,
    pub enable_web_search: Option<bool>,
    pub oracle_timeout_secs: Option<u64>,
    pub evidence_timeout_secs: Option<u64>,
}

/// `[risk]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskSection {
    pub batch_medium_threshold: Option<usize>,
    pub batch_size_threshold: Option<usize>,
}

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Where a resolved setting came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    CommandLine,
    Environment,
    Toml,
}

impl SettingSource {
    fn label(&self) -> &'static str {
        match self {
            SettingSource::CommandLine => "command line",
            SettingSource::Environment => "environment",
            SettingSource::Toml => "TOML",
        }
    }
}

/// A setting value together with the tier it was resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSetting {
    pub value: String,
    pub source: SettingSource,
}

/// Default config file path for the platform
///
/// `~/.config/feedenrich/config.toml` on Linux, the platform equivalent
/// elsewhere. Returns `None` if the platform has no config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join(CONFIG_FILE))
}

/// Load the TOML config file
///
/// # Arguments
/// * `path` - Explicit path, or `None` for [`default_config_path`]
///
/// # Errors
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(p) => p,
        None => {
            warn!("No config directory on this platform, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!("Config file not found: {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Validate a key-like value (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve a string setting across CLI → ENV → TOML
///
/// `env_vars` are checked in order; the first valid one wins the environment
/// tier. When the setting is present in more than one tier a warning names
/// all of them.
///
/// # Returns
/// * `Some(ResolvedSetting)` from the highest-priority tier holding a valid value
/// * `None` if no tier has one
pub fn resolve_setting(
    name: &str,
    cli_value: Option<&str>,
    env_vars: &[&str],
    toml_value: Option<&str>,
) -> Option<ResolvedSetting> {
    let mut found: Vec<ResolvedSetting> = Vec::new();

    if let Some(v) = cli_value.filter(|v| is_valid_key(v)) {
        found.push(ResolvedSetting {
            value: v.trim().to_string(),
            source: SettingSource::CommandLine,
        });
    }

    if let Some(v) = env_vars
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .find(|v| is_valid_key(v))
    {
        found.push(ResolvedSetting {
            value: v.trim().to_string(),
            source: SettingSource::Environment,
        });
    }

    if let Some(v) = toml_value.filter(|v| is_valid_key(v)) {
        found.push(ResolvedSetting {
            value: v.trim().to_string(),
            source: SettingSource::Toml,
        });
    }

    if found.len() > 1 {
        let sources: Vec<&str> = found.iter().map(|s| s.source.label()).collect();
        warn!(
            "{} found in multiple sources: {}. Using {} (highest priority).",
            name,
            sources.join(", "),
            found[0].source.label()
        );
    }

    found.into_iter().next()
}

/// Read a boolean environment variable
///
/// Accepts `1/0`, `true/false`, `yes/no`, `on/off` (case-insensitive).
/// Unparseable values are ignored with a warning.
pub fn env_bool(var: &str) -> Option<bool> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("Ignoring {}={:?}: not a boolean", var, other);
            None
        }
    }
}

/// Read an unsigned integer environment variable
///
/// Unparseable values are ignored with a warning.
pub fn env_u64(var: &str) -> Option<u64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring {}={:?}: not an unsigned integer", var, raw);
            None
        }
    }
}
