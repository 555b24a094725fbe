//! Unit tests for configuration loading and tiered setting resolution
//!
//! Covers:
//! - Missing TOML files SHALL NOT cause failure (defaults + warning)
//! - Malformed TOML files SHALL surface as `Config` errors
//! - CLI → ENV → TOML priority order
//! - Blank values never win a tier
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate FEEDENRICH_* variables are marked with #[serial].

use feedenrich_common::config::{
    env_bool, env_u64, is_valid_key, load_toml_config, resolve_setting, SettingSource, TomlConfig,
};
use feedenrich_common::Error;
use serial_test::serial;
use std::env;
use std::io::Write;

const TEST_KEY_VAR: &str = "FEEDENRICH_TEST_API_KEY";
const TEST_KEY_FALLBACK_VAR: &str = "FEEDENRICH_TEST_API_KEY_FALLBACK";

#[test]
fn test_missing_toml_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");

    let config = load_toml_config(Some(&path)).expect("missing file is not an error");
    assert_eq!(config, TomlConfig::default());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_full_toml_file_parses() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[oracle]
api_key = "sk-test"
model = "gpt-4o"

[web_search]
api_key = "brave-test"

[agent]
enable_vision = false
oracle_timeout_secs = 45

[risk]
batch_medium_threshold = 4
batch_size_threshold = 8

[logging]
level = "debug"
"#
    )
    .unwrap();

    let config = load_toml_config(Some(file.path())).unwrap();
    assert_eq!(config.oracle.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.oracle.model.as_deref(), Some("gpt-4o"));
    assert!(config.oracle.base_url.is_none());
    assert_eq!(config.web_search.api_key.as_deref(), Some("brave-test"));
    assert_eq!(config.agent.enable_vision, Some(false));
    assert_eq!(config.agent.enable_web_search, None);
    assert_eq!(config.agent.oracle_timeout_secs, Some(45));
    assert_eq!(config.risk.batch_medium_threshold, Some(4));
    assert_eq!(config.risk.batch_size_threshold, Some(8));
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_partial_toml_file_fills_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[oracle]\nmodel = \"gpt-4o-mini\"").unwrap();

    let config = load_toml_config(Some(file.path())).unwrap();
    assert_eq!(config.oracle.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(config.logging.level, "info");
    assert!(config.web_search.api_key.is_none());
}

#[test]
fn test_malformed_toml_file_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[oracle\napi_key = ").unwrap();

    let err = load_toml_config(Some(file.path())).unwrap_err();
    assert!(matches!(err, Error::Config(_)), "got {:?}", err);
}

#[test]
fn test_is_valid_key() {
    assert!(is_valid_key("abc"));
    assert!(!is_valid_key(""));
    assert!(!is_valid_key("   \t"));
}

#[test]
#[serial]
fn test_cli_value_has_highest_priority() {
    env::set_var(TEST_KEY_VAR, "from-env");

    let resolved = resolve_setting("API key", Some("from-cli"), &[TEST_KEY_VAR], Some("from-toml"))
        .expect("setting should resolve");
    assert_eq!(resolved.value, "from-cli");
    assert_eq!(resolved.source, SettingSource::CommandLine);

    env::remove_var(TEST_KEY_VAR);
}

#[test]
#[serial]
fn test_env_beats_toml() {
    env::set_var(TEST_KEY_VAR, "from-env");

    let resolved =
        resolve_setting("API key", None, &[TEST_KEY_VAR], Some("from-toml")).unwrap();
    assert_eq!(resolved.value, "from-env");
    assert_eq!(resolved.source, SettingSource::Environment);

    env::remove_var(TEST_KEY_VAR);
}

#[test]
#[serial]
fn test_env_fallback_variable_order() {
    env::remove_var(TEST_KEY_VAR);
    env::set_var(TEST_KEY_FALLBACK_VAR, "fallback");

    let resolved =
        resolve_setting("API key", None, &[TEST_KEY_VAR, TEST_KEY_FALLBACK_VAR], None).unwrap();
    assert_eq!(resolved.value, "fallback");

    env::remove_var(TEST_KEY_FALLBACK_VAR);
}

#[test]
#[serial]
fn test_blank_values_fall_through() {
    env::set_var(TEST_KEY_VAR, "   ");

    let resolved =
        resolve_setting("API key", Some(""), &[TEST_KEY_VAR], Some(" from-toml ")).unwrap();
    assert_eq!(resolved.value, "from-toml");
    assert_eq!(resolved.source, SettingSource::Toml);

    env::remove_var(TEST_KEY_VAR);
    assert!(resolve_setting("API key", None, &[TEST_KEY_VAR], None).is_none());
}

#[test]
#[serial]
fn test_env_bool_and_u64_parsing() {
    env::set_var("FEEDENRICH_TEST_FLAG", "Yes");
    assert_eq!(env_bool("FEEDENRICH_TEST_FLAG"), Some(true));
    env::set_var("FEEDENRICH_TEST_FLAG", "off");
    assert_eq!(env_bool("FEEDENRICH_TEST_FLAG"), Some(false));
    env::set_var("FEEDENRICH_TEST_FLAG", "maybe");
    assert_eq!(env_bool("FEEDENRICH_TEST_FLAG"), None);
    env::remove_var("FEEDENRICH_TEST_FLAG");
    assert_eq!(env_bool("FEEDENRICH_TEST_FLAG"), None);

    env::set_var("FEEDENRICH_TEST_SECS", "90");
    assert_eq!(env_u64("FEEDENRICH_TEST_SECS"), Some(90));
    env::set_var("FEEDENRICH_TEST_SECS", "-1");
    assert_eq!(env_u64("FEEDENRICH_TEST_SECS"), None);
    env::remove_var("FEEDENRICH_TEST_SECS");
}
