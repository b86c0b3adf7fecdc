// Integration tests for configuration loading and validation

mod common;

use common::create_test_config;
use gemini_cryptotrader::{AppConfig, ConfigError, TraderError};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_example_config_matches_defaults() {
    let example = include_str!("../config.toml.example");
    let parsed: AppConfig = toml::from_str(example).expect("Failed to parse example config");
    let defaults = AppConfig::default();

    assert_eq!(parsed.exchange.production_url, defaults.exchange.production_url);
    assert_eq!(parsed.exchange.sandbox_url, defaults.exchange.sandbox_url);
    assert_eq!(parsed.market_data.symbols, defaults.market_data.symbols);
    assert_eq!(parsed.market_data.poll_interval_secs, defaults.market_data.poll_interval_secs);
    assert_eq!(parsed.connectivity.probe_address, defaults.connectivity.probe_address);
    assert_eq!(parsed.storage.data_dir, defaults.storage.data_dir);
    assert!(parsed.validate().is_ok());
}

#[test]
fn test_config_file_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");

    let mut config = create_test_config(&temp_dir);
    config.market_data.symbols = vec!["ethbtc".to_string()];
    config.to_file(&config_path).expect("Failed to write config");

    let loaded = AppConfig::from_file(&config_path).expect("Failed to load config");
    assert_eq!(loaded.market_data.symbols, vec!["ethbtc"]);
    assert_eq!(loaded.storage.data_dir, config.storage.data_dir);

    let pairs = loaded.market_data.pairs().expect("Failed to parse pairs");
    assert_eq!(pairs[0].base, "ETH");
    assert_eq!(pairs[0].quote, "BTC");
}

#[test]
fn test_partial_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("partial.toml");

    fs::write(&config_path, "[market_data]\npoll_interval_secs = 30\n").expect("Failed to write config");

    let config = AppConfig::from_file(&config_path).expect("Failed to load config");
    assert_eq!(config.market_data.poll_interval(), Duration::from_secs(30));
    assert_eq!(config.market_data.history_limit, 60);
    assert_eq!(config.exchange.production_url, "https://api.gemini.com");
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let result = AppConfig::from_file(temp_dir.path().join("absent.toml"));

    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));

    // Surfaces as a config-not-found error with an init hint
    let err: TraderError = result.unwrap_err().into();
    assert!(matches!(err, TraderError::ConfigNotFound(_)));
    assert!(err.user_message().contains("init"));
}

#[test]
fn test_malformed_toml() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("malformed.toml");
    fs::write(&config_path, "this is not valid toml {{{").expect("Failed to write config");

    assert!(matches!(AppConfig::from_file(&config_path), Err(ConfigError::Parse(_))));
}

#[test]
fn test_invalid_values_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("invalid.toml");

    fs::write(&config_path, "[market_data]\nsymbols = [\"notapair\"]\n").expect("Failed to write config");
    assert!(matches!(AppConfig::from_file(&config_path), Err(ConfigError::Validation(_))));

    fs::write(&config_path, "[market_data]\npoll_interval_secs = 0\n").expect("Failed to write config");
    assert!(matches!(AppConfig::from_file(&config_path), Err(ConfigError::Validation(_))));

    fs::write(&config_path, "[market_data]\nsymbols = []\n").expect("Failed to write config");
    assert!(matches!(AppConfig::from_file(&config_path), Err(ConfigError::Validation(_))));
}

#[test]
fn test_load_or_create_writes_defaults() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = temp_dir.path().join("config.toml");

    let created = AppConfig::load_or_create(&config_path).expect("Failed to create config");
    assert!(config_path.exists());

    let loaded = AppConfig::load_or_create(&config_path).expect("Failed to load config");
    assert_eq!(loaded.market_data.symbols, created.market_data.symbols);
}

#[test]
fn test_storage_paths() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_test_config(&temp_dir);

    assert_eq!(config.storage.settings_path(), temp_dir.path().join("Settings.json"));
    assert_eq!(config.storage.accounts_path(), temp_dir.path().join("Accounts.json"));
    assert_eq!(config.storage.vault_path(), temp_dir.path().join("Accounts.enc"));
}
