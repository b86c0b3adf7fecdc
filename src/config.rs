// Configuration management for the Gemini trading client

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::TradingPair;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_production_url")]
    pub production_url: String,
    #[serde(default = "default_sandbox_url")]
    pub sandbox_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_aggregator_url")]
    pub aggregator_url: String,
    #[serde(default = "default_aggregator_exchange")]
    pub aggregator_exchange: String,   // value of the `e=` query parameter
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: u32,            // candles requested per symbol
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_stats_window")]
    pub stats_window: usize,           // periods used for high/low/delta
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_probe_address")]
    pub probe_address: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

// Default value functions
fn default_production_url() -> String { "https://api.gemini.com".to_string() }
fn default_sandbox_url() -> String { "https://api.sandbox.gemini.com".to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_aggregator_url() -> String { "https://min-api.cryptocompare.com".to_string() }
fn default_aggregator_exchange() -> String { "Gemini".to_string() }
fn default_symbols() -> Vec<String> { vec!["btcusd".to_string(), "ethusd".to_string()] }
fn default_history_limit() -> u32 { 60 }
fn default_poll_interval() -> u64 { 15 }
fn default_stats_window() -> usize { 24 }
fn default_probe_address() -> String { "74.125.21.99:80".to_string() }
fn default_probe_timeout() -> u64 { 1000 }
fn default_data_dir() -> String { ".".to_string() }
fn default_log_level() -> String { "info".to_string() }

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            production_url: default_production_url(),
            sandbox_url: default_sandbox_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            aggregator_url: default_aggregator_url(),
            aggregator_exchange: default_aggregator_exchange(),
            symbols: default_symbols(),
            history_limit: default_history_limit(),
            poll_interval_secs: default_poll_interval(),
            stats_window: default_stats_window(),
        }
    }
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_address: default_probe_address(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { data_dir: default_data_dir() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig::default(),
            market_data: MarketDataConfig::default(),
            connectivity: ConnectivityConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ExchangeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL for an account's environment
    pub fn base_url(&self, sandbox: bool) -> &str {
        if sandbox {
            &self.sandbox_url
        } else {
            &self.production_url
        }
    }
}

impl MarketDataConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Tracked symbols parsed into trading pairs
    pub fn pairs(&self) -> Result<Vec<TradingPair>, ConfigError> {
        self.symbols
            .iter()
            .map(|s| {
                s.parse::<TradingPair>()
                    .map_err(|e| ConfigError::Validation(format!("symbol '{}': {}", s, e)))
            })
            .collect()
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl StorageConfig {
    pub fn settings_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("Settings.json")
    }

    pub fn accounts_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("Accounts.json")
    }

    pub fn vault_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("Accounts.enc")
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            tracing::info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchange.production_url.is_empty() || self.exchange.sandbox_url.is_empty() {
            return Err(ConfigError::Validation("exchange URLs must not be empty".to_string()));
        }

        if self.exchange.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be greater than 0".to_string()));
        }

        if self.market_data.aggregator_url.is_empty() {
            return Err(ConfigError::Validation("aggregator_url must not be empty".to_string()));
        }

        if self.market_data.symbols.is_empty() {
            return Err(ConfigError::Validation("at least one symbol must be tracked".to_string()));
        }
        self.market_data.pairs()?;

        if self.market_data.poll_interval_secs == 0 {
            return Err(ConfigError::Validation("poll_interval_secs must be greater than 0".to_string()));
        }

        if self.market_data.history_limit == 0 {
            return Err(ConfigError::Validation("history_limit must be greater than 0".to_string()));
        }

        if self.market_data.stats_window == 0 {
            return Err(ConfigError::Validation("stats_window must be greater than 0".to_string()));
        }

        if self.connectivity.probe_timeout_ms == 0 {
            return Err(ConfigError::Validation("probe_timeout_ms must be greater than 0".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}
