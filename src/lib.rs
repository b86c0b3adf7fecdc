// Gemini CryptoTrader Library
//
// Authenticated Gemini exchange client with an encrypted local account store
// and a background market-data poller

pub mod accounts;
pub mod clients;
pub mod config;
pub mod error;       // Unified error handling
pub mod poller;
pub mod session;     // Application context built once at startup
pub mod settings;
pub mod signing;
pub mod types;
pub mod vault;

// Re-export error types
pub use error::{TraderError, TraderResult};

// Re-export configuration
pub use config::{AppConfig, ConfigError, ConnectivityConfig, ExchangeConfig, MarketDataConfig, StorageConfig};

// Re-export account and credential types
pub use accounts::{Account, AccountStore, AccountUpdate};
pub use settings::Settings;
pub use signing::{NonceSource, SignedRequest, SignedRequestBuilder};
pub use vault::CredentialVault;
pub use session::Session;

// Re-export client types
pub use clients::{ExchangeClient, GeminiClient, MarketDataClient, OrderRequest, OrderSide};
pub use types::{Balance, Candle, Ticker, TradingPair};

// Re-export market data polling
pub use poller::{
    ConnectivityProbe, CycleOutcome, MarketDataPoller, MarketDataSource, MarketSnapshot,
    PollerSettings, PollerStatus, SnapshotReceiver, SymbolStats, TcpProbe,
};
