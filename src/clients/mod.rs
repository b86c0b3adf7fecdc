// External API clients

pub mod gemini;
pub mod market_data;

use async_trait::async_trait;

use crate::accounts::Account;
use crate::config::AppConfig;
use crate::error::{TraderError, TraderResult};
use crate::poller::MarketDataSource;
use crate::signing::SignedRequestBuilder;
use crate::types::{Balance, Candle, Ticker, TradingPair};

// Re-export client types
pub use gemini::{
    parse_response, DepositAddress, GeminiClient, OrderRequest, OrderSide, OrderStatus,
    WithdrawalReceipt,
};
pub use market_data::MarketDataClient;

/// Public market data plus the exchange's signed private API
#[derive(Debug, Clone)]
pub struct ExchangeClient {
    pub gemini: GeminiClient,
    pub market_data: MarketDataClient,
}

impl ExchangeClient {
    pub fn from_config(config: &AppConfig, signer: SignedRequestBuilder) -> TraderResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.exchange.request_timeout())
            .build()
            .map_err(|e| TraderError::Internal(format!("HTTP client: {}", e)))?;

        Ok(Self {
            gemini: GeminiClient::new(http.clone(), config.exchange.clone(), signer),
            market_data: MarketDataClient::new(
                http,
                &config.market_data.aggregator_url,
                &config.market_data.aggregator_exchange,
            ),
        })
    }

    pub async fn get_public_ticker(&self, pair: &TradingPair) -> TraderResult<Ticker> {
        self.gemini.get_public_ticker(pair).await
    }

    pub async fn get_trade_history(&self, pair: &TradingPair, limit: u32) -> TraderResult<Vec<Candle>> {
        self.market_data.get_trade_history(pair, limit).await
    }

    pub async fn get_balances(&self, account: &Account) -> TraderResult<Vec<Balance>> {
        self.gemini.get_balances(account).await
    }
}

#[async_trait]
impl MarketDataSource for ExchangeClient {
    async fn ticker(&self, pair: &TradingPair) -> TraderResult<Ticker> {
        self.get_public_ticker(pair).await
    }

    async fn trade_history(&self, pair: &TradingPair, limit: u32) -> TraderResult<Vec<Candle>> {
        self.get_trade_history(pair, limit).await
    }
}
