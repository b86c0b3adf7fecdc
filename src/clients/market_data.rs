// Public trade history from the CryptoCompare market-data aggregator

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{TraderError, TraderResult};
use crate::types::{Candle, TradingPair};

#[derive(Debug, Deserialize)]
struct HistoResponse {
    #[serde(rename = "Response", default)]
    response: String,
    #[serde(rename = "Message", default)]
    message: String,
    #[serde(rename = "Data", default)]
    data: Value,
}

#[derive(Debug, Clone)]
pub struct MarketDataClient {
    http: reqwest::Client,
    base_url: String,
    exchange: String,
}

impl MarketDataClient {
    pub fn new(http: reqwest::Client, base_url: &str, exchange: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            exchange: exchange.to_string(),
        }
    }

    /// Minute candles for a pair, in the order the aggregator returns them
    pub async fn get_trade_history(&self, pair: &TradingPair, limit: u32) -> TraderResult<Vec<Candle>> {
        let url = format!("{}/data/histominute", self.base_url);
        let params = [
            ("fsym", pair.base.clone()),
            ("tsym", pair.quote.clone()),
            ("limit", limit.to_string()),
            ("e", self.exchange.clone()),
        ];

        debug!("GET /data/histominute {} limit={}", pair, limit);

        let response = self.http.get(&url).query(&params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        let parsed: HistoResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => return Err(TraderError::Http(status.as_u16())),
            Err(e) => return Err(TraderError::Parse(format!("malformed JSON: {}", e))),
        };

        if parsed.response.eq_ignore_ascii_case("error") {
            return Err(TraderError::exchange("AggregatorError", parsed.message));
        }
        if !status.is_success() {
            return Err(TraderError::Http(status.as_u16()));
        }

        serde_json::from_value(parsed.data)
            .map_err(|e| TraderError::Parse(format!("invalid candle data: {}", e)))
    }
}
