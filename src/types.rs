// Common types used across the application

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// Longest first so "gusd" wins over "usd"
const QUOTE_CURRENCIES: &[&str] = &[
    "gusd", "usdt", "usdc", "usd", "eur", "gbp", "sgd", "btc", "eth", "dai",
];

/// A symbol such as `btcusd`, split into base and quote currency
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TradingPair {
    pub base: String,
    pub quote: String,
}

impl TradingPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    /// Lowercase exchange symbol, e.g. `btcusd`
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote).to_lowercase()
    }
}

impl FromStr for TradingPair {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();

        if let Some((base, quote)) = s.split_once('/') {
            if base.is_empty() || quote.is_empty() {
                return Err(format!("invalid pair '{}'", s));
            }
            return Ok(Self::new(base, quote));
        }

        QUOTE_CURRENCIES
            .iter()
            .find(|quote| s.len() > quote.len() + 1 && s.ends_with(*quote))
            .map(|quote| Self::new(&s[..s.len() - quote.len()], quote))
            .ok_or_else(|| format!("unrecognised quote currency in '{}'", s))
    }
}

impl fmt::Display for TradingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// One OHLC period from the market-data aggregator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub time: i64, // epoch seconds
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, rename = "volumefrom")]
    pub volume: f64,
}

impl Candle {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }
}

/// Exchange ticker for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    #[serde(default)]
    pub symbol: String,
    #[serde(deserialize_with = "de_f64")]
    pub bid: f64,
    #[serde(deserialize_with = "de_f64")]
    pub ask: f64,
    #[serde(deserialize_with = "de_f64")]
    pub last: f64,
}

/// One currency balance of an exchange account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub currency: String,
    #[serde(deserialize_with = "de_f64")]
    pub amount: f64,
    #[serde(deserialize_with = "de_f64")]
    pub available: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub available_for_withdrawal: f64,
    #[serde(rename = "type", default)]
    pub kind: String,
}

/// The exchange sends decimals as strings; accept either form
pub(crate) fn de_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Num {
        Str(String),
        Float(f64),
    }

    match Num::deserialize(deserializer)? {
        Num::Float(v) => Ok(v),
        Num::Str(s) => s.parse::<f64>().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_parsing() {
        let pair: TradingPair = "btcusd".parse().unwrap();
        assert_eq!(pair.base, "BTC");
        assert_eq!(pair.quote, "USD");
        assert_eq!(pair.symbol(), "btcusd");

        let pair: TradingPair = "ETH/BTC".parse().unwrap();
        assert_eq!(pair.to_string(), "ETH/BTC");

        let pair: TradingPair = "btcgusd".parse().unwrap();
        assert_eq!(pair.quote, "GUSD");

        let pair: TradingPair = "dogeusd".parse().unwrap();
        assert_eq!(pair.base, "DOGE");
    }

    #[test]
    fn test_pair_rejects_garbage() {
        assert!("usd".parse::<TradingPair>().is_err());
        assert!("btcxyz".parse::<TradingPair>().is_err());
        assert!("/usd".parse::<TradingPair>().is_err());
    }

    #[test]
    fn test_balance_from_string_amounts() {
        let balance: Balance = serde_json::from_str(
            r#"{"type":"exchange","currency":"BTC","amount":"1.5","available":"1.25","availableForWithdrawal":"1"}"#,
        )
        .unwrap();
        assert_eq!(balance.amount, 1.5);
        assert_eq!(balance.available, 1.25);
        assert_eq!(balance.available_for_withdrawal, 1.0);
        assert_eq!(balance.kind, "exchange");
    }
}
