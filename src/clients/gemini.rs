// Gemini REST client: public ticker and signed private endpoints

use reqwest::header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::accounts::Account;
use crate::config::ExchangeConfig;
use crate::error::{TraderError, TraderResult};
use crate::signing::SignedRequestBuilder;
use crate::types::{de_f64, Balance, Ticker, TradingPair};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

/// Limit order, or a conditional stop-limit order when `stop_price` is set
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: TradingPair,
    pub side: OrderSide,
    pub amount: f64,
    pub price: f64,
    pub stop_price: Option<f64>,
}

impl OrderRequest {
    pub fn limit(pair: TradingPair, side: OrderSide, amount: f64, price: f64) -> Self {
        Self { pair, side, amount, price, stop_price: None }
    }

    pub fn stop_limit(pair: TradingPair, side: OrderSide, amount: f64, price: f64, stop_price: f64) -> Self {
        Self { pair, side, amount, price, stop_price: Some(stop_price) }
    }

    pub fn order_type(&self) -> &'static str {
        if self.stop_price.is_some() {
            "exchange stop limit"
        } else {
            "exchange limit"
        }
    }

    fn validate(&self) -> TraderResult<()> {
        if !(self.amount > 0.0) {
            return Err(TraderError::Validation("Order amount must be positive.".to_string()));
        }
        if !(self.price > 0.0) {
            return Err(TraderError::Validation("Order price must be positive.".to_string()));
        }
        if let Some(stop) = self.stop_price {
            if !(stop > 0.0) {
                return Err(TraderError::Validation("Stop price must be positive.".to_string()));
            }
        }
        Ok(())
    }

    /// Payload fields after `request` and `nonce`
    fn payload_fields(&self, client_order_id: &str) -> Vec<(&'static str, Value)> {
        let mut fields = vec![
            ("client_order_id", json!(client_order_id)),
            ("symbol", json!(self.pair.symbol())),
            ("amount", json!(self.amount.to_string())),
            ("price", json!(self.price.to_string())),
            ("side", json!(self.side.as_str())),
            ("type", json!(self.order_type())),
        ];
        if let Some(stop) = self.stop_price {
            fields.push(("stop_price", json!(stop.to_string())));
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub price: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub executed_amount: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub remaining_amount: f64,
    #[serde(default)]
    pub is_live: bool,
    #[serde(default)]
    pub is_cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DepositAddress {
    pub currency: String,
    pub address: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    pub address: String,
    #[serde(deserialize_with = "de_f64")]
    pub amount: f64,
    #[serde(default)]
    pub withdrawal_id: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    config: ExchangeConfig,
    signer: SignedRequestBuilder,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, config: ExchangeConfig, signer: SignedRequestBuilder) -> Self {
        Self { http, config, signer }
    }

    /// Last, bid and ask for one symbol
    pub async fn get_public_ticker(&self, pair: &TradingPair) -> TraderResult<Ticker> {
        let symbol = pair.symbol();
        let path = format!("/v1/pubticker/{}", symbol);
        let url = format!("{}{}", self.config.production_url, path);

        debug!("GET {}", path);
        let response = self.http.get(&url).send().await?;

        let mut ticker: Ticker = handle_response(response).await?;
        ticker.symbol = symbol;
        Ok(ticker)
    }

    pub async fn get_balances(&self, account: &Account) -> TraderResult<Vec<Balance>> {
        self.private_post(account, "/v1/balances", &[]).await
    }

    pub async fn new_order(&self, account: &Account, order: &OrderRequest) -> TraderResult<OrderStatus> {
        require_trader(account)?;
        order.validate()?;

        let client_order_id = uuid::Uuid::new_v4().to_string();
        self.private_post(account, "/v1/order/new", &order.payload_fields(&client_order_id))
            .await
    }

    pub async fn cancel_order(&self, account: &Account, order_id: u64) -> TraderResult<OrderStatus> {
        require_trader(account)?;
        self.private_post(account, "/v1/order/cancel", &[("order_id", json!(order_id))])
            .await
    }

    /// Keep a heartbeat-enabled trading session alive
    pub async fn heartbeat(&self, account: &Account) -> TraderResult<()> {
        if !account.heartbeat_enabled() {
            return Err(TraderError::RoleNotPermitted(account.account_id.clone(), "heartbeat"));
        }
        let _: Value = self.private_post(account, "/v1/heartbeat", &[]).await?;
        Ok(())
    }

    pub async fn new_deposit_address(
        &self,
        account: &Account,
        currency: &str,
        label: Option<&str>,
    ) -> TraderResult<DepositAddress> {
        require_fund_manager(account)?;
        let path = format!("/v1/deposit/{}/newAddress", currency.to_lowercase());
        let extra: Vec<(&str, Value)> = label.map(|l| ("label", json!(l))).into_iter().collect();
        self.private_post(account, &path, &extra).await
    }

    pub async fn withdraw(
        &self,
        account: &Account,
        currency: &str,
        address: &str,
        amount: f64,
    ) -> TraderResult<WithdrawalReceipt> {
        require_fund_manager(account)?;
        if address.trim().is_empty() {
            return Err(TraderError::Validation("Withdrawal address is required.".to_string()));
        }
        if !(amount > 0.0) {
            return Err(TraderError::Validation("Withdrawal amount must be positive.".to_string()));
        }

        let path = format!("/v1/withdraw/{}", currency.to_lowercase());
        let extra = [("address", json!(address)), ("amount", json!(amount.to_string()))];
        self.private_post(account, &path, &extra).await
    }

    async fn private_post<T: DeserializeOwned>(
        &self,
        account: &Account,
        path: &str,
        extra: &[(&str, Value)],
    ) -> TraderResult<T> {
        if account.api_key.is_empty() {
            return Err(TraderError::Credential(format!(
                "account '{}' has no API key",
                account.account_id
            )));
        }

        let request = self.signer.build(account, path, extra)?;
        let url = format!("{}{}", self.config.base_url(account.is_sandbox), path);

        debug!("POST (signed) {} nonce={}", path, request.nonce);

        let response = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "text/plain")
            .header(CONTENT_LENGTH, "0")
            .header(CACHE_CONTROL, "no-cache")
            .header("X-GEMINI-APIKEY", &account.api_key)
            .header("X-GEMINI-PAYLOAD", &request.payload_b64)
            .header("X-GEMINI-SIGNATURE", &request.signature)
            .send()
            .await?;

        handle_response(response).await
    }
}

fn require_trader(account: &Account) -> TraderResult<()> {
    if account.can_trade() {
        Ok(())
    } else {
        Err(TraderError::RoleNotPermitted(account.account_id.clone(), "trader"))
    }
}

fn require_fund_manager(account: &Account) -> TraderResult<()> {
    if account.can_manage_funds() {
        Ok(())
    } else {
        Err(TraderError::RoleNotPermitted(account.account_id.clone(), "fund manager"))
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> TraderResult<T> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    parse_response(status, &body)
}

/// Decode a response body, surfacing the exchange's error envelope
/// (`{"result":"error","reason":...,"message":...}`) as an exchange error.
pub fn parse_response<T: DeserializeOwned>(status: u16, body: &str) -> TraderResult<T> {
    let success = (200..300).contains(&status);

    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) if !success => return Err(TraderError::Http(status)),
        Err(e) => return Err(TraderError::Parse(format!("malformed JSON: {}", e))),
    };

    if let Some(err) = error_envelope(&value) {
        return Err(err);
    }
    if !success {
        return Err(TraderError::Http(status));
    }

    serde_json::from_value(value)
        .map_err(|e| TraderError::Parse(format!("unexpected response shape: {}", e)))
}

fn error_envelope(value: &Value) -> Option<TraderError> {
    let object = value.as_object()?;
    if object.get("result").and_then(Value::as_str) != Some("error") {
        return None;
    }

    let reason = object
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or("UnknownError");
    let message = object.get("message").and_then(Value::as_str).unwrap_or("");
    Some(TraderError::exchange(reason, message))
}
