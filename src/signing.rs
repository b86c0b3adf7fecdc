//! Signed private API requests
//!
//! A private call carries its parameters in a JSON payload
//! `{"request": <path>, "nonce": <n>, ...extra}` that is base64-encoded and
//! signed with HMAC-SHA384 keyed by the account's secret. The exchange
//! verifies the signature over the exact base64 bytes, so the JSON is
//! serialized compactly with keys in insertion order.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha384;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::accounts::Account;
use crate::error::{TraderError, TraderResult};

type HmacSha384 = Hmac<Sha384>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub path: String,
    pub nonce: u64,
    pub payload: String,
    pub payload_b64: String,
    pub signature: String,
}

/// Strictly increasing nonces per API key.
///
/// Epoch milliseconds are used while the clock moves forward; two requests
/// in the same millisecond (or a clock step backwards) get `last + 1`.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: Mutex<HashMap<String, u64>>,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self, api_key: &str) -> u64 {
        let now = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let mut last = self.last.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = last.entry(api_key.to_string()).or_insert(0);
        *entry = now.max(*entry + 1);
        *entry
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignedRequestBuilder {
    nonces: Arc<NonceSource>,
}

impl SignedRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(
        &self,
        account: &Account,
        path: &str,
        extra: &[(&str, Value)],
    ) -> TraderResult<SignedRequest> {
        if account.secret_key.is_empty() {
            return Err(TraderError::Credential(format!(
                "account '{}' has no secret key",
                account.account_id
            )));
        }
        let nonce = self.nonces.next(&account.api_key);
        Self::build_with_nonce(account, path, extra, nonce)
    }

    /// Deterministic form of [`build`](Self::build) for a caller-chosen nonce
    pub fn build_with_nonce(
        account: &Account,
        path: &str,
        extra: &[(&str, Value)],
        nonce: u64,
    ) -> TraderResult<SignedRequest> {
        if account.secret_key.is_empty() {
            return Err(TraderError::Credential(format!(
                "account '{}' has no secret key",
                account.account_id
            )));
        }

        let mut fields = Map::new();
        fields.insert("request".to_string(), Value::from(path));
        fields.insert("nonce".to_string(), Value::from(nonce));
        for (key, value) in extra {
            if fields.contains_key(*key) {
                return Err(TraderError::Validation(format!(
                    "payload field '{}' is reserved or repeated",
                    key
                )));
            }
            fields.insert(key.to_string(), value.clone());
        }

        let payload = serde_json::to_string(&Value::Object(fields))?;
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(payload.as_bytes());
        let signature = sign(&account.secret_key, &payload_b64)?;

        Ok(SignedRequest {
            path: path.to_string(),
            nonce,
            payload,
            payload_b64,
            signature,
        })
    }
}

/// Lowercase hex HMAC-SHA384 of `message`
fn sign(secret: &str, message: &str) -> TraderResult<String> {
    let mut mac = HmacSha384::new_from_slice(secret.as_bytes())
        .map_err(|e| TraderError::Credential(format!("unusable secret key: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
