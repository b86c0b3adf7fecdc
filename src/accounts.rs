//! Exchange accounts and the in-memory account store
//!
//! The store keeps at most one account flagged `last_used`; that account is
//! the default for new sessions. The on-disk form is a JSON array of
//! [`Account`] records using the exchange dashboard's camelCase field names.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::error::{TraderError, TraderResult};

#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub account_id: String,
    pub api_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub is_trader: bool,
    #[serde(default)]
    pub has_heartbeat: bool,
    #[serde(default)]
    pub is_fund_manager: bool,
    #[serde(default)]
    pub is_sandbox: bool,
    #[serde(default)]
    pub last_used: bool,
}

impl Account {
    pub fn new(account_id: &str, api_key: &str, secret_key: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            api_key: api_key.to_string(),
            secret_key: secret_key.to_string(),
            is_trader: true,
            ..Default::default()
        }
    }

    pub fn with_roles(mut self, is_trader: bool, is_fund_manager: bool) -> Self {
        self.is_trader = is_trader;
        self.is_fund_manager = is_fund_manager;
        self
    }

    pub fn with_heartbeat(mut self, has_heartbeat: bool) -> Self {
        self.has_heartbeat = has_heartbeat;
        self
    }

    pub fn sandbox(mut self, is_sandbox: bool) -> Self {
        self.is_sandbox = is_sandbox;
        self
    }

    /// The empty account synthesized when the store has nothing to offer
    pub fn placeholder() -> Self {
        Self {
            is_trader: true,
            last_used: true,
            ..Default::default()
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.account_id.is_empty()
    }

    /// Buy, sell and conditional order endpoints
    pub fn can_trade(&self) -> bool {
        self.is_trader
    }

    /// Deposit address and withdrawal endpoints
    pub fn can_manage_funds(&self) -> bool {
        self.is_fund_manager
    }

    /// Heartbeat only applies to trader sessions
    pub fn heartbeat_enabled(&self) -> bool {
        self.is_trader && self.has_heartbeat
    }

    fn normalize_roles(&mut self) {
        if !self.is_trader {
            self.has_heartbeat = false;
        }
    }
}

// Secret keys stay out of logs
impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("account_id", &self.account_id)
            .field("api_key", &self.api_key)
            .field("secret_key", &"<redacted>")
            .field("is_trader", &self.is_trader)
            .field("has_heartbeat", &self.has_heartbeat)
            .field("is_fund_manager", &self.is_fund_manager)
            .field("is_sandbox", &self.is_sandbox)
            .field("last_used", &self.last_used)
            .finish()
    }
}

/// Mutable fields of an existing account. `account_id` is immutable.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub api_key: Option<String>,
    pub secret_key: Option<String>,
    pub is_trader: Option<bool>,
    pub has_heartbeat: Option<bool>,
    pub is_fund_manager: Option<bool>,
    pub is_sandbox: Option<bool>,
}

impl AccountUpdate {
    fn apply_to(&self, account: &mut Account) {
        if let Some(api_key) = &self.api_key {
            account.api_key = api_key.clone();
        }
        if let Some(secret_key) = &self.secret_key {
            account.secret_key = secret_key.clone();
        }
        if let Some(is_trader) = self.is_trader {
            account.is_trader = is_trader;
        }
        if let Some(has_heartbeat) = self.has_heartbeat {
            account.has_heartbeat = has_heartbeat;
        }
        if let Some(is_fund_manager) = self.is_fund_manager {
            account.is_fund_manager = is_fund_manager;
        }
        if let Some(is_sandbox) = self.is_sandbox {
            account.is_sandbox = is_sandbox;
        }
        account.normalize_roles();
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountStore {
    accounts: Vec<Account>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from persisted records, repairing a duplicated
    /// `last_used` flag by keeping the first one.
    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        let mut store = Self { accounts };
        let mut seen = false;
        for account in &mut store.accounts {
            if account.last_used {
                if seen {
                    account.last_used = false;
                }
                seen = true;
            }
        }
        store
    }

    pub fn from_json(bytes: &[u8]) -> TraderResult<Self> {
        let accounts: Vec<Account> = serde_json::from_slice(bytes)?;
        Ok(Self::from_accounts(accounts))
    }

    /// Serialized form written to `Accounts.json` or sealed into the vault.
    /// The synthesized placeholder stays in memory only.
    pub fn to_json(&self) -> TraderResult<Vec<u8>> {
        let stored: Vec<&Account> = self.accounts.iter().filter(|a| !a.is_placeholder()).collect();
        Ok(serde_json::to_vec_pretty(&stored)?)
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, account_id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.account_id == account_id)
    }

    /// Validate and append a new account, making it the last-used one
    pub fn add(&mut self, mut candidate: Account) -> TraderResult<&Account> {
        candidate.normalize_roles();
        self.validate_new(&candidate)?;

        // A real account supersedes the synthesized placeholder
        self.accounts.retain(|a| !a.is_placeholder());

        for account in &mut self.accounts {
            account.last_used = false;
        }
        candidate.last_used = true;

        info!("➕ Added account {}", candidate.account_id);
        self.accounts.push(candidate);

        let index = self.accounts.len() - 1;
        Ok(&self.accounts[index])
    }

    /// Apply credential and role changes to an existing account.
    /// The updated account becomes the last-used one.
    pub fn update(&mut self, account_id: &str, fields: &AccountUpdate) -> TraderResult<&Account> {
        let index = self
            .position(account_id)
            .ok_or_else(|| TraderError::NotFound(account_id.to_string()))?;

        let mut updated = self.accounts[index].clone();
        fields.apply_to(&mut updated);

        if !updated.is_trader && !updated.is_fund_manager {
            return Err(TraderError::Validation("At least one role must be set.".to_string()));
        }
        for (i, other) in self.accounts.iter().enumerate() {
            if i == index || other.is_placeholder() {
                continue;
            }
            if other.api_key == updated.api_key {
                return Err(TraderError::Validation("This API key already exists.".to_string()));
            }
            if other.secret_key == updated.secret_key {
                return Err(TraderError::Validation("This secret key already exists.".to_string()));
            }
        }

        self.accounts[index] = updated;
        self.mark_last_used(index);
        debug!("Updated account {}", account_id);
        Ok(&self.accounts[index])
    }

    pub fn remove(&mut self, account_id: &str) -> TraderResult<Account> {
        let index = self
            .position(account_id)
            .ok_or_else(|| TraderError::NotFound(account_id.to_string()))?;

        let removed = self.accounts.remove(index);
        if removed.last_used && !self.accounts.is_empty() {
            self.mark_last_used(0);
        }

        info!("🗑️  Removed account {}", account_id);
        Ok(removed)
    }

    /// Make `account_id` the last-used account. On an empty store a
    /// placeholder account is synthesized and selected instead.
    pub fn set_last_used(&mut self, account_id: &str) -> TraderResult<&Account> {
        if self.accounts.is_empty() {
            debug!("No accounts configured, selecting placeholder");
            self.accounts.push(Account::placeholder());
            return Ok(&self.accounts[0]);
        }

        let index = self
            .position(account_id)
            .ok_or_else(|| TraderError::NotFound(account_id.to_string()))?;
        self.mark_last_used(index);
        Ok(&self.accounts[index])
    }

    /// The account flagged last-used; `None` only for an empty store
    pub fn load_default(&self) -> TraderResult<Option<&Account>> {
        if self.accounts.is_empty() {
            return Ok(None);
        }

        self.accounts
            .iter()
            .find(|a| a.last_used)
            .map(Some)
            .ok_or_else(|| {
                TraderError::State(format!(
                    "{} accounts stored but none is marked last used",
                    self.accounts.len()
                ))
            })
    }

    fn position(&self, account_id: &str) -> Option<usize> {
        self.accounts.iter().position(|a| a.account_id == account_id)
    }

    fn mark_last_used(&mut self, index: usize) {
        for (i, account) in self.accounts.iter_mut().enumerate() {
            account.last_used = i == index;
        }
    }

    fn validate_new(&self, candidate: &Account) -> TraderResult<()> {
        if !candidate.is_trader && !candidate.is_fund_manager {
            return Err(TraderError::Validation("At least one role must be set.".to_string()));
        }

        if candidate.account_id.trim().is_empty() {
            return Err(TraderError::Validation("Account ID is required.".to_string()));
        }

        for existing in self.accounts.iter().filter(|a| !a.is_placeholder()) {
            if existing.account_id == candidate.account_id {
                return Err(TraderError::Validation("This Account ID already exists.".to_string()));
            }
            if existing.api_key == candidate.api_key {
                return Err(TraderError::Validation("This API key already exists.".to_string()));
            }
            if existing.secret_key == candidate.secret_key {
                return Err(TraderError::Validation("This secret key already exists.".to_string()));
            }
        }

        Ok(())
    }
}
