// Common test utilities and helpers
#![allow(dead_code)]

use gemini_cryptotrader::{Account, AppConfig, Session};
use tempfile::TempDir;

/// Config whose data directory is the given temp dir
pub fn create_test_config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.data_dir = dir.path().display().to_string();
    config.exchange.request_timeout_secs = 5;
    config
}

/// Config pointing every HTTP endpoint at a mock server
pub fn create_mock_config(dir: &TempDir, server_url: &str) -> AppConfig {
    let mut config = create_test_config(dir);
    config.exchange.production_url = server_url.to_string();
    config.exchange.sandbox_url = server_url.to_string();
    config.market_data.aggregator_url = server_url.to_string();
    config
}

/// Fresh temp dir plus a plaintext session opened on it
pub fn create_test_session() -> (TempDir, Session) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let session = Session::open(create_test_config(&dir), None).expect("Failed to open session");
    (dir, session)
}

pub fn trader_account(id: &str) -> Account {
    Account::new(id, &format!("{}-key", id), &format!("{}-secret", id))
}

pub fn fund_manager_account(id: &str) -> Account {
    trader_account(id).with_roles(false, true)
}

/// Session with three accounts; `carol` (added last) is last used
pub fn populated_session() -> (TempDir, Session) {
    let (dir, session) = create_test_session();
    for account in [
        trader_account("alice"),
        fund_manager_account("bob"),
        trader_account("carol").with_heartbeat(true),
    ] {
        session
            .with_store_mut(|store| store.add(account).map(|_| ()))
            .expect("Failed to add account");
    }
    (dir, session)
}
