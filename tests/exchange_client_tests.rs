// Exchange client tests against a mock HTTP server

mod common;

use common::{create_mock_config, fund_manager_account, trader_account};
use gemini_cryptotrader::{
    Account, ExchangeClient, OrderRequest, OrderSide, SignedRequestBuilder, TraderError, TradingPair,
};
use mockito::{Matcher, Server};
use tempfile::TempDir;

fn client_for(server: &Server) -> (TempDir, ExchangeClient) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config = create_mock_config(&dir, &server.url());
    let client = ExchangeClient::from_config(&config, SignedRequestBuilder::new())
        .expect("Failed to build client");
    (dir, client)
}

fn btcusd() -> TradingPair {
    "btcusd".parse().expect("Failed to parse pair")
}

#[tokio::test]
async fn test_balances_request_is_signed() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/balances")
        .match_header("content-type", "text/plain")
        .match_header("content-length", "0")
        .match_header("cache-control", "no-cache")
        .match_header("x-gemini-apikey", "alice-key")
        .match_header(
            "x-gemini-payload",
            Matcher::Regex("^eyJyZXF1ZXN0IjoiL3YxL2JhbGFuY2VzIiwibm9uY2Ui".to_string()),
        )
        .match_header("x-gemini-signature", Matcher::Regex("^[0-9a-f]{96}$".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"[
                {"type":"exchange","currency":"BTC","amount":"1.5","available":"1.25","availableForWithdrawal":"1.25"},
                {"type":"exchange","currency":"USD","amount":"2500.00","available":"2500.00","availableForWithdrawal":"2500.00"}
            ]"#,
        )
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let balances = client
        .get_balances(&trader_account("alice"))
        .await
        .expect("Failed to fetch balances");

    mock.assert_async().await;
    assert_eq!(balances.len(), 2);
    assert_eq!(balances[0].currency, "BTC");
    assert_eq!(balances[0].amount, 1.5);
    assert_eq!(balances[0].available, 1.25);
    assert_eq!(balances[1].kind, "exchange");
}

#[tokio::test]
async fn test_error_envelope_surfaces_reason() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/v1/balances")
        .with_status(400)
        .with_body(r#"{"result":"error","reason":"InvalidSignature","message":"InvalidSignature"}"#)
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let result = client.get_balances(&trader_account("alice")).await;

    match result {
        Err(TraderError::Exchange { reason, .. }) => assert_eq!(reason, "InvalidSignature"),
        other => panic!("expected exchange error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_public_ticker() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/v1/pubticker/btcusd")
        .with_status(200)
        .with_body(r#"{"bid":"29000.10","ask":"29001.20","last":"29000.50","volume":{"BTC":"12.3","USD":"356000","timestamp":1700000000000}}"#)
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let ticker = client.get_public_ticker(&btcusd()).await.expect("Failed to fetch ticker");

    mock.assert_async().await;
    assert_eq!(ticker.symbol, "btcusd");
    assert_eq!(ticker.last, 29000.50);
    assert_eq!(ticker.bid, 29000.10);
    assert_eq!(ticker.ask, 29001.20);
}

#[tokio::test]
async fn test_trade_history_query() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/data/histominute")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("fsym".to_string(), "BTC".to_string()),
            Matcher::UrlEncoded("tsym".to_string(), "USD".to_string()),
            Matcher::UrlEncoded("limit".to_string(), "3".to_string()),
            Matcher::UrlEncoded("e".to_string(), "Gemini".to_string()),
        ]))
        .with_status(200)
        .with_body(
            r#"{"Response":"Success","Data":[
                {"time":1700000120,"open":3,"high":3,"low":3,"close":3,"volumefrom":1},
                {"time":1700000000,"open":1,"high":1,"low":1,"close":1,"volumefrom":1},
                {"time":1700000060,"open":2,"high":2,"low":2,"close":2,"volumefrom":1}
            ]}"#,
        )
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let candles = client.get_trade_history(&btcusd(), 3).await.expect("Failed to fetch history");

    mock.assert_async().await;
    assert_eq!(candles.len(), 3);
    // Returned as delivered; ordering is the poller's job
    assert_eq!(candles[0].time, 1700000120);
}

#[tokio::test]
async fn test_aggregator_error_response() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/data/histominute")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"Response":"Error","Message":"fsym is a required param.","Data":[]}"#)
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let result = client.get_trade_history(&btcusd(), 3).await;

    match result {
        Err(TraderError::Exchange { message, .. }) => assert!(message.contains("fsym")),
        other => panic!("expected exchange error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_order_requires_trader_role() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/order/new")
        .expect(0)
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let order = OrderRequest::limit(btcusd(), OrderSide::Buy, 0.5, 29000.0);
    let result = client.gemini.new_order(&fund_manager_account("bob"), &order).await;

    assert!(matches!(result, Err(TraderError::RoleNotPermitted(_, "trader"))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_withdraw_requires_fund_manager_role() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/withdraw/btc")
        .expect(0)
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let result = client
        .gemini
        .withdraw(&trader_account("alice"), "btc", "bc1qexample", 0.1)
        .await;

    assert!(matches!(result, Err(TraderError::RoleNotPermitted(_, "fund manager"))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_heartbeat_requires_heartbeat_flag() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/heartbeat")
        .with_status(200)
        .with_body(r#"{"result":"ok"}"#)
        .expect(1)
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);

    let plain = trader_account("alice");
    assert!(matches!(
        client.gemini.heartbeat(&plain).await,
        Err(TraderError::RoleNotPermitted(_, "heartbeat"))
    ));

    let with_heartbeat = trader_account("carol").with_heartbeat(true);
    client.gemini.heartbeat(&with_heartbeat).await.expect("Failed to send heartbeat");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_new_order_payload_and_response() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/order/new")
        .match_header(
            "x-gemini-payload",
            Matcher::Regex("^eyJyZXF1ZXN0IjoiL3YxL29yZGVyL25ldyIsIm5vbmNl".to_string()),
        )
        .with_status(200)
        .with_body(
            r#"{"order_id":"106817811","client_order_id":"x","symbol":"btcusd","side":"buy","type":"exchange limit",
                "price":"29000.00","executed_amount":"0","remaining_amount":"0.5","is_live":true,"is_cancelled":false}"#,
        )
        .create_async()
        .await;

    let (_dir, client) = client_for(&server);
    let order = OrderRequest::limit(btcusd(), OrderSide::Buy, 0.5, 29000.0);
    let status = client
        .gemini
        .new_order(&trader_account("alice"), &order)
        .await
        .expect("Failed to place order");

    mock.assert_async().await;
    assert_eq!(status.order_id, "106817811");
    assert_eq!(status.side, OrderSide::Buy);
    assert_eq!(status.remaining_amount, 0.5);
    assert!(status.is_live);
}

#[tokio::test]
async fn test_missing_api_key_fails_without_request() {
    let mut server = Server::new_async().await;
    let mock = server.mock("POST", "/v1/balances").expect(0).create_async().await;

    let (_dir, client) = client_for(&server);
    let result = client.get_balances(&Account::placeholder()).await;

    assert!(matches!(result, Err(TraderError::Credential(_))));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_sandbox_account_uses_sandbox_url() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/balances")
        .with_status(200)
        .with_body("[]")
        .create_async()
        .await;

    let dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = create_mock_config(&dir, &server.url());
    // Production must not be contacted
    config.exchange.production_url = "http://127.0.0.1:9".to_string();
    let client = ExchangeClient::from_config(&config, SignedRequestBuilder::new())
        .expect("Failed to build client");

    let account = trader_account("alice").sandbox(true);
    let balances = client.get_balances(&account).await.expect("Failed to fetch balances");

    assert!(balances.is_empty());
    mock.assert_async().await;
}
