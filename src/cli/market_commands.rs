// Market data and private exchange commands

use std::sync::Arc;

use gemini_cryptotrader::{
    Account, AppConfig, ExchangeClient, MarketDataPoller, MarketSnapshot, OrderRequest, OrderSide,
    PollerSettings, PollerStatus, Session, SignedRequestBuilder, TcpProbe, TradingPair,
    TraderError, TraderResult,
};
use tracing::{info, warn};

use crate::OrderArgs;

fn parse_pair(symbol: &str) -> TraderResult<TradingPair> {
    symbol.parse().map_err(TraderError::Validation)
}

fn public_client(config: &AppConfig) -> TraderResult<ExchangeClient> {
    ExchangeClient::from_config(config, SignedRequestBuilder::new())
}

/// Last-used account, refusing the placeholder
fn active_account(session: &Session) -> TraderResult<Account> {
    let account = session.current_account()?;
    if account.is_placeholder() {
        return Err(TraderError::Credential(
            "no account configured (add one with: gemini-trader account add)".to_string(),
        ));
    }
    info!("👤 Using account '{}'{}", account.account_id, if account.is_sandbox { " (sandbox)" } else { "" });
    Ok(account)
}

pub async fn show_ticker(config: &AppConfig, symbol: &str) -> TraderResult<()> {
    let pair = parse_pair(symbol)?;
    let ticker = public_client(config)?.get_public_ticker(&pair).await?;

    info!("📈 {}", pair);
    info!("   Last: {:.2}", ticker.last);
    info!("   Bid:  {:.2}", ticker.bid);
    info!("   Ask:  {:.2}", ticker.ask);
    Ok(())
}

pub async fn show_history(config: &AppConfig, symbol: &str, limit: u32) -> TraderResult<()> {
    let pair = parse_pair(symbol)?;
    let mut candles = public_client(config)?.get_trade_history(&pair, limit).await?;
    gemini_cryptotrader::poller::sort_candles(&mut candles);

    info!("🕯️  {} ({} candles)", pair, candles.len());
    for candle in &candles {
        let time = candle
            .timestamp()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| candle.time.to_string());
        info!(
            "   {}  O {:.2}  H {:.2}  L {:.2}  C {:.2}  V {:.4}",
            time, candle.open, candle.high, candle.low, candle.close, candle.volume
        );
    }
    Ok(())
}

pub async fn show_balances(session: &Session) -> TraderResult<()> {
    let account = active_account(session)?;
    let balances = session.exchange_client()?.get_balances(&account).await?;

    if balances.is_empty() {
        info!("💰 No balances");
        return Ok(());
    }

    info!("💰 Balances");
    for balance in balances {
        info!(
            "   {:<6} {:>16.8}  (available {:.8})",
            balance.currency, balance.amount, balance.available
        );
    }
    Ok(())
}

pub async fn place_order(session: &Session, side: OrderSide, args: OrderArgs) -> TraderResult<()> {
    let account = active_account(session)?;
    let pair = parse_pair(&args.symbol)?;

    let order = match args.stop {
        Some(stop) => OrderRequest::stop_limit(pair, side, args.amount, args.price, stop),
        None => OrderRequest::limit(pair, side, args.amount, args.price),
    };

    info!(
        "📝 {} {} {} @ {} ({})",
        side.as_str(),
        order.amount,
        order.pair,
        order.price,
        order.order_type()
    );

    let status = session.exchange_client()?.gemini.new_order(&account, &order).await?;
    info!(
        "✅ Order {} accepted: executed {} remaining {}{}",
        status.order_id,
        status.executed_amount,
        status.remaining_amount,
        if status.is_live { " (live)" } else { "" }
    );
    Ok(())
}

pub async fn cancel_order(session: &Session, order_id: u64) -> TraderResult<()> {
    let account = active_account(session)?;
    let status = session.exchange_client()?.gemini.cancel_order(&account, order_id).await?;

    if status.is_cancelled {
        info!("✅ Order {} cancelled", status.order_id);
    } else {
        warn!("⚠️  Order {} was not cancelled", status.order_id);
    }
    Ok(())
}

pub async fn heartbeat(session: &Session) -> TraderResult<()> {
    let account = active_account(session)?;
    session.exchange_client()?.gemini.heartbeat(&account).await?;
    info!("💓 Heartbeat sent");
    Ok(())
}

pub async fn deposit_address(session: &Session, currency: &str, label: Option<&str>) -> TraderResult<()> {
    let account = active_account(session)?;
    let address = session
        .exchange_client()?
        .gemini
        .new_deposit_address(&account, currency, label)
        .await?;

    info!("🏦 {} deposit address: {}", address.currency, address.address);
    Ok(())
}

pub async fn withdraw(session: &Session, currency: &str, address: &str, amount: f64) -> TraderResult<()> {
    let account = active_account(session)?;
    let receipt = session
        .exchange_client()?
        .gemini
        .withdraw(&account, currency, address, amount)
        .await?;

    info!("📤 Withdrew {} {} to {}", receipt.amount, currency.to_uppercase(), receipt.address);
    if let Some(id) = receipt.withdrawal_id {
        info!("   Withdrawal ID: {}", id);
    }
    Ok(())
}

pub async fn watch(config: AppConfig, symbols: Option<String>) -> TraderResult<()> {
    let mut settings = PollerSettings::from_config(&config)?;
    if let Some(symbols) = symbols {
        settings.pairs = symbols
            .split(',')
            .map(parse_pair)
            .collect::<TraderResult<Vec<_>>>()?;
    }

    let source = Arc::new(public_client(&config)?);
    let probe = Arc::new(TcpProbe::from_config(&config.connectivity));
    let mut poller = MarketDataPoller::new(source, probe, settings);
    let mut receiver = poller.subscribe();

    poller.start()?;
    info!("Press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("🛑 Shutdown signal received");
                break;
            }
            changed = receiver.status.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = receiver.status.borrow_and_update().clone();
                match status {
                    PollerStatus::Offline => warn!("📴 Offline, waiting for connectivity"),
                    PollerStatus::Degraded(reason) => warn!("⚠️  Refresh failed: {}", reason),
                    PollerStatus::Running | PollerStatus::Stopped => {}
                }
            }
            changed = receiver.snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = receiver.snapshots.borrow_and_update().clone();
                if let Some(snapshot) = snapshot {
                    print_snapshot(&snapshot);
                }
            }
        }
    }

    poller.stop().await;
    Ok(())
}

fn print_snapshot(snapshot: &MarketSnapshot) {
    info!("📊 Snapshot #{} at {}", snapshot.sequence, snapshot.taken_at.format("%H:%M:%S"));
    for (symbol, last) in &snapshot.tickers {
        match snapshot.stats.get(symbol) {
            Some(stats) => info!(
                "   {:<8} {:>12.2}  H {:.2}  L {:.2}  Δ {:+.2} ({:+.2}%)",
                symbol, last, stats.high, stats.low, stats.delta, stats.delta_pct
            ),
            None => info!("   {:<8} {:>12.2}", symbol, last),
        }
    }
}
