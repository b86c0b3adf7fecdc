//! Background market-data refresh
//!
//! [`MarketDataPoller`] runs one tokio task that wakes on a fixed interval,
//! skips the cycle when the connectivity probe fails, and otherwise fetches
//! the ticker and trade history of every tracked pair. A complete cycle is
//! published as an immutable [`MarketSnapshot`] through a `watch` channel;
//! a failed cycle is logged and the loop waits for the next tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{try_join, try_join_all};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, ConnectivityConfig};
use crate::error::{TraderError, TraderResult};
use crate::types::{Candle, Ticker, TradingPair};

// One poller per process
static POLLER_ACTIVE: AtomicBool = AtomicBool::new(false);

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn ticker(&self, pair: &TradingPair) -> TraderResult<Ticker>;
    async fn trade_history(&self, pair: &TradingPair, limit: u32) -> TraderResult<Vec<Candle>>;
}

#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Bare TCP reachability check against a fixed host
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: &str, timeout: Duration) -> Self {
        Self { address: address.to_string(), timeout }
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(&config.probe_address, config.probe_timeout())
    }
}

#[async_trait]
impl ConnectivityProbe for TcpProbe {
    async fn is_online(&self) -> bool {
        matches!(
            timeout(self.timeout, TcpStream::connect(self.address.as_str())).await,
            Ok(Ok(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymbolStats {
    pub last: f64,
    pub high: f64,
    pub low: f64,
    pub delta: f64,
    pub delta_pct: f64,
}

impl SymbolStats {
    /// High, low and change over the last `window` candles (ascending order)
    pub fn compute(candles: &[Candle], window: usize) -> Option<Self> {
        let last = candles.last()?;
        let period = &candles[candles.len().saturating_sub(window.max(1))..];

        let high = period.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = period.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let open = period[0].open;
        let delta = last.close - open;
        let delta_pct = if open != 0.0 { delta / open * 100.0 } else { 0.0 };

        Some(Self { last: last.close, high, low, delta, delta_pct })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub sequence: u64,
    pub taken_at: DateTime<Utc>,
    /// Symbol → last traded price
    pub tickers: BTreeMap<String, f64>,
    /// Symbol → candles in ascending time order
    pub trade_history: BTreeMap<String, Vec<Candle>>,
    pub stats: BTreeMap<String, SymbolStats>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollerStatus {
    Stopped,
    Running,
    Offline,
    Degraded(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Published(u64),
    Offline,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub pairs: Vec<TradingPair>,
    pub interval: Duration,
    pub history_limit: u32,
    pub stats_window: usize,
}

impl PollerSettings {
    pub fn from_config(config: &AppConfig) -> TraderResult<Self> {
        Ok(Self {
            pairs: config.market_data.pairs()?,
            interval: config.market_data.poll_interval(),
            history_limit: config.market_data.history_limit,
            stats_window: config.market_data.stats_window,
        })
    }
}

pub fn sort_candles(candles: &mut [Candle]) {
    candles.sort_by_key(|c| c.time);
}

struct Worker {
    source: Arc<dyn MarketDataSource>,
    probe: Arc<dyn ConnectivityProbe>,
    settings: PollerSettings,
    snapshot_tx: watch::Sender<Option<Arc<MarketSnapshot>>>,
    status_tx: watch::Sender<PollerStatus>,
    sequence: AtomicU64,
}

impl Worker {
    async fn run_cycle(&self) -> CycleOutcome {
        if !self.probe.is_online().await {
            warn!("📴 No network connectivity, skipping market data refresh");
            self.status_tx.send_replace(PollerStatus::Offline);
            return CycleOutcome::Offline;
        }

        match self.fetch_snapshot().await {
            Ok(mut snapshot) => {
                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                snapshot.sequence = sequence;
                debug!("Publishing market snapshot #{}", sequence);
                self.snapshot_tx.send_replace(Some(Arc::new(snapshot)));
                self.status_tx.send_replace(PollerStatus::Running);
                CycleOutcome::Published(sequence)
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!("⚠️  Market data refresh failed ({}): {}", e.category(), e);
                } else {
                    error!("❌ Market data refresh failed ({}): {}", e.category(), e);
                }
                self.status_tx.send_replace(PollerStatus::Degraded(e.to_string()));
                CycleOutcome::Failed(e.to_string())
            }
        }
    }

    async fn fetch_snapshot(&self) -> TraderResult<MarketSnapshot> {
        let limit = self.settings.history_limit;
        let fetches = self.settings.pairs.iter().map(|pair| async move {
            let (ticker, mut candles) = try_join(
                self.source.ticker(pair),
                self.source.trade_history(pair, limit),
            )
            .await?;
            sort_candles(&mut candles);
            Ok::<_, TraderError>((pair.symbol(), ticker, candles))
        });

        let mut snapshot = MarketSnapshot {
            sequence: 0,
            taken_at: Utc::now(),
            tickers: BTreeMap::new(),
            trade_history: BTreeMap::new(),
            stats: BTreeMap::new(),
        };

        for (symbol, ticker, candles) in try_join_all(fetches).await? {
            snapshot.tickers.insert(symbol.clone(), ticker.last);
            if let Some(stats) = SymbolStats::compute(&candles, self.settings.stats_window) {
                snapshot.stats.insert(symbol.clone(), stats);
            }
            snapshot.trade_history.insert(symbol, candles);
        }

        Ok(snapshot)
    }
}

/// Receiving side handed to renderers
#[derive(Debug, Clone)]
pub struct SnapshotReceiver {
    pub snapshots: watch::Receiver<Option<Arc<MarketSnapshot>>>,
    pub status: watch::Receiver<PollerStatus>,
}

impl SnapshotReceiver {
    pub fn latest(&self) -> Option<Arc<MarketSnapshot>> {
        self.snapshots.borrow().clone()
    }
}

pub struct MarketDataPoller {
    worker: Arc<Worker>,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl MarketDataPoller {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        probe: Arc<dyn ConnectivityProbe>,
        settings: PollerSettings,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(PollerStatus::Stopped);

        Self {
            worker: Arc::new(Worker {
                source,
                probe,
                settings,
                snapshot_tx,
                status_tx,
                sequence: AtomicU64::new(0),
            }),
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        SnapshotReceiver {
            snapshots: self.worker.snapshot_tx.subscribe(),
            status: self.worker.status_tx.subscribe(),
        }
    }

    pub fn status(&self) -> PollerStatus {
        self.worker.status_tx.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Run a single refresh cycle on the caller's task
    pub async fn poll_once(&self) -> CycleOutcome {
        self.worker.run_cycle().await
    }

    /// Spawn the polling task. Fails if this or another poller is running.
    pub fn start(&mut self) -> TraderResult<()> {
        if self.task.is_some() {
            return Err(TraderError::State("poller already running".to_string()));
        }
        if POLLER_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TraderError::State(
                "another market data poller is already running in this process".to_string(),
            ));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let worker = Arc::clone(&self.worker);
        worker.status_tx.send_replace(PollerStatus::Running);

        info!(
            "📡 Market data poller started ({} pairs every {:?})",
            worker.settings.pairs.len(),
            worker.settings.interval
        );

        self.task = Some(tokio::spawn(run_loop(worker, shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Signal the task and wait for it to finish its current cycle
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Market data poller task ended abnormally: {}", e);
                POLLER_ACTIVE.store(false, Ordering::SeqCst);
            }
        }
    }
}

impl Drop for MarketDataPoller {
    fn drop(&mut self) {
        // The task sees the closed channel and exits on its own
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
    }
}

async fn run_loop(worker: Arc<Worker>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(worker.settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if *shutdown.borrow() {
            break;
        }
        worker.run_cycle().await;
    }

    worker.status_tx.send_replace(PollerStatus::Stopped);
    POLLER_ACTIVE.store(false, Ordering::SeqCst);
    info!("🛑 Market data poller stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(time: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle { time, open, high, low, close, volume: 1.0 }
    }

    struct Offline;

    #[async_trait]
    impl ConnectivityProbe for Offline {
        async fn is_online(&self) -> bool {
            false
        }
    }

    struct Unreachable;

    #[async_trait]
    impl MarketDataSource for Unreachable {
        async fn ticker(&self, _pair: &TradingPair) -> TraderResult<Ticker> {
            panic!("source must not be called while offline")
        }

        async fn trade_history(&self, _pair: &TradingPair, _limit: u32) -> TraderResult<Vec<Candle>> {
            panic!("source must not be called while offline")
        }
    }

    struct Online;

    #[async_trait]
    impl ConnectivityProbe for Online {
        async fn is_online(&self) -> bool {
            true
        }
    }

    struct Misconfigured;

    #[async_trait]
    impl MarketDataSource for Misconfigured {
        async fn ticker(&self, _pair: &TradingPair) -> TraderResult<Ticker> {
            Err(TraderError::Internal("HTTP client unavailable".to_string()))
        }

        async fn trade_history(&self, _pair: &TradingPair, _limit: u32) -> TraderResult<Vec<Candle>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_sort_candles() {
        let mut candles = vec![
            candle(300, 1.0, 1.0, 1.0, 1.0),
            candle(100, 1.0, 1.0, 1.0, 1.0),
            candle(200, 1.0, 1.0, 1.0, 1.0),
        ];
        sort_candles(&mut candles);
        let times: Vec<i64> = candles.iter().map(|c| c.time).collect();
        assert_eq!(times, vec![100, 200, 300]);
    }

    #[test]
    fn test_stats_use_trailing_window() {
        let mut candles: Vec<Candle> = (0..30)
            .map(|i| {
                let p = 100.0 + i as f64;
                candle(i, p, p + 1.0, p - 1.0, p + 0.5)
            })
            .collect();
        // Outside the 24-period window, must not affect high/low
        candles[0].high = 1_000.0;
        candles[0].low = 1.0;

        let stats = SymbolStats::compute(&candles, 24).unwrap();
        assert_eq!(stats.last, 129.5);
        assert_eq!(stats.high, 130.0);
        assert_eq!(stats.low, 105.0);
        assert_eq!(stats.delta, 129.5 - 106.0);
        assert!((stats.delta_pct - (23.5 / 106.0 * 100.0)).abs() < 1e-9);
    }

    #[test]
    fn test_stats_short_history() {
        let candles = vec![candle(1, 10.0, 12.0, 9.0, 11.0)];
        let stats = SymbolStats::compute(&candles, 24).unwrap();
        assert_eq!(stats.high, 12.0);
        assert_eq!(stats.low, 9.0);
        assert_eq!(stats.delta, 1.0);
        assert!(SymbolStats::compute(&[], 24).is_none());
    }

    #[tokio::test]
    async fn test_offline_cycle_is_skipped() {
        let settings = PollerSettings {
            pairs: vec!["btcusd".parse().unwrap()],
            interval: Duration::from_secs(15),
            history_limit: 10,
            stats_window: 24,
        };
        let poller = MarketDataPoller::new(Arc::new(Unreachable), Arc::new(Offline), settings);
        let receiver = poller.subscribe();

        assert_eq!(poller.poll_once().await, CycleOutcome::Offline);
        assert_eq!(poller.status(), PollerStatus::Offline);
        assert!(receiver.latest().is_none());
    }

    #[tokio::test]
    async fn test_non_retryable_failure_degrades_without_publishing() {
        let settings = PollerSettings {
            pairs: vec!["btcusd".parse().unwrap()],
            interval: Duration::from_secs(15),
            history_limit: 10,
            stats_window: 24,
        };
        let poller = MarketDataPoller::new(Arc::new(Misconfigured), Arc::new(Online), settings);
        let receiver = poller.subscribe();

        assert!(!TraderError::Internal(String::new()).is_retryable());
        assert!(matches!(poller.poll_once().await, CycleOutcome::Failed(_)));
        assert!(matches!(poller.status(), PollerStatus::Degraded(reason) if reason.contains("HTTP client")));
        assert!(receiver.latest().is_none());
    }
}
