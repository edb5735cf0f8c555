//! Monitoring engine
//!
//! Drives the periodic FX refresh and the jittered C2C probe loop,
//! delegating fan-out to `executor`, per-job retries to `retry`, source
//! health to `health` and threshold evaluation to `alerts`. Everything is
//! bound to one shutdown token.

pub mod alerts;
pub mod executor;
pub mod health;
pub mod retry;

use crate::domain::ForexRate;
use crate::state::AppState;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Health-tracker source name for the FX adapter.
const FOREX_SOURCE: &str = "Forex";

/// The monitoring engine. `run` returns once the shutdown token fires.
pub struct Monitor {
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
}

impl Monitor {
    pub fn new(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> Self {
        Self { state, shutdown }
    }

    pub async fn run(mut self) {
        info!("monitor service started");

        match alerts::load_persisted(&self.state) {
            Ok(0) => {}
            Ok(n) => info!("restored {} persisted alert tracks", n),
            Err(e) => error!("Failed to load persisted alert states: {}", e),
        }

        // FX fires once immediately, before the first probe can run.
        refresh_forex(&self.state, &mut self.shutdown).await;

        let c2c = tokio::spawn(run_c2c_loop(self.state.clone(), self.shutdown.clone()));

        loop {
            let period = forex_period(self.state.monitor_config().forex_interval_hours);
            tokio::select! {
                _ = tokio::time::sleep(period) => {}
                _ = cancelled(&mut self.shutdown) => break,
            }
            refresh_forex(&self.state, &mut self.shutdown).await;
        }

        info!("monitor service stopping");
        let _ = c2c.await;
    }
}

async fn run_c2c_loop(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    // First check runs immediately on start.
    executor::run_cycle(state.clone(), shutdown.clone()).await;

    loop {
        let delay = next_c2c_delay(state.monitor_config().c2c_interval_minutes);
        debug!("next C2C check in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancelled(&mut shutdown) => return,
        }
        executor::run_cycle(state.clone(), shutdown.clone()).await;
    }
}

/// Base period plus uniform jitter in [0, 60) seconds, resampled every
/// iteration. Non-positive configured minutes fall back to 3.
fn next_c2c_delay(base_minutes: i64) -> Duration {
    let base = if base_minutes <= 0 { 3 } else { base_minutes };
    let jitter: u64 = rand::thread_rng().gen_range(0..60);
    Duration::from_secs(base as u64 * 60 + jitter)
}

/// Non-positive configured hours fall back to 1.
fn forex_period(hours: i64) -> Duration {
    let hours = if hours <= 0 { 1 } else { hours };
    Duration::from_secs(hours as u64 * 3600)
}

/// Refresh the FX reference rate. On success the rate is cached in memory
/// and persisted; on failure the most recent persisted rate stands in.
/// Either way the outcome is routed to the health tracker.
pub(crate) async fn refresh_forex(state: &Arc<AppState>, shutdown: &mut watch::Receiver<bool>) {
    let cfg = state.monitor_config();
    let pair = cfg.forex_pair();

    let result = tokio::select! {
        r = state.forex.rate("USD", &cfg.fiat) => r,
        _ = cancelled(shutdown) => return,
    };

    match result {
        Ok(rate) => {
            health::update(state, FOREX_SOURCE, None);
            state.set_last_forex(rate);
            info!("updated forex rate {}: {:.4}", pair, rate);

            let record = ForexRate {
                id: 0,
                created_at: Utc::now(),
                source: state.forex.source().to_string(),
                pair,
                rate,
            };
            if let Err(e) = state.repo.save_forex_rate(&record) {
                error!("Failed to save forex rate: {}", e);
            }
        }
        Err(e) => {
            error!("Failed to fetch forex rate: {}", e);
            health::update(state, FOREX_SOURCE, Some(&e));

            match state.repo.latest_forex_rate(&pair) {
                Ok(Some(latest)) => {
                    state.set_last_forex(latest.rate);
                    info!("using cached forex rate from storage: {:.4}", latest.rate);
                }
                Ok(None) => {}
                Err(db_err) => error!("Failed to load cached forex rate: {}", db_err),
            }
        }
    }
}

/// Resolves when the shutdown token fires (or its sender is gone).
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::adapters::{Exchange, ExchangeRegistry, Forex, Notifier};
    use crate::config::MonitorConfig;
    use crate::db::SqliteDb;
    use crate::domain::{PricePoint, Side};
    use crate::error::{AppError, Result};
    use crate::state::AppState;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Let spawned fire-and-forget tasks (notifications) run to completion.
    pub async fn drain_tasks() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, subject: &str, body: &str) -> Result<()> {
            self.sent.lock().push((subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    /// Forex stub: positive values succeed, zero fails.
    pub struct StaticForex(pub f64);

    #[async_trait]
    impl Forex for StaticForex {
        fn source(&self) -> &'static str {
            "Static"
        }

        async fn rate(&self, _from: &str, _to: &str) -> Result<f64> {
            if self.0 > 0.0 {
                Ok(self.0)
            } else {
                Err(AppError::Adapter("forex unreachable".to_string()))
            }
        }
    }

    enum MockMode {
        Price(f64),
        AlwaysFail,
        FailTimes(usize, f64),
        FailAmount(f64, f64),
    }

    pub struct MockExchange {
        name: &'static str,
        mode: MockMode,
        delay: Duration,
        pub calls: AtomicUsize,
        concurrent: AtomicUsize,
        pub max_concurrent: AtomicUsize,
    }

    impl MockExchange {
        fn new(name: &'static str, mode: MockMode, delay: Duration) -> Self {
            Self {
                name,
                mode,
                delay,
                calls: AtomicUsize::new(0),
                concurrent: AtomicUsize::new(0),
                max_concurrent: AtomicUsize::new(0),
            }
        }

        pub fn returning_price(name: &'static str, price: f64) -> Self {
            Self::new(name, MockMode::Price(price), Duration::ZERO)
        }

        pub fn slow_returning(name: &'static str, price: f64) -> Self {
            Self::new(name, MockMode::Price(price), Duration::from_millis(50))
        }

        pub fn always_failing(name: &'static str) -> Self {
            Self::new(name, MockMode::AlwaysFail, Duration::ZERO)
        }

        pub fn failing_times(name: &'static str, failures: usize, price: f64) -> Self {
            Self::new(name, MockMode::FailTimes(failures, price), Duration::ZERO)
        }

        pub fn failing_for_amount(name: &'static str, amount: f64, price: f64) -> Self {
            Self::new(name, MockMode::FailAmount(amount, price), Duration::ZERO)
        }

        fn point(&self, symbol: &str, fiat: &str, side: Side, amount: f64, price: f64) -> PricePoint {
            PricePoint {
                id: 0,
                created_at: Utc::now(),
                exchange: self.name.to_string(),
                symbol: symbol.to_string(),
                fiat: fiat.to_string(),
                side,
                target_amount: amount,
                rank: 1,
                price,
                merchant: "mock merchant".to_string(),
                merchant_id: "m-1".to_string(),
                pay_methods: "Bank".to_string(),
                min_amount: 50.0,
                max_amount: 10_000.0,
                available_amount: 500.0,
            }
        }
    }

    #[async_trait]
    impl Exchange for MockExchange {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn top_prices(
            &self,
            symbol: &str,
            fiat: &str,
            side: Side,
            amount: f64,
        ) -> Result<Vec<PricePoint>> {
            let seq = self.calls.fetch_add(1, Ordering::SeqCst);
            let running = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_concurrent.fetch_max(running, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let result = match &self.mode {
                MockMode::Price(price) => Ok(vec![self.point(symbol, fiat, side, amount, *price)]),
                MockMode::AlwaysFail => {
                    Err(AppError::Adapter(format!("{} unreachable", self.name)))
                }
                MockMode::FailTimes(failures, price) => {
                    if seq < *failures {
                        Err(AppError::Adapter(format!("{} flaky", self.name)))
                    } else {
                        Ok(vec![self.point(symbol, fiat, side, amount, *price)])
                    }
                }
                MockMode::FailAmount(bad_amount, price) => {
                    if (amount - bad_amount).abs() < f64::EPSILON {
                        Err(AppError::Adapter(format!("{} tier unavailable", self.name)))
                    } else {
                        Ok(vec![self.point(symbol, fiat, side, amount, *price)])
                    }
                }
            };

            self.concurrent.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    pub struct MonitorConfigBuilder {
        cfg: MonitorConfig,
    }

    impl Default for MonitorConfigBuilder {
        fn default() -> Self {
            Self {
                cfg: MonitorConfig {
                    c2c_interval_minutes: 3,
                    forex_interval_hours: 1,
                    alert_threshold_percent: 2.0,
                    target_amounts: vec![100.0],
                    exchanges: vec!["Binance".to_string()],
                    symbol: "USDT".to_string(),
                    fiat: "CNY".to_string(),
                },
            }
        }
    }

    impl MonitorConfigBuilder {
        pub fn threshold(mut self, percent: f64) -> Self {
            self.cfg.alert_threshold_percent = percent;
            self
        }

        pub fn exchanges(mut self, names: &[&str]) -> Self {
            self.cfg.exchanges = names.iter().map(|n| n.to_string()).collect();
            self
        }

        pub fn amounts(mut self, amounts: &[f64]) -> Self {
            self.cfg.target_amounts = amounts.to_vec();
            self
        }

        pub fn build(self) -> MonitorConfig {
            self.cfg
        }
    }

    pub fn test_state(cfg: MonitorConfig, notifier: RecordingNotifier) -> Arc<AppState> {
        test_state_with_exchanges(cfg, notifier, Vec::new())
    }

    pub fn test_state_with_exchanges(
        cfg: MonitorConfig,
        notifier: RecordingNotifier,
        exchanges: Vec<Arc<MockExchange>>,
    ) -> Arc<AppState> {
        test_state_full(cfg, notifier, exchanges, StaticForex(7.2))
    }

    pub fn test_state_full(
        cfg: MonitorConfig,
        notifier: RecordingNotifier,
        exchanges: Vec<Arc<MockExchange>>,
        forex: StaticForex,
    ) -> Arc<AppState> {
        let repo = Arc::new(SqliteDb::open_in_memory().expect("in-memory db"));
        let mut registry = ExchangeRegistry::empty();
        for exchange in exchanges {
            registry.register(exchange);
        }
        Arc::new(AppState::new(
            cfg,
            repo,
            registry,
            Arc::new(forex),
            Arc::new(notifier),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{
        drain_tasks, test_state_full, MonitorConfigBuilder, RecordingNotifier, StaticForex,
    };
    use super::*;
    use crate::domain::{Granularity, ServiceHealth};

    fn no_shutdown() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    #[test]
    fn c2c_delay_clamps_non_positive_base() {
        for _ in 0..20 {
            let delay = next_c2c_delay(0);
            assert!(delay >= Duration::from_secs(180));
            assert!(delay < Duration::from_secs(240));
        }
    }

    #[test]
    fn c2c_delay_uses_configured_base() {
        let delay = next_c2c_delay(5);
        assert!(delay >= Duration::from_secs(300));
        assert!(delay < Duration::from_secs(360));
    }

    #[test]
    fn forex_period_clamps_non_positive_hours() {
        assert_eq!(forex_period(-2), Duration::from_secs(3600));
        assert_eq!(forex_period(0), Duration::from_secs(3600));
        assert_eq!(forex_period(6), Duration::from_secs(6 * 3600));
    }

    #[tokio::test]
    async fn forex_refresh_caches_and_persists() {
        let notifier = RecordingNotifier::new();
        let state = test_state_full(
            MonitorConfigBuilder::default().build(),
            notifier.clone(),
            Vec::new(),
            StaticForex(7.25),
        );
        let mut shutdown = no_shutdown();

        refresh_forex(&state, &mut shutdown).await;
        drain_tasks().await;

        assert_eq!(state.last_forex(), 7.25);
        let latest = state.repo.latest_forex_rate("USDCNY").unwrap().unwrap();
        assert_eq!(latest.rate, 7.25);
        assert_eq!(latest.source, "Static");

        let hourly = state
            .repo
            .forex_history("USDCNY", None, None, Granularity::Hour)
            .unwrap();
        assert_eq!(hourly.len(), 1);

        assert_eq!(state.service_statuses()["Forex"].status, ServiceHealth::Ok);
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn forex_failure_falls_back_to_persisted_rate() {
        let notifier = RecordingNotifier::new();
        let state = test_state_full(
            MonitorConfigBuilder::default().build(),
            notifier.clone(),
            Vec::new(),
            StaticForex(0.0),
        );
        state
            .repo
            .save_forex_rate(&ForexRate {
                id: 0,
                created_at: Utc::now(),
                source: "Static".to_string(),
                pair: "USDCNY".to_string(),
                rate: 7.11,
            })
            .unwrap();
        let mut shutdown = no_shutdown();

        refresh_forex(&state, &mut shutdown).await;
        drain_tasks().await;

        assert_eq!(state.last_forex(), 7.11);
        assert_eq!(
            state.service_statuses()["Forex"].status,
            ServiceHealth::Error
        );
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("Service Down: Forex"));
    }

    #[tokio::test]
    async fn forex_failure_without_cache_leaves_rate_unset() {
        let notifier = RecordingNotifier::new();
        let state = test_state_full(
            MonitorConfigBuilder::default().build(),
            notifier.clone(),
            Vec::new(),
            StaticForex(0.0),
        );
        let mut shutdown = no_shutdown();

        refresh_forex(&state, &mut shutdown).await;
        drain_tasks().await;

        assert_eq!(state.last_forex(), 0.0);
    }
}
