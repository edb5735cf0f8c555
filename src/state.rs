//! Shared application state

use crate::adapters::{ExchangeRegistry, Forex, Notifier};
use crate::config::MonitorConfig;
use crate::domain::{Repository, ServiceStatus};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Mutable engine maps, all guarded by one reader-writer lock.
///
/// `alert_cache[K]` is the timestamp of the most recent alert for K;
/// `triggered_low_prices[K]` mirrors the persisted `alert_states` row.
#[derive(Default)]
pub struct EngineState {
    pub alert_cache: HashMap<String, DateTime<Utc>>,
    pub triggered_low_prices: HashMap<String, f64>,
    pub service_status: HashMap<String, ServiceStatus>,
}

/// State shared between the monitor loops and the HTTP API.
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    pub exchanges: ExchangeRegistry,
    pub forex: Arc<dyn Forex>,
    pub notifier: Arc<dyn Notifier>,
    cfg: RwLock<MonitorConfig>,
    last_forex: RwLock<f64>,
    pub engine: RwLock<EngineState>,
}

impl AppState {
    pub fn new(
        cfg: MonitorConfig,
        repo: Arc<dyn Repository>,
        exchanges: ExchangeRegistry,
        forex: Arc<dyn Forex>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            repo,
            exchanges,
            forex,
            notifier,
            cfg: RwLock::new(cfg),
            last_forex: RwLock::new(0.0),
            engine: RwLock::new(EngineState::default()),
        }
    }

    /// Deep-copy snapshot of the monitor configuration. Probe cycles work
    /// off a snapshot so a concurrent update never tears a cycle.
    pub fn monitor_config(&self) -> MonitorConfig {
        self.cfg.read().clone()
    }

    /// Atomically replace the configuration; takes effect on the next tick.
    pub fn update_config(&self, new: MonitorConfig) {
        *self.cfg.write() = new;
    }

    pub fn last_forex(&self) -> f64 {
        *self.last_forex.read()
    }

    pub fn set_last_forex(&self, rate: f64) {
        *self.last_forex.write() = rate;
    }

    /// Snapshot of per-source health for the HTTP API.
    pub fn service_statuses(&self) -> HashMap<String, ServiceStatus> {
        self.engine.read().service_status.clone()
    }

    /// Snapshot of the currently tracked alert lows.
    pub fn triggered_lows(&self) -> HashMap<String, f64> {
        self.engine.read().triggered_low_prices.clone()
    }
}
