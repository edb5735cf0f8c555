//! External data-source adapters
//!
//! Exchanges, the FX reference source, and the notification channel are
//! plain values behind small capability traits, registered by name at
//! bootstrap.

pub mod binance;
pub mod forex;
pub mod okx;
pub mod telegram;

use crate::domain::{PricePoint, Side};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A C2C market data source.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Display name, e.g. "Binance". Also the registry key.
    fn name(&self) -> &'static str;

    /// Top advertisements for `(symbol, fiat, side, amount)`, best price
    /// first (ascending for BUY, descending for SELL), `rank` 1-based.
    /// `amount == 0` disables the per-order window filter.
    async fn top_prices(
        &self,
        symbol: &str,
        fiat: &str,
        side: Side,
        amount: f64,
    ) -> Result<Vec<PricePoint>>;
}

/// An FX reference-rate source.
#[async_trait]
pub trait Forex: Send + Sync {
    /// Origin label persisted with every rate, e.g. "OpenER".
    fn source(&self) -> &'static str;

    /// Current rate for one unit of `from` in `to`. Non-zero on success.
    async fn rate(&self, from: &str, to: &str) -> Result<f64>;
}

/// Fire-and-forget notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Registry of exchange adapters, keyed by display name.
pub struct ExchangeRegistry {
    exchanges: HashMap<String, Arc<dyn Exchange>>,
}

impl ExchangeRegistry {
    /// Create a registry with all supported exchanges.
    pub fn new() -> Self {
        let mut registry = Self {
            exchanges: HashMap::new(),
        };
        registry.register(Arc::new(binance::BinanceExchange::new()));
        registry.register(Arc::new(okx::OkxExchange::new()));
        registry
    }

    /// Create an empty registry; used to wire in test doubles.
    pub fn empty() -> Self {
        Self {
            exchanges: HashMap::new(),
        }
    }

    pub fn register(&mut self, exchange: Arc<dyn Exchange>) {
        self.exchanges
            .insert(exchange.name().to_string(), exchange);
    }

    /// Look up an exchange by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Exchange>> {
        self.exchanges
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Registered display names.
    pub fn names(&self) -> Vec<String> {
        self.exchanges.keys().cloned().collect()
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
