//! Core domain types and the persistence contract

use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trade side from the viewpoint of the monitoring user.
///
/// `Buy` means the user buys crypto and wants the lowest fiat price;
/// `Sell` means the user sells and wants the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(AppError::Validation(format!("invalid side: {}", other))),
        }
    }
}

/// History granularity selecting the raw table or a time-bucketed aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Raw,
    Hour,
    Day,
}

impl Granularity {
    /// Truncate a timestamp to this granularity's bucket (UTC policy).
    pub fn bucket(&self, t: DateTime<Utc>) -> DateTime<Utc> {
        use chrono::{Datelike, TimeZone, Timelike};
        match self {
            Granularity::Raw => t,
            Granularity::Hour => Utc
                .with_ymd_and_hms(t.year(), t.month(), t.day(), t.hour(), 0, 0)
                .unwrap(),
            Granularity::Day => Utc
                .with_ymd_and_hms(t.year(), t.month(), t.day(), 0, 0, 0)
                .unwrap(),
        }
    }
}

/// A single C2C price observation. Produced by exchange adapters,
/// written once, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub exchange: String,
    pub symbol: String,
    pub fiat: String,
    pub side: Side,
    /// Fiat-unit amount tier this observation was probed at; 0 = no filter.
    pub target_amount: f64,
    /// 1 = best price in the probe result set.
    pub rank: i64,
    pub price: f64,
    /// Merchant nickname.
    pub merchant: String,
    pub merchant_id: String,
    pub pay_methods: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub available_amount: f64,
}

/// A crypto merchant/advertiser, unique per (exchange, merchant_id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Merchant {
    pub id: i64,
    pub exchange: String,
    pub merchant_id: String,
    pub nick_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One FX reference observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForexRate {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    /// Adapter origin label, persisted verbatim.
    pub source: String,
    /// e.g. "USDCNY"
    pub pair: String,
    pub rate: f64,
}

/// Durable record of a currently-triggered alert track,
/// keyed by (exchange, side, target_amount).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertState {
    pub id: i64,
    pub exchange: String,
    pub side: Side,
    pub target_amount: f64,
    /// Lowest (BUY) price that has been alerted on for this key.
    pub trigger_price: f64,
    pub last_alert_at: DateTime<Utc>,
}

/// Health of a probed data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceHealth {
    Pending,
    #[serde(rename = "OK")]
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub status: ServiceHealth,
    pub message: String,
    pub last_check: DateTime<Utc>,
}

impl ServiceStatus {
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: ServiceHealth::Pending,
            message: String::new(),
            last_check: Utc::now(),
        }
    }
}

/// Query parameters for price history.
#[derive(Debug, Clone, Default)]
pub struct PriceFilter {
    pub exchange: Option<String>,
    pub symbol: Option<String>,
    pub fiat: Option<String>,
    pub side: Option<Side>,
    pub target_amount: Option<f64>,
    pub rank: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Persistence contract. The engine only ever talks to storage through
/// this trait; the SQLite implementation lives in `crate::db`.
pub trait Repository: Send + Sync {
    /// Insert raw rows and upsert the hourly/daily aggregates in one
    /// transaction. An empty slice is a no-op.
    fn save_price_points(&self, points: &[PricePoint]) -> Result<()>;

    fn price_history(&self, filter: &PriceFilter, granularity: Granularity)
        -> Result<Vec<PricePoint>>;

    fn save_merchant(&self, merchant: &Merchant) -> Result<()>;

    /// Insert the raw rate and upsert hourly/daily buckets (latest wins).
    fn save_forex_rate(&self, rate: &ForexRate) -> Result<()>;

    fn latest_forex_rate(&self, pair: &str) -> Result<Option<ForexRate>>;

    fn forex_history(
        &self,
        pair: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        granularity: Granularity,
    ) -> Result<Vec<ForexRate>>;

    fn upsert_alert_state(&self, state: &AlertState) -> Result<()>;

    fn delete_alert_state(&self, exchange: &str, side: Side, amount: f64) -> Result<()>;

    fn load_alert_states(&self) -> Result<Vec<AlertState>>;
}
