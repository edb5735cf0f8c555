//! SQLite persistence layer

mod alert_states;
mod forex;
mod merchants;
pub mod migrations;
mod prices;

use crate::domain::{
    AlertState, ForexRate, Granularity, Merchant, PriceFilter, PricePoint, Repository, Side,
};
use crate::error::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open (or create) the database file and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL for concurrent API reads while the probe loop writes.
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }
}

impl Repository for SqliteDb {
    fn save_price_points(&self, points: &[PricePoint]) -> Result<()> {
        let mut conn = self.conn.lock();
        prices::save_price_points(&mut conn, points)
    }

    fn price_history(
        &self,
        filter: &PriceFilter,
        granularity: Granularity,
    ) -> Result<Vec<PricePoint>> {
        let conn = self.conn.lock();
        prices::price_history(&conn, filter, granularity)
    }

    fn save_merchant(&self, merchant: &Merchant) -> Result<()> {
        let conn = self.conn.lock();
        merchants::save_merchant(&conn, merchant)
    }

    fn save_forex_rate(&self, rate: &ForexRate) -> Result<()> {
        let mut conn = self.conn.lock();
        forex::save_forex_rate(&mut conn, rate)
    }

    fn latest_forex_rate(&self, pair: &str) -> Result<Option<ForexRate>> {
        let conn = self.conn.lock();
        forex::latest_forex_rate(&conn, pair)
    }

    fn forex_history(
        &self,
        pair: &str,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        granularity: Granularity,
    ) -> Result<Vec<ForexRate>> {
        let conn = self.conn.lock();
        forex::forex_history(&conn, pair, start, end, granularity)
    }

    fn upsert_alert_state(&self, state: &AlertState) -> Result<()> {
        let conn = self.conn.lock();
        alert_states::upsert_alert_state(&conn, state)
    }

    fn delete_alert_state(&self, exchange: &str, side: Side, amount: f64) -> Result<()> {
        let conn = self.conn.lock();
        alert_states::delete_alert_state(&conn, exchange, side, amount)
    }

    fn load_alert_states(&self) -> Result<Vec<AlertState>> {
        let conn = self.conn.lock();
        alert_states::load_alert_states(&conn)
    }
}

/// Encode a timestamp as the canonical TEXT column value.
/// All times are UTC; the fixed format keeps lexicographic order == time order.
pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn parse_side(idx: usize, raw: String) -> rusqlite::Result<Side> {
    raw.parse::<Side>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
