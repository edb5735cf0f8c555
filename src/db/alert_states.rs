//! Durable alert-track state, keyed by (exchange, side, target_amount)

use super::{parse_side, parse_ts, ts};
use crate::domain::{AlertState, Side};
use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

pub fn upsert_alert_state(conn: &Connection, state: &AlertState) -> Result<()> {
    let now = ts(Utc::now());
    conn.execute(
        "INSERT INTO alert_states
            (exchange, side, target_amount, trigger_price, last_alert_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
         ON CONFLICT(exchange, side, target_amount)
         DO UPDATE SET trigger_price = excluded.trigger_price,
                       last_alert_at = excluded.last_alert_at,
                       updated_at = excluded.updated_at",
        params![
            state.exchange,
            state.side.as_str(),
            state.target_amount,
            state.trigger_price,
            ts(state.last_alert_at),
            now,
        ],
    )?;
    Ok(())
}

pub fn delete_alert_state(conn: &Connection, exchange: &str, side: Side, amount: f64) -> Result<()> {
    conn.execute(
        "DELETE FROM alert_states WHERE exchange = ?1 AND side = ?2 AND target_amount = ?3",
        params![exchange, side.as_str(), amount],
    )?;
    Ok(())
}

pub fn load_alert_states(conn: &Connection) -> Result<Vec<AlertState>> {
    let mut stmt = conn.prepare(
        "SELECT id, exchange, side, target_amount, trigger_price, last_alert_at
         FROM alert_states",
    )?;

    let states = stmt
        .query_map([], |row| {
            Ok(AlertState {
                id: row.get(0)?,
                exchange: row.get(1)?,
                side: parse_side(2, row.get(2)?)?,
                target_amount: row.get(3)?,
                trigger_price: row.get(4)?,
                last_alert_at: parse_ts(5, row.get(5)?)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(states)
}
