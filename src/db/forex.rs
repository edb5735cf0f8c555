//! FX rate persistence: raw observations plus latest-wins buckets

use super::{parse_ts, ts};
use crate::domain::{ForexRate, Granularity};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ToSql, Transaction};

pub fn save_forex_rate(conn: &mut Connection, rate: &ForexRate) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO forex_rates (created_at, source, pair, rate) VALUES (?1, ?2, ?3, ?4)",
        params![ts(rate.created_at), rate.source, rate.pair, rate.rate],
    )?;

    upsert_aggregate(&tx, rate, Granularity::Hour)?;
    upsert_aggregate(&tx, rate, Granularity::Day)?;

    tx.commit()?;
    Ok(())
}

fn aggregate_table(granularity: Granularity) -> Option<&'static str> {
    match granularity {
        Granularity::Hour => Some("forex_rates_hourly"),
        Granularity::Day => Some("forex_rates_daily"),
        Granularity::Raw => None,
    }
}

fn upsert_aggregate(tx: &Transaction, rate: &ForexRate, granularity: Granularity) -> Result<()> {
    let Some(table) = aggregate_table(granularity) else {
        return Ok(());
    };
    let bucket = granularity.bucket(rate.created_at);
    // Latest observation in the bucket wins.
    let sql = format!(
        "INSERT INTO {table} (bucket_time, pair, source, rate, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(bucket_time, pair)
         DO UPDATE SET source = excluded.source,
                       rate = excluded.rate,
                       updated_at = excluded.updated_at"
    );
    tx.execute(
        &sql,
        params![ts(bucket), rate.pair, rate.source, rate.rate, ts(Utc::now())],
    )?;
    Ok(())
}

pub fn latest_forex_rate(conn: &Connection, pair: &str) -> Result<Option<ForexRate>> {
    let result = conn.query_row(
        "SELECT id, created_at, source, pair, rate FROM forex_rates
         WHERE pair = ?1 ORDER BY created_at DESC LIMIT 1",
        params![pair],
        |row| {
            Ok(ForexRate {
                id: row.get(0)?,
                created_at: parse_ts(1, row.get(1)?)?,
                source: row.get(2)?,
                pair: row.get(3)?,
                rate: row.get(4)?,
            })
        },
    );

    match result {
        Ok(rate) => Ok(Some(rate)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn forex_history(
    conn: &Connection,
    pair: &str,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    granularity: Granularity,
) -> Result<Vec<ForexRate>> {
    let (table, time_col) = match aggregate_table(granularity) {
        Some(table) => (table, "bucket_time"),
        None => ("forex_rates", "created_at"),
    };

    let mut sql = format!("SELECT id, {time_col}, source, pair, rate FROM {table} WHERE pair = ?");
    let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(pair.to_string())];

    if let Some(start) = start {
        sql.push_str(&format!(" AND {time_col} >= ?"));
        params_vec.push(Box::new(ts(start)));
    }
    if let Some(end) = end {
        sql.push_str(&format!(" AND {time_col} <= ?"));
        params_vec.push(Box::new(ts(end)));
    }
    sql.push_str(&format!(" ORDER BY {time_col} ASC"));

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(ForexRate {
                id: row.get(0)?,
                created_at: parse_ts(1, row.get(1)?)?,
                source: row.get(2)?,
                pair: row.get(3)?,
                rate: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use crate::domain::Repository;
    use chrono::TimeZone;

    fn rate(rate_value: f64, minute: u32) -> ForexRate {
        ForexRate {
            id: 0,
            created_at: Utc.with_ymd_and_hms(2024, 5, 17, 14, minute, 0).unwrap(),
            source: "OpenER".to_string(),
            pair: "USDCNY".to_string(),
            rate: rate_value,
        }
    }

    #[test]
    fn latest_is_none_when_empty() {
        let db = SqliteDb::open_in_memory().unwrap();
        assert!(db.latest_forex_rate("USDCNY").unwrap().is_none());
    }

    #[test]
    fn latest_returns_most_recent_observation() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.save_forex_rate(&rate(7.20, 5)).unwrap();
        db.save_forex_rate(&rate(7.25, 30)).unwrap();

        let latest = db.latest_forex_rate("USDCNY").unwrap().unwrap();
        assert_eq!(latest.rate, 7.25);
        assert_eq!(latest.source, "OpenER");
    }

    #[test]
    fn hourly_bucket_is_latest_wins() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.save_forex_rate(&rate(7.20, 5)).unwrap();
        db.save_forex_rate(&rate(7.10, 30)).unwrap();

        let hourly = db
            .forex_history("USDCNY", None, None, Granularity::Hour)
            .unwrap();
        assert_eq!(hourly.len(), 1);
        assert_eq!(hourly[0].rate, 7.10);

        let raw = db
            .forex_history("USDCNY", None, None, Granularity::Raw)
            .unwrap();
        assert_eq!(raw.len(), 2);
    }

    #[test]
    fn history_respects_time_window() {
        let db = SqliteDb::open_in_memory().unwrap();
        db.save_forex_rate(&rate(7.20, 5)).unwrap();
        db.save_forex_rate(&rate(7.25, 40)).unwrap();

        let rows = db
            .forex_history(
                "USDCNY",
                Some(Utc.with_ymd_and_hms(2024, 5, 17, 14, 20, 0).unwrap()),
                None,
                Granularity::Raw,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].rate, 7.25);
    }
}
