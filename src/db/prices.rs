//! C2C price persistence: raw rows plus hourly/daily aggregates

use super::{parse_side, parse_ts, ts};
use crate::domain::{Granularity, PriceFilter, PricePoint, Side};
use crate::error::Result;
use chrono::Utc;
use rusqlite::{params, Connection, ToSql, Transaction};

/// Write one probe result set atomically: every raw row, then the
/// hourly and daily bucket upserts. Rolls back as a whole on failure.
pub fn save_price_points(conn: &mut Connection, points: &[PricePoint]) -> Result<()> {
    if points.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;

    for p in points {
        tx.execute(
            "INSERT INTO c2c_prices
                (created_at, exchange, symbol, fiat, side, target_amount, rank, price,
                 merchant_id, pay_methods, min_amount, max_amount, available_amount)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                ts(p.created_at),
                p.exchange,
                p.symbol,
                p.fiat,
                p.side.as_str(),
                p.target_amount,
                p.rank,
                p.price,
                p.merchant_id,
                p.pay_methods,
                p.min_amount,
                p.max_amount,
                p.available_amount,
            ],
        )?;
    }

    for p in points {
        upsert_aggregate(&tx, p, Granularity::Hour)?;
        upsert_aggregate(&tx, p, Granularity::Day)?;
    }

    tx.commit()?;
    Ok(())
}

fn aggregate_table(granularity: Granularity) -> Option<&'static str> {
    match granularity {
        Granularity::Hour => Some("c2c_prices_hourly"),
        Granularity::Day => Some("c2c_prices_daily"),
        Granularity::Raw => None,
    }
}

fn upsert_aggregate(tx: &Transaction, p: &PricePoint, granularity: Granularity) -> Result<()> {
    let Some(table) = aggregate_table(granularity) else {
        return Ok(());
    };
    // The bucket keeps the better price for the side: lowest for BUY,
    // highest for SELL.
    let better = match p.side {
        Side::Buy => "MIN",
        Side::Sell => "MAX",
    };
    let bucket = granularity.bucket(p.created_at);
    let sql = format!(
        "INSERT INTO {table}
            (bucket_time, exchange, symbol, fiat, side, target_amount, rank, price,
             created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
         ON CONFLICT(bucket_time, exchange, symbol, fiat, side, target_amount, rank)
         DO UPDATE SET price = {better}(price, excluded.price),
                       updated_at = excluded.updated_at"
    );
    tx.execute(
        &sql,
        params![
            ts(bucket),
            p.exchange,
            p.symbol,
            p.fiat,
            p.side.as_str(),
            p.target_amount,
            p.rank,
            p.price,
            ts(Utc::now()),
        ],
    )?;
    Ok(())
}

/// Query price history from the table matching `granularity`.
/// Raw rows join the merchants table to resolve nicknames; aggregate rows
/// carry only the bucket key and price.
pub fn price_history(
    conn: &Connection,
    filter: &PriceFilter,
    granularity: Granularity,
) -> Result<Vec<PricePoint>> {
    match aggregate_table(granularity) {
        None => raw_history(conn, filter),
        Some(table) => aggregate_history(conn, filter, table),
    }
}

fn push_common_filters(
    filter: &PriceFilter,
    prefix: &str,
    time_col: &str,
    clauses: &mut Vec<String>,
    params_vec: &mut Vec<Box<dyn ToSql>>,
) {
    if let Some(ref exchange) = filter.exchange {
        clauses.push(format!("{prefix}exchange = ?"));
        params_vec.push(Box::new(exchange.clone()));
    }
    if let Some(ref symbol) = filter.symbol {
        clauses.push(format!("{prefix}symbol = ?"));
        params_vec.push(Box::new(symbol.clone()));
    }
    if let Some(ref fiat) = filter.fiat {
        clauses.push(format!("{prefix}fiat = ?"));
        params_vec.push(Box::new(fiat.clone()));
    }
    if let Some(side) = filter.side {
        clauses.push(format!("{prefix}side = ?"));
        params_vec.push(Box::new(side.as_str()));
    }
    if let Some(amount) = filter.target_amount {
        clauses.push(format!("{prefix}target_amount = ?"));
        params_vec.push(Box::new(amount));
    }
    if let Some(rank) = filter.rank {
        clauses.push(format!("{prefix}rank = ?"));
        params_vec.push(Box::new(rank));
    }
    if let Some(start) = filter.start {
        clauses.push(format!("{prefix}{time_col} >= ?"));
        params_vec.push(Box::new(ts(start)));
    }
    if let Some(end) = filter.end {
        clauses.push(format!("{prefix}{time_col} <= ?"));
        params_vec.push(Box::new(ts(end)));
    }
}

fn raw_history(conn: &Connection, filter: &PriceFilter) -> Result<Vec<PricePoint>> {
    let mut sql = String::from(
        "SELECT p.id, p.created_at, p.exchange, p.symbol, p.fiat, p.side,
                p.target_amount, p.rank, p.price, p.merchant_id, p.pay_methods,
                p.min_amount, p.max_amount, p.available_amount,
                COALESCE(m.nick_name, '')
         FROM c2c_prices p
         LEFT JOIN merchants m
             ON p.merchant_id = m.merchant_id AND p.exchange = m.exchange",
    );

    let mut clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
    push_common_filters(filter, "p.", "created_at", &mut clauses, &mut params_vec);

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY p.created_at ASC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(PricePoint {
                id: row.get(0)?,
                created_at: parse_ts(1, row.get(1)?)?,
                exchange: row.get(2)?,
                symbol: row.get(3)?,
                fiat: row.get(4)?,
                side: parse_side(5, row.get(5)?)?,
                target_amount: row.get(6)?,
                rank: row.get(7)?,
                price: row.get(8)?,
                merchant_id: row.get(9)?,
                pay_methods: row.get(10)?,
                min_amount: row.get(11)?,
                max_amount: row.get(12)?,
                available_amount: row.get(13)?,
                merchant: row.get(14)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn aggregate_history(
    conn: &Connection,
    filter: &PriceFilter,
    table: &str,
) -> Result<Vec<PricePoint>> {
    let mut sql = format!(
        "SELECT id, bucket_time, exchange, symbol, fiat, side, target_amount, rank, price
         FROM {table}"
    );

    let mut clauses: Vec<String> = Vec::new();
    let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();
    push_common_filters(filter, "", "bucket_time", &mut clauses, &mut params_vec);

    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY bucket_time ASC");
    if let Some(limit) = filter.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let param_refs: Vec<&dyn ToSql> = params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt
        .query_map(param_refs.as_slice(), |row| {
            Ok(PricePoint {
                id: row.get(0)?,
                created_at: parse_ts(1, row.get(1)?)?,
                exchange: row.get(2)?,
                symbol: row.get(3)?,
                fiat: row.get(4)?,
                side: parse_side(5, row.get(5)?)?,
                target_amount: row.get(6)?,
                rank: row.get(7)?,
                price: row.get(8)?,
                merchant: String::new(),
                merchant_id: String::new(),
                pay_methods: String::new(),
                min_amount: 0.0,
                max_amount: 0.0,
                available_amount: 0.0,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}
