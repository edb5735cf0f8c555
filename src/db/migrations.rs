//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_c2c_prices", CREATE_C2C_PRICES_TABLE)?;
    run_migration(conn, "002_c2c_price_aggregates", CREATE_C2C_AGGREGATE_TABLES)?;
    run_migration(conn, "003_forex_rates", CREATE_FOREX_RATES_TABLE)?;
    run_migration(conn, "004_forex_rate_aggregates", CREATE_FOREX_AGGREGATE_TABLES)?;
    run_migration(conn, "005_merchants", CREATE_MERCHANTS_TABLE)?;
    run_migration(conn, "006_alert_states", CREATE_ALERT_STATES_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_C2C_PRICES_TABLE: &str = r#"
CREATE TABLE c2c_prices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    fiat TEXT NOT NULL,
    side TEXT NOT NULL,
    target_amount REAL NOT NULL DEFAULT 0,
    rank INTEGER NOT NULL DEFAULT 1,
    price REAL NOT NULL,
    merchant_id TEXT NOT NULL DEFAULT '',
    pay_methods TEXT NOT NULL DEFAULT '',
    min_amount REAL NOT NULL DEFAULT 0,
    max_amount REAL NOT NULL DEFAULT 0,
    available_amount REAL NOT NULL DEFAULT 0
);
CREATE INDEX idx_c2c_prices_query
    ON c2c_prices(exchange, side, target_amount, rank, created_at);
CREATE INDEX idx_c2c_prices_merchant ON c2c_prices(merchant_id);
"#;

const CREATE_C2C_AGGREGATE_TABLES: &str = r#"
CREATE TABLE c2c_prices_hourly (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_time TEXT NOT NULL,
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    fiat TEXT NOT NULL,
    side TEXT NOT NULL,
    target_amount REAL NOT NULL DEFAULT 0,
    rank INTEGER NOT NULL DEFAULT 1,
    price REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(bucket_time, exchange, symbol, fiat, side, target_amount, rank)
);
CREATE INDEX idx_c2c_hourly_time ON c2c_prices_hourly(bucket_time);

CREATE TABLE c2c_prices_daily (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_time TEXT NOT NULL,
    exchange TEXT NOT NULL,
    symbol TEXT NOT NULL,
    fiat TEXT NOT NULL,
    side TEXT NOT NULL,
    target_amount REAL NOT NULL DEFAULT 0,
    rank INTEGER NOT NULL DEFAULT 1,
    price REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(bucket_time, exchange, symbol, fiat, side, target_amount, rank)
);
CREATE INDEX idx_c2c_daily_time ON c2c_prices_daily(bucket_time);
"#;

const CREATE_FOREX_RATES_TABLE: &str = r#"
CREATE TABLE forex_rates (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    created_at TEXT NOT NULL,
    source TEXT NOT NULL,
    pair TEXT NOT NULL,
    rate REAL NOT NULL
);
CREATE INDEX idx_forex_rates_pair_time ON forex_rates(pair, created_at);
"#;

const CREATE_FOREX_AGGREGATE_TABLES: &str = r#"
CREATE TABLE forex_rates_hourly (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_time TEXT NOT NULL,
    pair TEXT NOT NULL,
    source TEXT NOT NULL,
    rate REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(bucket_time, pair)
);
CREATE INDEX idx_forex_hourly_time ON forex_rates_hourly(bucket_time);

CREATE TABLE forex_rates_daily (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    bucket_time TEXT NOT NULL,
    pair TEXT NOT NULL,
    source TEXT NOT NULL,
    rate REAL NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(bucket_time, pair)
);
CREATE INDEX idx_forex_daily_time ON forex_rates_daily(bucket_time);
"#;

const CREATE_MERCHANTS_TABLE: &str = r#"
CREATE TABLE merchants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange TEXT NOT NULL,
    merchant_id TEXT NOT NULL,
    nick_name TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(exchange, merchant_id)
);
"#;

const CREATE_ALERT_STATES_TABLE: &str = r#"
CREATE TABLE alert_states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    exchange TEXT NOT NULL,
    side TEXT NOT NULL,
    target_amount REAL NOT NULL DEFAULT 0,
    trigger_price REAL NOT NULL,
    last_alert_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(exchange, side, target_amount)
);
"#;
