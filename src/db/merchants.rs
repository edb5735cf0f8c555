//! Merchant upserts, unique per (exchange, merchant_id)

use super::ts;
use crate::domain::Merchant;
use crate::error::Result;
use rusqlite::{params, Connection};

pub fn save_merchant(conn: &Connection, merchant: &Merchant) -> Result<()> {
    conn.execute(
        "INSERT INTO merchants (exchange, merchant_id, nick_name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(exchange, merchant_id)
         DO UPDATE SET nick_name = excluded.nick_name,
                       updated_at = excluded.updated_at",
        params![
            merchant.exchange,
            merchant.merchant_id,
            merchant.nick_name,
            ts(merchant.created_at),
            ts(merchant.updated_at),
        ],
    )?;
    Ok(())
}
