//! Binance P2P exchange adapter

use crate::adapters::Exchange;
use crate::domain::{PricePoint, Side};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SEARCH_URL: &str = "https://p2p.binance.com/bapi/c2c/v2/friendly/c2c/adv/search";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Binance P2P ad-search implementation
pub struct BinanceExchange {
    client: Client,
}

impl BinanceExchange {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl Default for BinanceExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    asset: &'a str,
    fiat: &'a str,
    trade_type: &'a str,
    #[serde(skip_serializing_if = "amount_unset")]
    trans_amount: f64,
    page: u32,
    rows: u32,
    pay_types: Vec<String>,
}

fn amount_unset(amount: &f64) -> bool {
    *amount <= 0.0
}

#[derive(Deserialize)]
struct SearchResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Vec<AdEntry>,
}

#[derive(Deserialize)]
struct AdEntry {
    adv: Adv,
    advertiser: Advertiser,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Adv {
    #[serde(default)]
    price: String,
    #[serde(default)]
    surplus_amount: String,
    #[serde(default)]
    min_single_trans_amount: String,
    #[serde(default)]
    max_single_trans_amount: String,
    #[serde(default)]
    trade_methods: Vec<TradeMethod>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeMethod {
    #[serde(default)]
    trade_method_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Advertiser {
    #[serde(default)]
    nick_name: String,
    #[serde(default)]
    user_no: String,
}

#[async_trait]
impl Exchange for BinanceExchange {
    fn name(&self) -> &'static str {
        "Binance"
    }

    async fn top_prices(
        &self,
        symbol: &str,
        fiat: &str,
        side: Side,
        amount: f64,
    ) -> Result<Vec<PricePoint>> {
        let payload = SearchRequest {
            asset: symbol,
            fiat,
            trade_type: side.as_str(),
            trans_amount: amount,
            page: 1,
            rows: 1,
            pay_types: Vec::new(),
        };

        let response = self
            .client
            .post(SEARCH_URL)
            .header("User-Agent", USER_AGENT)
            .header("Clienttype", "web")
            .header("Lang", "zh-CN")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Adapter(format!(
                "binance api returned status: {}",
                response.status()
            )));
        }

        let body: SearchResponse = response.json().await?;
        if body.code != "000000" {
            return Err(AppError::Adapter(format!(
                "binance api error: {} - {}",
                body.code,
                body.message.unwrap_or_default()
            )));
        }

        let now = Utc::now();
        let mut points: Vec<PricePoint> = body
            .data
            .into_iter()
            .filter_map(|entry| {
                let price: f64 = entry.adv.price.parse().unwrap_or(0.0);
                if price <= 0.0 {
                    return None;
                }
                let pay_methods = entry
                    .adv
                    .trade_methods
                    .iter()
                    .map(|m| m.trade_method_name.as_str())
                    .filter(|n| !n.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                Some(PricePoint {
                    id: 0,
                    created_at: now,
                    exchange: "Binance".to_string(),
                    symbol: symbol.to_string(),
                    fiat: fiat.to_string(),
                    side,
                    target_amount: amount,
                    rank: 0,
                    price,
                    merchant: entry.advertiser.nick_name,
                    merchant_id: entry.advertiser.user_no,
                    pay_methods,
                    min_amount: entry.adv.min_single_trans_amount.parse().unwrap_or(0.0),
                    max_amount: entry.adv.max_single_trans_amount.parse().unwrap_or(0.0),
                    available_amount: entry.adv.surplus_amount.parse().unwrap_or(0.0),
                })
            })
            .collect();

        sort_and_rank(&mut points, side);
        points.truncate(1);
        Ok(points)
    }
}

/// Order points best-first for the given side and assign 1-based ranks.
pub(crate) fn sort_and_rank(points: &mut [PricePoint], side: Side) {
    match side {
        Side::Buy => points.sort_by(|a, b| a.price.total_cmp(&b.price)),
        Side::Sell => points.sort_by(|a, b| b.price.total_cmp(&a.price)),
    }
    for (i, p) in points.iter_mut().enumerate() {
        p.rank = i as i64 + 1;
    }
}
