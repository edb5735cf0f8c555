//! OKX C2C exchange adapter

use crate::adapters::binance::sort_and_rank;
use crate::adapters::Exchange;
use crate::domain::{PricePoint, Side};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;

const BOOKS_URL: &str = "https://www.okx.com/v3/c2c/tradingOrders/books";
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// OKX C2C order-book implementation
pub struct OkxExchange {
    client: Client,
}

impl OkxExchange {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl Default for OkxExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct BooksResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: BookSides,
}

#[derive(Deserialize, Default)]
struct BookSides {
    #[serde(default)]
    sell: Vec<OkxAd>,
    #[serde(default)]
    buy: Vec<OkxAd>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxAd {
    #[serde(default)]
    price: String,
    #[serde(default)]
    available_amount: String,
    #[serde(default)]
    quote_min_amount_per_order: String,
    #[serde(default)]
    quote_max_amount_per_order: String,
    #[serde(default)]
    nick_name: String,
    #[serde(default)]
    merchant_id: String,
    #[serde(default)]
    payment_methods: Vec<String>,
}

#[async_trait]
impl Exchange for OkxExchange {
    fn name(&self) -> &'static str {
        "OKX"
    }

    async fn top_prices(
        &self,
        symbol: &str,
        fiat: &str,
        side: Side,
        amount: f64,
    ) -> Result<Vec<PricePoint>> {
        // User BUY -> advertiser sell book, user SELL -> advertiser buy book.
        let book_side = match side {
            Side::Buy => "sell",
            Side::Sell => "buy",
        };

        let response = self
            .client
            .get(BOOKS_URL)
            .query(&[
                ("quoteCurrency", fiat),
                ("baseCurrency", symbol),
                ("side", book_side),
                ("paymentMethod", "all"),
                ("userType", "all"),
                ("showTrade", "false"),
                ("showFollow", "false"),
                ("showAlreadyTraded", "false"),
                ("isHideHk", "false"),
                ("limit", "1"),
            ])
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Adapter(format!(
                "okx api returned status: {}",
                response.status()
            )));
        }

        let body: BooksResponse = response.json().await?;
        if body.code != 0 {
            return Err(AppError::Adapter(format!(
                "okx api error code: {}, msg: {}",
                body.code, body.msg
            )));
        }

        let ads = match side {
            Side::Buy => body.data.sell,
            Side::Sell => body.data.buy,
        };

        let now = Utc::now();
        let mut points: Vec<PricePoint> = ads
            .into_iter()
            .filter_map(|ad| {
                let price: f64 = ad.price.parse().unwrap_or(0.0);
                if price <= 0.0 {
                    return None;
                }
                let min_amount: f64 = ad.quote_min_amount_per_order.parse().unwrap_or(0.0);
                let max_amount: f64 = ad.quote_max_amount_per_order.parse().unwrap_or(0.0);
                // Amount tier must fall inside the ad's per-order window.
                if amount > 0.0 && (amount < min_amount || amount > max_amount) {
                    return None;
                }
                Some(PricePoint {
                    id: 0,
                    created_at: now,
                    exchange: "OKX".to_string(),
                    symbol: symbol.to_string(),
                    fiat: fiat.to_string(),
                    side,
                    target_amount: amount,
                    rank: 0,
                    price,
                    merchant: ad.nick_name,
                    merchant_id: ad.merchant_id,
                    pay_methods: ad.payment_methods.join(", "),
                    min_amount,
                    max_amount,
                    available_amount: ad.available_amount.parse().unwrap_or(0.0),
                })
            })
            .collect();

        sort_and_rank(&mut points, side);
        points.truncate(1);
        Ok(points)
    }
}
