//! Query API endpoint handlers

use crate::api::types::*;
use crate::config::MonitorConfig;
use crate::domain::{Granularity, PriceFilter, Side};
use crate::monitor::alerts;
use crate::state::AppState;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

/// Liveness check - GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::<Empty>::success_with_message(
        "peerwatch API is running",
    ))
}

/// Chart history - GET /api/v1/history?range=1d&amount=100[&granularity=hour]
///
/// Returns rank-1 BUY price series per configured exchange plus the FX
/// reference series, keyed by lowercase exchange name.
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let now = Utc::now();
    let start = match query.range.as_deref() {
        Some("7d") => now - Duration::days(7),
        Some("30d") => now - Duration::days(30),
        _ => now - Duration::days(1),
    };
    let granularity = query.granularity.unwrap_or(Granularity::Raw);
    let cfg = state.monitor_config();

    let mut data = serde_json::Map::new();

    let forex = state
        .repo
        .forex_history(&cfg.forex_pair(), Some(start), Some(now), granularity)
        .unwrap_or_else(|e| {
            error!("Failed to query forex history: {}", e);
            Vec::new()
        });
    data.insert(
        "forex".to_string(),
        series_value(forex.iter().map(|r| (r.created_at.timestamp(), r.rate))),
    );

    for name in &cfg.exchanges {
        // Canonicalize through the registry so the series key matches
        // the exchange column regardless of config casing.
        let Some(exchange) = state.exchanges.get(name) else {
            continue;
        };
        let filter = PriceFilter {
            exchange: Some(exchange.name().to_string()),
            symbol: Some(cfg.symbol.clone()),
            fiat: Some(cfg.fiat.clone()),
            side: Some(Side::Buy),
            target_amount: Some(query.amount),
            rank: Some(1),
            start: Some(start),
            end: Some(now),
            limit: Some(5000),
        };
        let points = state
            .repo
            .price_history(&filter, granularity)
            .unwrap_or_else(|e| {
                error!("Failed to query price history for {}: {}", exchange.name(), e);
                Vec::new()
            });
        data.insert(
            exchange.name().to_lowercase(),
            series_value(points.iter().map(|p| (p.created_at.timestamp(), p.price))),
        );
    }

    Json(ApiResponse::success_with_data(serde_json::Value::Object(
        data,
    )))
}

fn series_value(samples: impl Iterator<Item = (i64, f64)>) -> serde_json::Value {
    let series: Vec<SeriesPoint> = samples.map(|(t, v)| SeriesPoint { t, v }).collect();
    serde_json::to_value(series).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
}

/// Source health snapshot - GET /api/v1/status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success_with_data(state.service_statuses()))
}

/// Currently tracked alert lows - GET /api/v1/alerts
pub async fn get_alert_states(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success_with_data(state.triggered_lows()))
}

/// Clear one alert track - POST /api/v1/alerts/reset
pub async fn reset_alert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetAlertRequest>,
) -> impl IntoResponse {
    info!(
        "reset requested for {} {} {:.0}",
        req.exchange, req.side, req.amount
    );
    match alerts::reset(&state, &req.exchange, req.side, req.amount) {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::<Empty>::success_with_message("reset")),
        ),
        Err(e) => {
            error!("Failed to reset alert state: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<Empty>::error(&e.to_string())),
            )
        }
    }
}

/// Monitor config snapshot - GET /api/config
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success_with_data(state.monitor_config()))
}

/// Atomically replace the monitor config - POST /api/config
///
/// The new snapshot takes effect on the next tick; an in-flight probe
/// cycle keeps the snapshot it started with. The same invariants that are
/// fatal at load time are rejected here with 400.
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(new_cfg): Json<MonitorConfig>,
) -> impl IntoResponse {
    if new_cfg.exchanges.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<Empty>::error(
                "monitor.exchanges must name at least one exchange",
            )),
        );
    }
    state.update_config(new_cfg);
    (
        StatusCode::OK,
        Json(ApiResponse::<Empty>::success_with_message("updated")),
    )
}
