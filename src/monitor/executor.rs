//! Fan-out probe executor
//!
//! One C2C tick enumerates (active exchange x amount tier) jobs, runs
//! them with bounded parallelism, and feeds each exchange's aggregate
//! outcome to the health tracker exactly once.

use crate::adapters::Exchange;
use crate::domain::{Merchant, Side};
use crate::error::{AppError, Result};
use crate::monitor::{alerts, health, retry};
use crate::state::AppState;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Cap on concurrent adapter calls within one cycle.
pub(crate) const MAX_CONCURRENT_PROBES: usize = 6;

/// The monitored market side. Probes watch the user-buy book; the alert
/// spread is the discount of the best ask against the FX reference.
const MONITOR_SIDE: Side = Side::Buy;

#[derive(Default)]
struct ExchangeOutcome {
    ok: bool,
    first_err: Option<AppError>,
}

/// Run one probe cycle against the current config snapshot.
pub async fn run_cycle(state: Arc<AppState>, shutdown: watch::Receiver<bool>) {
    let cfg = state.monitor_config();

    if state.last_forex() == 0.0 {
        info!("skipping C2C cycle: forex rate not yet available");
        return;
    }

    let mut active: Vec<Arc<dyn Exchange>> = Vec::new();
    for name in &cfg.exchanges {
        match state.exchanges.get(name) {
            Some(exchange) => {
                if !active.iter().any(|e| e.name() == exchange.name()) {
                    active.push(exchange);
                }
            }
            None => warn!("configured exchange {} has no registered adapter", name),
        }
    }

    debug!(
        "probe cycle: {} exchanges x {} amount tiers",
        active.len(),
        cfg.target_amounts.len()
    );

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_PROBES));
    let mut jobs = JoinSet::new();

    for exchange in &active {
        for &amount in &cfg.target_amounts {
            let exchange = exchange.clone();
            let state = state.clone();
            let semaphore = semaphore.clone();
            let mut shutdown = shutdown.clone();
            let symbol = cfg.symbol.clone();
            let fiat = cfg.fiat.clone();

            jobs.spawn(async move {
                let name = exchange.name().to_string();
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (name, Err(AppError::Cancelled)),
                };
                let result =
                    probe_job(&state, exchange, &symbol, &fiat, amount, &mut shutdown).await;
                (name, result)
            });
        }
    }

    let mut outcomes: HashMap<String, ExchangeOutcome> = HashMap::new();
    while let Some(joined) = jobs.join_next().await {
        let (name, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                error!("probe job panicked: {}", e);
                continue;
            }
        };
        let outcome = outcomes.entry(name).or_default();
        match result {
            Ok(()) => outcome.ok = true,
            // Shutdown-induced failures never count against a source.
            Err(e) if e.is_cancelled() => {}
            Err(e) => {
                if outcome.first_err.is_none() {
                    outcome.first_err = Some(e);
                }
            }
        }
    }

    for (name, outcome) in outcomes {
        if outcome.ok {
            health::update(&state, &name, None);
        } else if let Some(err) = outcome.first_err {
            health::update(&state, &name, Some(&err));
        }
    }
}

/// One (exchange, amount) job: fetch with retries, persist, evaluate.
async fn probe_job(
    state: &Arc<AppState>,
    exchange: Arc<dyn Exchange>,
    symbol: &str,
    fiat: &str,
    amount: f64,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()> {
    let points = retry::fetch_top_prices(
        exchange.as_ref(),
        symbol,
        fiat,
        MONITOR_SIDE,
        amount,
        shutdown,
    )
    .await?;

    // An empty tier is a successful probe: no ad covers the window.
    if points.is_empty() {
        return Ok(());
    }

    let now = Utc::now();
    for p in &points {
        if p.merchant_id.is_empty() {
            continue;
        }
        let merchant = Merchant {
            id: 0,
            exchange: p.exchange.clone(),
            merchant_id: p.merchant_id.clone(),
            nick_name: p.merchant.clone(),
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = state.repo.save_merchant(&merchant) {
            error!("Failed to save merchant {}: {}", p.merchant, e);
        }
    }

    // Raw rows and aggregates land before the alert check, so a fired
    // alert always refers to a durable observation.
    if let Err(e) = state.repo.save_price_points(&points) {
        error!("Failed to save prices: {}", e);
    }

    alerts::evaluate(state, &points[0]);
    Ok(())
}
