//! Bounded retry wrapper around one probe job

use crate::adapters::Exchange;
use crate::domain::{PricePoint, Side};
use crate::error::{AppError, Result};
use crate::monitor::cancelled;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Retries after the initial attempt.
pub(crate) const MAX_RETRIES: u32 = 3;
/// Deadline applied to each individual attempt.
pub(crate) const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(20);
/// Fixed pause between attempts.
pub(crate) const RETRY_DELAY: Duration = Duration::from_secs(90);

/// Fetch top prices with up to four attempts, a 20s per-attempt deadline
/// and a fixed 90s pause between attempts. Both the pause and the
/// in-flight call abort on shutdown.
pub async fn fetch_top_prices(
    exchange: &dyn Exchange,
    symbol: &str,
    fiat: &str,
    side: Side,
    amount: f64,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Vec<PricePoint>> {
    let mut last_err: Option<AppError> = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::select! {
                _ = sleep(RETRY_DELAY) => {}
                _ = cancelled(shutdown) => return Err(AppError::Cancelled),
            }
        }

        let outcome = tokio::select! {
            result = timeout(ATTEMPT_TIMEOUT, exchange.top_prices(symbol, fiat, side, amount)) => {
                match result {
                    Ok(inner) => inner,
                    Err(_) => Err(AppError::Adapter(format!(
                        "attempt timed out after {}s",
                        ATTEMPT_TIMEOUT.as_secs()
                    ))),
                }
            }
            _ = cancelled(shutdown) => return Err(AppError::Cancelled),
        };

        match outcome {
            Ok(points) => return Ok(points),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(
                    "[{}] probe attempt {}/{} for amount {:.0} failed: {}",
                    exchange.name(),
                    attempt + 1,
                    MAX_RETRIES + 1,
                    amount,
                    e
                );
                last_err = Some(e);
            }
        }
    }

    Err(AppError::Adapter(format!(
        "{} probe failed after {} attempts: {}",
        exchange.name(),
        MAX_RETRIES + 1,
        last_err.map(|e| e.to_string()).unwrap_or_default()
    )))
}
