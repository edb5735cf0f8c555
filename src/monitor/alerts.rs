//! Two-mode alert automaton
//!
//! Per key `(exchange, side, target_amount)` the engine is either
//! untriggered (mode A: fire when the spread over FX clears the
//! configured threshold, subject to a 30-minute cooldown) or tracking a
//! previous trigger (mode B: fire on every new low, no cooldown). The
//! in-memory maps are a cache over the `alert_states` table and are
//! rebuilt from it at startup.

use crate::domain::{AlertState, PricePoint, Side};
use crate::error::Result;
use crate::state::AppState;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{error, info};

const COOLDOWN_MINUTES: i64 = 30;

enum AlertKind {
    Initial,
    Lower { previous: f64 },
}

impl AlertKind {
    fn label(&self) -> &'static str {
        match self {
            AlertKind::Initial => "Initial",
            AlertKind::Lower { .. } => "Lower",
        }
    }
}

pub fn alert_key(exchange: &str, side: Side, amount: f64) -> String {
    format!("{}-{}-{:.0}", exchange, side.as_str(), amount)
}

/// Evaluate the rank-1 observation of one probe.
pub fn evaluate(state: &Arc<AppState>, p: &PricePoint) {
    let forex = state.last_forex();
    if p.price <= 0.0 || forex <= 0.0 {
        return;
    }

    let threshold = state.monitor_config().alert_threshold_percent;
    let spread = (forex - p.price) / forex * 100.0;
    let key = alert_key(&p.exchange, p.side, p.target_amount);

    let (trigger_price, last_sent) = {
        let engine = state.engine.read();
        (
            engine.triggered_low_prices.get(&key).copied(),
            engine.alert_cache.get(&key).copied(),
        )
    };

    let now = Utc::now();
    let kind = match trigger_price {
        // Mode B: already tracking; only a strictly better price fires,
        // and the cooldown does not apply.
        Some(previous) => {
            if p.price < previous {
                Some(AlertKind::Lower { previous })
            } else {
                None
            }
        }
        // Mode A: threshold plus cooldown.
        None => {
            if spread >= threshold && cooled_down(last_sent, now) {
                Some(AlertKind::Initial)
            } else {
                None
            }
        }
    };

    let Some(kind) = kind else {
        return;
    };

    let (subject, body) = render(p, forex, spread, &kind, now);
    info!("triggering {} alert: {}", kind.label(), subject);

    let notifier = state.notifier.clone();
    let dispatch_subject = subject.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&dispatch_subject, &body).await {
            error!("Failed to send alert notification: {}", e);
        }
    });

    {
        let mut engine = state.engine.write();
        engine.alert_cache.insert(key.clone(), now);
        engine.triggered_low_prices.insert(key, p.price);
    }

    let persisted = AlertState {
        id: 0,
        exchange: p.exchange.clone(),
        side: p.side,
        target_amount: p.target_amount,
        trigger_price: p.price,
        last_alert_at: now,
    };
    if let Err(e) = state.repo.upsert_alert_state(&persisted) {
        error!("Failed to persist alert state: {}", e);
    }
}

fn cooled_down(last_sent: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match last_sent {
        Some(t) => now - t >= Duration::minutes(COOLDOWN_MINUTES),
        None => true,
    }
}

fn render(
    p: &PricePoint,
    forex: f64,
    spread: f64,
    kind: &AlertKind,
    now: DateTime<Utc>,
) -> (String, String) {
    let subject = match kind {
        AlertKind::Initial => format!(
            "Opportunity! {} {} Price: {:.4} (Spread: {:.2}%)",
            p.exchange, p.symbol, p.price, spread
        ),
        AlertKind::Lower { previous } => format!(
            "New Low! {} {} Price: {:.4} (Was: {:.4})",
            p.exchange, p.symbol, p.price, previous
        ),
    };

    let body = format!(
        "<b>Exchange:</b> {}\n\
         <b>Side:</b> User {}\n\
         <b>Amount Tier:</b> {:.0} {}\n\
         <b>Order Window:</b> {:.0} - {:.0} {}\n\
         <b>Pay Methods:</b> {}\n\
         <b>Current Price:</b> {:.4} {}\n\
         <b>Forex Rate:</b> {:.4} {}\n\
         <b>Spread:</b> {:.2}%\n\
         <i>Threshold Mode: {}</i>\n\
         Time: {}",
        p.exchange,
        p.side,
        p.target_amount,
        p.fiat,
        p.min_amount,
        p.max_amount,
        p.fiat,
        p.pay_methods,
        p.price,
        p.fiat,
        forex,
        p.fiat,
        spread,
        kind.label(),
        now.to_rfc3339()
    );

    (subject, body)
}

/// Rebuild the in-memory maps from the persisted alert states. Called once
/// at startup, before the first probe, so a restart neither re-spams
/// Initial alerts nor forgets a tracked low.
pub fn load_persisted(state: &Arc<AppState>) -> Result<usize> {
    let states = state.repo.load_alert_states()?;
    let mut engine = state.engine.write();
    for s in &states {
        let key = alert_key(&s.exchange, s.side, s.target_amount);
        engine.triggered_low_prices.insert(key.clone(), s.trigger_price);
        engine.alert_cache.insert(key, s.last_alert_at);
    }
    Ok(states.len())
}

/// Clear the in-memory and persisted track for one key. The next
/// observation clearing the threshold fires an Initial alert again.
pub fn reset(state: &Arc<AppState>, exchange: &str, side: Side, amount: f64) -> Result<()> {
    let key = alert_key(exchange, side, amount);
    {
        let mut engine = state.engine.write();
        engine.triggered_low_prices.remove(&key);
        engine.alert_cache.remove(&key);
    }
    state.repo.delete_alert_state(exchange, side, amount)?;
    info!("reset alert state for {}", key);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{drain_tasks, test_state, MonitorConfigBuilder, RecordingNotifier};
    use chrono::TimeZone;

    fn observation(price: f64) -> PricePoint {
        PricePoint {
            id: 0,
            created_at: Utc::now(),
            exchange: "Binance".to_string(),
            symbol: "USDT".to_string(),
            fiat: "CNY".to_string(),
            side: Side::Buy,
            target_amount: 100.0,
            rank: 1,
            price,
            merchant: "trader1".to_string(),
            merchant_id: "m-1".to_string(),
            pay_methods: "Bank".to_string(),
            min_amount: 100.0,
            max_amount: 50_000.0,
            available_amount: 900.0,
        }
    }

    const KEY: &str = "Binance-BUY-100";

    #[tokio::test]
    async fn initial_fire_records_state_and_notifies() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );
        state.set_last_forex(7.2);

        evaluate(&state, &observation(7.0));
        drain_tasks().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("Opportunity!"));
        assert!(sent[0].1.contains("Threshold Mode: Initial"));

        assert_eq!(state.triggered_lows()[KEY], 7.0);
        let persisted = state.repo.load_alert_states().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].trigger_price, 7.0);
    }

    #[tokio::test]
    async fn new_low_fires_without_cooldown() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );
        state.set_last_forex(7.2);

        evaluate(&state, &observation(7.0));
        evaluate(&state, &observation(6.95));
        drain_tasks().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].0.contains("New Low!"));
        assert!(sent[1].0.contains("(Was: 7.0000)"));

        assert_eq!(state.triggered_lows()[KEY], 6.95);
        assert_eq!(state.repo.load_alert_states().unwrap()[0].trigger_price, 6.95);
    }

    #[tokio::test]
    async fn tracked_key_is_silent_until_beaten() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );
        state.set_last_forex(7.2);

        evaluate(&state, &observation(7.0));
        // Above the tracked low, and above threshold spread: stays quiet.
        evaluate(&state, &observation(7.1));
        drain_tasks().await;
        assert_eq!(notifier.sent().len(), 1);
        assert_eq!(state.triggered_lows()[KEY], 7.0);

        evaluate(&state, &observation(6.9));
        drain_tasks().await;
        assert_eq!(notifier.sent().len(), 2);
        assert!(notifier.sent()[1].0.contains("New Low!"));
    }

    #[tokio::test]
    async fn cooldown_suppresses_repeat_initial() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );
        state.set_last_forex(7.2);

        // A recent alert on an otherwise untriggered key (e.g. right
        // after a reset that raced a probe).
        state
            .engine
            .write()
            .alert_cache
            .insert(KEY.to_string(), Utc::now() - Duration::minutes(5));

        evaluate(&state, &observation(7.0));
        drain_tasks().await;
        assert!(notifier.sent().is_empty());

        // Past the cooldown the same observation fires.
        state
            .engine
            .write()
            .alert_cache
            .insert(KEY.to_string(), Utc::now() - Duration::minutes(31));
        evaluate(&state, &observation(7.0));
        drain_tasks().await;
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].0.contains("Opportunity!"));
    }

    #[tokio::test]
    async fn guards_skip_zero_price_and_missing_forex() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );

        evaluate(&state, &observation(7.0)); // forex still 0
        state.set_last_forex(7.2);
        evaluate(&state, &observation(0.0));
        drain_tasks().await;

        assert!(notifier.sent().is_empty());
        assert!(state.triggered_lows().is_empty());
    }

    #[tokio::test]
    async fn restart_restores_tracked_low_from_storage() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );
        state
            .repo
            .upsert_alert_state(&AlertState {
                id: 0,
                exchange: "Binance".to_string(),
                side: Side::Buy,
                target_amount: 100.0,
                trigger_price: 6.9,
                last_alert_at: Utc.with_ymd_and_hms(2024, 5, 17, 8, 0, 0).unwrap(),
            })
            .unwrap();

        let restored = load_persisted(&state).unwrap();
        assert_eq!(restored, 1);
        assert_eq!(state.triggered_lows()[KEY], 6.9);

        state.set_last_forex(7.2);
        // Above the restored low: nothing, despite threshold-clearing spread.
        evaluate(&state, &observation(7.0));
        drain_tasks().await;
        assert!(notifier.sent().is_empty());

        // Below it: Lower, not Initial.
        evaluate(&state, &observation(6.8));
        drain_tasks().await;
        assert_eq!(notifier.sent().len(), 1);
        assert!(notifier.sent()[0].0.contains("New Low!"));
    }

    #[tokio::test]
    async fn reset_rearms_the_initial_mode() {
        let notifier = RecordingNotifier::new();
        let state = test_state(
            MonitorConfigBuilder::default().threshold(2.0).build(),
            notifier.clone(),
        );
        state.set_last_forex(7.2);

        evaluate(&state, &observation(7.0));
        drain_tasks().await;
        assert_eq!(notifier.sent().len(), 1);

        reset(&state, "Binance", Side::Buy, 100.0).unwrap();
        assert!(state.triggered_lows().is_empty());
        assert!(state.repo.load_alert_states().unwrap().is_empty());

        evaluate(&state, &observation(7.0));
        drain_tasks().await;
        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].0.contains("Opportunity!"));
    }
}
