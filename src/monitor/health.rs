//! Per-source health tracking
//!
//! Each data source moves between Pending, OK and Error. A transition
//! into Error emits exactly one service-down notification; staying in
//! Error only refreshes the message, and recovery is logged without a
//! notification.

use crate::domain::{ServiceHealth, ServiceStatus};
use crate::error::AppError;
use crate::state::AppState;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Record the outcome of one probe cycle for a source.
pub fn update(state: &Arc<AppState>, name: &str, err: Option<&AppError>) {
    let mut notify: Option<String> = None;
    {
        let mut engine = state.engine.write();
        let status = engine
            .service_status
            .entry(name.to_string())
            .or_insert_with(|| ServiceStatus::pending(name));
        status.last_check = Utc::now();

        match err {
            Some(e) => {
                let message = e.to_string();
                if status.status != ServiceHealth::Error {
                    status.status = ServiceHealth::Error;
                    status.message = message.clone();
                    notify = Some(message);
                } else {
                    status.message = message;
                }
            }
            None => {
                if status.status == ServiceHealth::Error {
                    info!("service recovered: {}", name);
                }
                status.status = ServiceHealth::Ok;
                status.message.clear();
            }
        }
    }

    if let Some(message) = notify {
        send_down_alert(state, name, message);
    }
}

fn send_down_alert(state: &Arc<AppState>, name: &str, message: String) {
    let subject = format!("Service Down: {}", name);
    let body = format!(
        "<b>Service:</b> {}\n\
         <b>Status:</b> ERROR\n\
         <b>Details:</b> {}\n\
         <i>Sent once; will not repeat until the service recovers and fails again.</i>\n\
         Time: {}",
        name,
        message,
        Utc::now().to_rfc3339()
    );

    warn!("sending service-down alert for {}: {}", name, message);
    let notifier = state.notifier.clone();
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&subject, &body).await {
            error!("Failed to send service-down alert: {}", e);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{drain_tasks, test_state, MonitorConfigBuilder, RecordingNotifier};

    #[tokio::test]
    async fn error_transition_notifies_once_per_run() {
        let notifier = RecordingNotifier::new();
        let state = test_state(MonitorConfigBuilder::default().build(), notifier.clone());

        update(&state, "Binance", Some(&AppError::Adapter("boom".into())));
        update(&state, "Binance", Some(&AppError::Adapter("still down".into())));
        drain_tasks().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("Service Down: Binance"));

        let statuses = state.service_statuses();
        let status = &statuses["Binance"];
        assert_eq!(status.status, ServiceHealth::Error);
        assert_eq!(status.message, "Adapter error: still down");
    }

    #[tokio::test]
    async fn recovery_clears_status_without_notifying() {
        let notifier = RecordingNotifier::new();
        let state = test_state(MonitorConfigBuilder::default().build(), notifier.clone());

        update(&state, "OKX", Some(&AppError::Adapter("down".into())));
        drain_tasks().await;
        update(&state, "OKX", None);
        drain_tasks().await;

        assert_eq!(notifier.sent().len(), 1);
        let statuses = state.service_statuses();
        assert_eq!(statuses["OKX"].status, ServiceHealth::Ok);
        assert!(statuses["OKX"].message.is_empty());
    }

    #[tokio::test]
    async fn second_failure_run_notifies_again() {
        let notifier = RecordingNotifier::new();
        let state = test_state(MonitorConfigBuilder::default().build(), notifier.clone());

        update(&state, "OKX", Some(&AppError::Adapter("down".into())));
        update(&state, "OKX", None);
        update(&state, "OKX", Some(&AppError::Adapter("down again".into())));
        drain_tasks().await;

        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn success_marks_ok_from_pending() {
        let notifier = RecordingNotifier::new();
        let state = test_state(MonitorConfigBuilder::default().build(), notifier.clone());

        update(&state, "Binance", None);
        drain_tasks().await;

        assert!(notifier.sent().is_empty());
        assert_eq!(
            state.service_statuses()["Binance"].status,
            ServiceHealth::Ok
        );
    }
}
