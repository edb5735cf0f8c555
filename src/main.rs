use peerwatch::adapters::forex::OpenErForex;
use peerwatch::adapters::telegram::TelegramNotifier;
use peerwatch::adapters::ExchangeRegistry;
use peerwatch::api;
use peerwatch::config::Config;
use peerwatch::db::SqliteDb;
use peerwatch::error::Result;
use peerwatch::monitor::Monitor;
use peerwatch::state::AppState;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "peerwatch=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        error!("fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let cfg = Config::from_file(&config_path)?;

    info!("Starting peerwatch...");

    let repo = Arc::new(SqliteDb::new(&cfg.database.path)?);
    let registry = ExchangeRegistry::new();
    let forex = Arc::new(OpenErForex::new());
    let notifier = Arc::new(TelegramNotifier::new(&cfg.notification.telegram));

    let state = Arc::new(AppState::new(
        cfg.monitor.clone(),
        repo,
        registry,
        forex,
        notifier,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Monitor::new(state.clone(), shutdown_rx.clone());
    let monitor_handle = tokio::spawn(monitor.run());

    let api_handle = tokio::spawn(api::server::serve(state, cfg.app.port, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    let _ = monitor_handle.await;
    if let Ok(Err(e)) = api_handle.await {
        error!("API server error: {}", e);
    }

    Ok(())
}
