//! Configuration loading
//!
//! The service reads a TOML file at startup. The `[monitor]` section is
//! hot-reloadable through the HTTP API; everything else is fixed for the
//! lifetime of the process.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { port: default_port() }
    }
}

/// Hot-reloadable monitoring options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Base period of the C2C probe loop in minutes; values <= 0 fall
    /// back to 3 at the point of use.
    #[serde(default = "default_c2c_interval")]
    pub c2c_interval_minutes: i64,
    /// Period of the FX refresh in hours; values <= 0 fall back to 1.
    #[serde(default = "default_forex_interval")]
    pub forex_interval_hours: i64,
    pub alert_threshold_percent: f64,
    /// Fiat-unit amount tiers to probe; 0 means "no amount filter".
    #[serde(default = "default_target_amounts")]
    pub target_amounts: Vec<f64>,
    /// Case-insensitive subset of registered exchange names to activate.
    pub exchanges: Vec<String>,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_fiat")]
    pub fiat: String,
}

impl MonitorConfig {
    /// FX pair label for the monitored fiat, e.g. "USDCNY".
    pub fn forex_pair(&self) -> String {
        format!("USD{}", self.fiat)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    pub chat_id: String,
}

impl Config {
    /// Load configuration from a TOML file. Secrets may be supplied via
    /// environment instead of the file (`PEERWATCH_TELEGRAM_BOT_TOKEN`).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(format!(
                "failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut cfg: Config = toml::from_str(&raw)
            .map_err(|e| AppError::Config(format!("failed to parse config: {}", e)))?;

        if let Ok(token) = std::env::var("PEERWATCH_TELEGRAM_BOT_TOKEN") {
            cfg.notification.telegram.bot_token = token;
        }

        if cfg.monitor.exchanges.is_empty() {
            return Err(AppError::Config(
                "monitor.exchanges must name at least one exchange".to_string(),
            ));
        }

        Ok(cfg)
    }
}

fn default_port() -> u16 {
    8080
}

fn default_c2c_interval() -> i64 {
    3
}

fn default_forex_interval() -> i64 {
    1
}

fn default_target_amounts() -> Vec<f64> {
    vec![0.0, 30.0, 50.0, 200.0, 500.0, 1000.0]
}

fn default_symbol() -> String {
    "USDT".to_string()
}

fn default_fiat() -> String {
    "CNY".to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("peerwatch.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [monitor]
            alert_threshold_percent = 2.0
            exchanges = ["Binance"]

            [notification.telegram]
            bot_token = "t"
            chat_id = "c"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.app.port, 8080);
        assert_eq!(cfg.monitor.c2c_interval_minutes, 3);
        assert_eq!(cfg.monitor.forex_interval_hours, 1);
        assert_eq!(cfg.monitor.symbol, "USDT");
        assert_eq!(cfg.monitor.fiat, "CNY");
        assert_eq!(cfg.monitor.forex_pair(), "USDCNY");
        assert_eq!(cfg.monitor.target_amounts.len(), 6);
        assert_eq!(cfg.database.path, PathBuf::from("peerwatch.db"));
    }

    #[test]
    fn monitor_section_round_trips_as_json() {
        // The monitor section is what the config API exchanges.
        let m = MonitorConfig {
            c2c_interval_minutes: 5,
            forex_interval_hours: 2,
            alert_threshold_percent: 1.5,
            target_amounts: vec![0.0, 100.0],
            exchanges: vec!["Binance".into(), "OKX".into()],
            symbol: "USDT".into(),
            fiat: "CNY".into(),
        };
        let json = serde_json::to_string(&m).unwrap();
        let back: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.c2c_interval_minutes, 5);
        assert_eq!(back.exchanges, m.exchanges);
    }
}
