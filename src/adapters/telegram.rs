//! Telegram notification channel

use crate::adapters::Notifier;
use crate::config::TelegramConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Sends alerts to a Telegram chat via the Bot API.
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(cfg: &TelegramConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            bot_token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id.clone(),
        }
    }
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'a str,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text: format!("<b>{}</b>\n{}", subject, body),
            parse_mode: "HTML",
        };

        let response = self.client.post(&url).json(&payload).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Notification(format!(
                "telegram api returned status: {}",
                response.status()
            )));
        }

        let result: SendMessageResponse = response.json().await?;
        if !result.ok {
            return Err(AppError::Notification(format!(
                "telegram send failed: {}",
                result.description.unwrap_or_default()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_send_message_request() {
        let req = SendMessageRequest {
            chat_id: "c-1",
            text: format!("<b>{}</b>\n{}", "Opportunity!", "<b>Exchange:</b> Binance"),
            parse_mode: "HTML",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["chat_id"], "c-1");
        assert_eq!(json["parse_mode"], "HTML");
        assert_eq!(json["text"], "<b>Opportunity!</b>\n<b>Exchange:</b> Binance");
    }

    #[test]
    fn decodes_send_message_response() {
        let ok: SendMessageResponse =
            serde_json::from_str(r#"{"ok": true, "result": {"message_id": 42}}"#).unwrap();
        assert!(ok.ok);
        assert!(ok.description.is_none());

        let failed: SendMessageResponse =
            serde_json::from_str(r#"{"ok": false, "description": "chat not found"}"#).unwrap();
        assert!(!failed.ok);
        assert_eq!(failed.description.as_deref(), Some("chat not found"));
    }
}
