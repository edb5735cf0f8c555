//! FX reference-rate adapter backed by open.er-api.com

use crate::adapters::Forex;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

/// Open Exchange Rates API adapter
pub struct OpenErForex {
    client: Client,
}

impl OpenErForex {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
        }
    }
}

impl Default for OpenErForex {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Deserialize)]
struct LatestResponse {
    #[serde(default)]
    result: String,
    #[serde(default)]
    rates: HashMap<String, f64>,
}

#[async_trait]
impl Forex for OpenErForex {
    fn source(&self) -> &'static str {
        "OpenER"
    }

    async fn rate(&self, from: &str, to: &str) -> Result<f64> {
        let url = format!("https://open.er-api.com/v6/latest/{}", from);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Adapter(format!(
                "forex api returned status: {}",
                response.status()
            )));
        }

        let body: LatestResponse = response.json().await?;
        if body.result != "success" {
            return Err(AppError::Adapter(format!(
                "forex api result: {}",
                body.result
            )));
        }

        let rate = body
            .rates
            .get(to)
            .copied()
            .ok_or_else(|| AppError::Adapter(format!("currency {} not found in rates", to)))?;

        if rate == 0.0 {
            return Err(AppError::Adapter(format!("zero rate returned for {}", to)));
        }

        Ok(rate)
    }
}
