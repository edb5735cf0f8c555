//! Query API request/response types

use crate::domain::{Granularity, Side};
use serde::{Deserialize, Serialize};

/// Standard API response envelope
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success_with_message(message: &str) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn success_with_data(data: T) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
        }
    }

    pub fn error(message: &str) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.to_string()),
            data: None,
        }
    }
}

/// Empty data type for responses without data
#[derive(Debug, Clone, Serialize)]
pub struct Empty {}

/// GET /api/v1/history query string
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    /// "1d", "7d" or "30d"; anything else falls back to 1d.
    pub range: Option<String>,
    pub amount: f64,
    pub granularity: Option<Granularity>,
}

/// POST /api/v1/alerts/reset body
#[derive(Debug, Clone, Deserialize)]
pub struct ResetAlertRequest {
    pub exchange: String,
    pub side: Side,
    pub amount: f64,
}

/// One chart sample: unix seconds and value.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub t: i64,
    pub v: f64,
}
