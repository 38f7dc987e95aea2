//! Historical backfill over HTTP.

use crate::error::{AppError, Result};
use crate::types::{HistoryRecord, HistoryRequest, Resolution};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Lookback used for tick resolutions, which have no fixed bar length.
const TICK_LOOKBACK_SECS: i64 = 24 * 60 * 60;

/// Backfill endpoints answer with a bare array or an object wrapping one.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoryResponse {
    Records(Vec<HistoryRecord>),
    Wrapped {
        #[serde(alias = "data", alias = "bars")]
        records: Vec<HistoryRecord>,
    },
}

impl HistoryResponse {
    fn into_records(self) -> Vec<HistoryRecord> {
        match self {
            Self::Records(records) | Self::Wrapped { records } => records,
        }
    }
}

/// Client for the historical bars endpoint.
pub struct HistoryClient {
    http_client: Client,
    url: String,
}

impl HistoryClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("barline/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http_client,
            url: url.into(),
        })
    }

    /// Query for the default countback of `resolution`, ending at `now`.
    pub fn request_for(symbol: &str, resolution: &Resolution, now: DateTime<Utc>) -> HistoryRequest {
        let to_epoch = now.timestamp();
        let span = match resolution.bucket_seconds() {
            Some(seconds) => seconds * resolution.countback as i64,
            None => TICK_LOOKBACK_SECS,
        };
        HistoryRequest {
            symbol: symbol.to_string(),
            resolution: resolution.label.to_string(),
            countback: resolution.countback,
            from_epoch: to_epoch - span,
            to_epoch,
        }
    }

    /// Fetch raw records. They still need sanitizing before use.
    pub async fn fetch(&self, request: &HistoryRequest) -> Result<Vec<HistoryRecord>> {
        debug!(
            "Fetching {} bars of {} @ {}",
            request.countback, request.symbol, request.resolution
        );

        let response = self
            .http_client
            .get(&self.url)
            .query(request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApi(format!("History request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "History API error {}: {}",
                status, body
            )));
        }

        let parsed: HistoryResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalApi(format!("Failed to parse history response: {}", e)))?;

        let records = parsed.into_records();
        debug!("Received {} history records", records.len());
        Ok(records)
    }
}
