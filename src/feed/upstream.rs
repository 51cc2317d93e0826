//! Upstream feed access.
//!
//! [`Upstream`] is the seam between the coalescer and the network: one call
//! per contiguous date range. [`ApodClient`] is the production implementation
//! talking to the public picture-of-the-day endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::errors::FetchError;
use crate::config::FeedConfig;
use crate::model::{ApodRecord, DateInterval, format_day};

/// Source of day records for a contiguous date range.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Fetch every record in `range` (both endpoints inclusive).
    ///
    /// Implementations may return fewer records than days when the feed has
    /// gaps; they must not return records outside the range.
    async fn fetch_range(&self, range: DateInterval) -> Result<Vec<ApodRecord>, FetchError>;
}

/// HTTP client for the picture-of-the-day API.
#[derive(Debug, Clone)]
pub struct ApodClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl ApodClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("apod-browse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("building http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &FeedConfig) -> Result<Self, FetchError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            config.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Upstream for ApodClient {
    async fn fetch_range(&self, range: DateInterval) -> Result<Vec<ApodRecord>, FetchError> {
        let start = format_day(range.start());
        let end = format_day(range.end());
        debug!(start = %start, end = %end, "requesting feed range");

        let response = self
            .http
            .get(&self.base_url)
            .header("Accept", "application/json")
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("thumbs", "true"),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            let message = error_message(&body)
                .or_else(|| status.canonical_reason().map(str::to_string))
                .unwrap_or_else(|| "unknown error".to_string());
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let mut records: Vec<ApodRecord> =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        records.retain(|record| range.contains(record.date));
        debug!(count = records.len(), "feed range decoded");
        Ok(records)
    }
}

fn transport_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Transport("request timed out".to_string())
    } else {
        // Strip the URL so the query string (and its key) never reaches logs.
        FetchError::Transport(err.without_url().to_string())
    }
}

/// Error bodies come in two shapes: `{"code":400,"msg":"..."}` from the
/// service itself and `{"error":{"code":"...","message":"..."}}` from the
/// gateway in front of it.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    error: Option<GatewayError>,
}

#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    if let Some(msg) = parsed.msg.filter(|m| !m.is_empty()) {
        return Some(msg);
    }
    let gateway = parsed.error?;
    match (gateway.code, gateway.message) {
        (Some(code), Some(message)) => Some(format!("{code}: {message}")),
        (None, Some(message)) => Some(message),
        (Some(code), None) => Some(code),
        (None, None) => None,
    }
}
