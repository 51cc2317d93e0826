//! Media warm-up for freshly fetched records.
//!
//! A preload requests the asset once so later renders hit the HTTP cache.
//! Every attempt is bounded by a timeout; a failed or slow asset never
//! blocks or fails the page that triggered it.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::trace;

use super::errors::FetchError;

#[async_trait]
pub trait MediaPreloader: Send + Sync {
    /// Fetch `url` once, discarding the body.
    async fn warm(&self, url: &str) -> Result<(), FetchError>;
}

/// Preloader that issues a plain GET and drains the response.
#[derive(Debug, Clone)]
pub struct HttpPreloader {
    http: Client,
}

impl HttpPreloader {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("apod-browse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport(format!("building http client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaPreloader for HttpPreloader {
    async fn warm(&self, url: &str) -> Result<(), FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        trace!(url, bytes = bytes.len(), "media warmed");
        Ok(())
    }
}

/// Preloader that does nothing. Used when warming is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreloader;

#[async_trait]
impl MediaPreloader for NoopPreloader {
    async fn warm(&self, _url: &str) -> Result<(), FetchError> {
        Ok(())
    }
}
