//! Streaming downloader with retry and cancellation.

use crate::error::{DownloadError, DownloadResult};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, Response, StatusCode, header};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Progress and cancellation callbacks for a transfer.
///
/// The observer is polled on every progress tick; returning `true` from
/// [`DownloadObserver::is_cancelled`] aborts the transfer, which surfaces
/// as [`DownloadError::Cancelled`].
#[async_trait]
pub trait DownloadObserver: Send + Sync {
    /// Called whenever the received byte count changes.
    async fn progress(&self, total: u64, now: u64);

    /// Cooperative cancellation predicate.
    async fn is_cancelled(&self) -> bool;
}

/// Downloader tuning.
#[derive(Clone, Copy, Debug)]
pub struct DownloadConfig {
    /// Wait between retries of a 202 Accepted response. A `Retry-After`
    /// response header overrides this at runtime.
    pub retry_after: Duration,
    /// How many 202 retries before giving up.
    pub retry_max_times: u32,
    /// Wall-clock cap on a single request.
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            retry_after: Duration::from_secs(30),
            retry_max_times: 4,
            timeout: Duration::from_secs(900),
        }
    }
}

/// Streams one HTTP resource to a local file.
///
/// TLS peer verification stays at the client default (enabled).
pub struct Downloader {
    client: reqwest::Client,
    url: String,
    observer: Arc<dyn DownloadObserver>,
    retry_after: Duration,
    retries_left: u32,
}

impl Downloader {
    pub fn new(
        url: impl Into<String>,
        observer: Arc<dyn DownloadObserver>,
        config: DownloadConfig,
    ) -> DownloadResult<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        let url = url.into();
        tracing::info!(url = %url, "downloader created");
        Ok(Self {
            client,
            url,
            observer,
            retry_after: config.retry_after,
            retries_left: config.retry_max_times,
        })
    }

    /// Content length of the resource, learned via a HEAD request.
    /// Returns 0 when the server does not report one.
    pub async fn content_length(&mut self) -> DownloadResult<u64> {
        let response = self.request_with_retry(Method::HEAD).await?;
        // Read the header directly: HEAD responses have no body, so the
        // client-side body size is always zero.
        let length = response
            .headers()
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|text| text.trim().parse::<u64>().ok())
            .unwrap_or(0);
        Ok(length)
    }

    /// Download the resource to `destination`.
    pub async fn fetch(&mut self, destination: impl AsRef<Path>) -> DownloadResult<()> {
        let destination = destination.as_ref();
        let response = self.request_with_retry(Method::GET).await?;
        let total = response.content_length().unwrap_or(0);

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(|e| DownloadError::Io {
                path: destination.display().to_string(),
                source: e,
            })?;

        let mut stream = response.bytes_stream();
        let mut now = 0u64;
        while let Some(chunk) = stream.next().await {
            if self.observer.is_cancelled().await {
                tracing::info!(url = %self.url, "download cancelled");
                return Err(DownloadError::Cancelled);
            }
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| DownloadError::Io {
                path: destination.display().to_string(),
                source: e,
            })?;
            now += chunk.len() as u64;
            self.observer.progress(total, now).await;
        }

        file.flush().await.map_err(|e| DownloadError::Io {
            path: destination.display().to_string(),
            source: e,
        })?;
        tracing::info!(url = %self.url, bytes = now, "download finished");
        Ok(())
    }

    async fn request_with_retry(&mut self, method: Method) -> DownloadResult<Response> {
        loop {
            if self.observer.is_cancelled().await {
                return Err(DownloadError::Cancelled);
            }

            let response = self
                .client
                .request(method.clone(), &self.url)
                .send()
                .await?;
            self.note_retry_after(&response);

            match response.status() {
                StatusCode::OK => return Ok(response),
                StatusCode::ACCEPTED => {
                    if self.retries_left == 0 {
                        return Err(DownloadError::RetriesExhausted);
                    }
                    self.retries_left -= 1;
                    tracing::info!(
                        wait_secs = self.retry_after.as_secs(),
                        retries_left = self.retries_left,
                        "server answered 202, waiting before retry"
                    );
                    tokio::time::sleep(self.retry_after).await;
                }
                status => return Err(DownloadError::Http(status.as_u16())),
            }
        }
    }

    /// Update the retry interval from a `Retry-After: <seconds>` header.
    fn note_retry_after(&mut self, response: &Response) {
        if let Some(value) = response.headers().get(header::RETRY_AFTER)
            && let Ok(text) = value.to_str()
            && let Ok(seconds) = text.trim().parse::<u64>()
        {
            let updated = Duration::from_secs(seconds);
            if updated != self.retry_after {
                tracing::info!(
                    old_secs = self.retry_after.as_secs(),
                    new_secs = seconds,
                    "Retry-After changed"
                );
                self.retry_after = updated;
            }
        }
    }
}
