//! CDN edge client.
//!
//! Every fetch is a plain GET against a content-addressed URL; archive
//! slices add an inclusive `Range` header. Transient failures retry with
//! exponential backoff and jitter.

use crate::{Error, Result};
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

/// Default maximum retries
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default initial backoff in milliseconds
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default maximum backoff in milliseconds
const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;

/// Default backoff multiplier
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Default jitter factor (0.0 to 1.0)
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Connect timeout for all CDN requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for configuration files.
pub const CONFIG_TIMEOUT: Duration = Duration::from_secs(30);

/// Request timeout for archive index files.
pub const INDEX_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP client for CDN edge hosts.
#[derive(Debug, Clone)]
pub struct CdnClient {
    client: Client,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    backoff_multiplier: f64,
    jitter_factor: f64,
}

impl CdnClient {
    /// Create a client with pooling and compression enabled.
    ///
    /// Large data bodies carry no request timeout; the connect timeout
    /// still bounds a dead host.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_max_idle_per_host(20)
            .gzip(true)
            .deflate(true)
            .build()?;

        Ok(Self::with_client(client))
    }

    /// Create a client around a custom `reqwest::Client`.
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }

    /// Set the maximum number of retries for failed requests.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial backoff duration in milliseconds.
    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Delay before the next retry: exponential growth from the initial
    /// backoff, capped, then scaled by a random factor in
    /// `[1 - jitter, 1 + jitter]`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn backoff_delay(&self, completed_retries: u32) -> Duration {
        let exponential = self.initial_backoff_ms as f64
            * self.backoff_multiplier.powi(completed_retries as i32);
        let capped = exponential.min(self.max_backoff_ms as f64);

        let spread = 1.0 + self.jitter_factor * (2.0 * rand::random::<f64>() - 1.0);
        Duration::from_millis((capped * spread).max(0.0) as u64)
    }

    async fn execute_with_retry(
        &self,
        url: &str,
        timeout: Option<Duration>,
        range: Option<(u32, u32)>,
    ) -> Result<Response> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff_delay(attempt - 1);
                debug!("CDN retry attempt {attempt} after {backoff:?} backoff");
                sleep(backoff).await;
            }

            debug!("CDN request to {url} (attempt {})", attempt + 1);

            let mut request = self.client.get(url);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            if let Some((offset, size)) = range {
                // Inclusive byte range.
                request = request.header("Range", format!("bytes={}-{}", offset, offset + size - 1));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    trace!("Response status: {status}");

                    if status.is_success() {
                        return Ok(response);
                    }

                    if status.is_server_error() && attempt < self.max_retries {
                        warn!("Server error {status} (attempt {}): will retry", attempt + 1);
                        last_error = Some(Error::Transport(
                            response.error_for_status().expect_err("status is an error"),
                        ));
                        continue;
                    }

                    if status == StatusCode::NOT_FOUND {
                        let hash = url.rsplit('/').next().unwrap_or("unknown");
                        return Err(Error::content_not_found(hash));
                    }

                    return Err(Error::Transport(
                        response.error_for_status().expect_err("status is an error"),
                    ));
                }
                Err(e) => {
                    if transient(&e) && attempt < self.max_retries {
                        warn!("Request failed (attempt {}): {e}, will retry", attempt + 1);
                        last_error = Some(Error::Transport(e));
                    } else {
                        debug!("Request failed (attempt {}): {e}, not retrying", attempt + 1);
                        return Err(Error::Transport(e));
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::configuration("all CDN retry attempts failed")))
    }

    /// Fetch a full body.
    pub async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let response = self.execute_with_retry(url, timeout, None).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch `size` bytes at `offset` with an inclusive `Range` header.
    pub async fn fetch_range(&self, url: &str, offset: u32, size: u32) -> Result<Vec<u8>> {
        let response = self
            .execute_with_retry(url, None, Some((offset, size)))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Whether a transport error is worth another attempt.
///
/// Timeouts, connection setup failures and errors while sending the
/// request are transient; anything past that point (body, decode) is not.
fn transient(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}
