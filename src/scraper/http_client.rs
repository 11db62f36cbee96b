use super::{FetchError, Fetcher};
use crate::config::ScraperConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, warn};

/// Plain HTTP fetcher. The client (user agent, timeout, cookie jar) is built
/// once and never reconfigured, so one instance can serve every venue.
pub struct HttpFetcher {
    inner: reqwest::Client,
    request_delay_ms: u64,
    jitter_ms: u64,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            request_delay_ms: config.request_delay_ms,
            jitter_ms: config.jitter_ms,
            max_retries: config.max_retries,
        })
    }

    async fn get_once(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .inner
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport { url: url.to_string(), source })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status { status: status.as_u16(), url: url.to_string() });
        }

        resp.text()
            .await
            .map_err(|source| FetchError::Transport { url: url.to_string(), source })
    }

    /// Configured delay plus random jitter.
    fn polite_delay(&self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.jitter_ms)
        };
        Duration::from_millis(self.request_delay_ms + jitter)
    }
}

/// Transport failures, throttling and server errors are worth another try.
fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Transport { .. } => true,
        FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        FetchError::Browser { .. } | FetchError::Unavailable { .. } => false,
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        sleep(self.polite_delay()).await;
        debug!("GET {}", url);

        let backoff = ExponentialBackoff::from_millis(2)
            .factor(self.request_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.max_retries as usize);

        RetryIf::spawn(
            backoff,
            || self.get_once(url),
            |err: &FetchError| {
                let retry = is_retryable(err);
                if retry {
                    warn!("Retrying {}: {}", url, err);
                }
                retry
            },
        )
        .await
    }
}
