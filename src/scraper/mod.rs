pub mod browser;
pub mod cleaner;
pub mod http_client;
pub mod listing;
pub mod parsers;
pub mod stream;

use crate::config::ScraperConfig;
use crate::dates::DateParseError;
use crate::models::FetchStrategy;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub use self::listing::VenueScraper;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("browser render of {url} failed: {reason}")]
    Browser { url: String, reason: String },

    #[error("fetch strategy {strategy} is not available in this build")]
    Unavailable { strategy: FetchStrategy },
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("{venue}: listing container {selector:?} not found")]
    ContainerNotFound { venue: String, selector: String },

    #[error("invalid selector {selector:?}: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{venue}: {source}")]
    Date {
        venue: String,
        #[source]
        source: DateParseError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("scrape task for {venue} did not finish: {reason}")]
    Task { venue: String, reason: String },
}

// ── Fetcher capability ────────────────────────────────────────────────────────

/// Turns a URL into HTML text. Implementations own their retry/timeout policy.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// One shared fetcher per strategy, built once per run. Every strategy is
/// always registered, so a build without `browser` reports `Unavailable`
/// from the browser fetcher itself rather than from `get`.
pub struct Fetchers {
    by_strategy: HashMap<FetchStrategy, Arc<dyn Fetcher>>,
}

impl Fetchers {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut by_strategy: HashMap<FetchStrategy, Arc<dyn Fetcher>> = HashMap::new();
        by_strategy.insert(
            FetchStrategy::Http,
            Arc::new(http_client::HttpFetcher::new(config)?),
        );
        by_strategy.insert(
            FetchStrategy::Browser,
            Arc::new(browser::BrowserFetcher::new(config)),
        );
        Ok(Self { by_strategy })
    }

    pub fn get(&self, strategy: FetchStrategy) -> Result<Arc<dyn Fetcher>, FetchError> {
        self.by_strategy
            .get(&strategy)
            .cloned()
            .ok_or(FetchError::Unavailable { strategy })
    }
}
