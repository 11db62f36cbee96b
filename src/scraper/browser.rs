//! Headless-browser fetcher for listings rendered client-side.
//!
//! Built with the `browser` feature (chromiumoxide). Without it the strategy
//! still exists in config but every fetch fails with `FetchError::Unavailable`.

use super::{FetchError, Fetcher};
use crate::config::ScraperConfig;
use async_trait::async_trait;

#[cfg(feature = "browser")]
pub use self::chrome::BrowserFetcher;

#[cfg(not(feature = "browser"))]
pub struct BrowserFetcher;

#[cfg(not(feature = "browser"))]
impl BrowserFetcher {
    pub fn new(_config: &ScraperConfig) -> Self {
        Self
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
        Err(FetchError::Unavailable { strategy: crate::models::FetchStrategy::Browser })
    }
}

#[cfg(feature = "browser")]
mod chrome {
    use super::*;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::sync::OnceCell;
    use tokio::task::JoinHandle;
    use tracing::{debug, info};

    struct Running {
        browser: Browser,
        _handler: JoinHandle<()>,
    }

    /// Launches Chrome on first use and shares it for every later fetch.
    pub struct BrowserFetcher {
        running: OnceCell<Running>,
        settle: Duration,
    }

    impl BrowserFetcher {
        pub fn new(config: &ScraperConfig) -> Self {
            Self {
                running: OnceCell::new(),
                settle: Duration::from_millis(config.browser_settle_ms),
            }
        }

        async fn launch() -> Result<Running, String> {
            let config = BrowserConfig::builder()
                .no_sandbox()
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .window_size(1920, 1080)
                .build()?;

            let (browser, mut handler) = Browser::launch(config)
                .await
                .map_err(|e| e.to_string())?;

            // The handler must be polled for the browser to make progress
            let handle = tokio::spawn(async move {
                while handler.next().await.is_some() {}
            });

            info!("Headless browser launched");
            Ok(Running { browser, _handler: handle })
        }

        async fn render(&self, url: &str) -> Result<String, String> {
            let running = self.running.get_or_try_init(Self::launch).await?;

            let page = running.browser.new_page(url).await.map_err(|e| e.to_string())?;
            page.wait_for_navigation().await.map_err(|e| e.to_string())?;
            tokio::time::sleep(self.settle).await;

            let html = page.content().await.map_err(|e| e.to_string());
            let _ = page.close().await;
            html
        }
    }

    #[async_trait]
    impl Fetcher for BrowserFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            debug!("RENDER {}", url);
            self.render(url)
                .await
                .map_err(|reason| FetchError::Browser { url: url.to_string(), reason })
        }
    }
}
