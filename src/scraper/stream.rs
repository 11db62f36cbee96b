//! Lazy, pull-based show sequence spanning every page of a venue listing.
//!
//! Pages are extracted eagerly one at a time and buffered; the next page is
//! fetched only once the current buffer is drained.

use super::listing::{PageExtract, VenueScraper};
use super::{Fetcher, ScrapeError};
use crate::models::Show;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    ScanningPage,
    Done,
}

/// Why the stream stopped following next links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoNextLink,
    PageLimit,
    Cycle,
    Failed,
}

/// Finite, non-restartable sequence of shows. Once `next` has returned an
/// error or `None`, every later call returns `None`.
pub struct ShowStream {
    scraper: VenueScraper,
    fetcher: Arc<dyn Fetcher>,
    state: ScanState,
    buffered: VecDeque<Show>,
    pending_error: Option<ScrapeError>,
    next_url: Option<String>,
    visited: HashSet<String>,
    pages_seen: usize,
    max_pages: usize,
    stop_reason: Option<StopReason>,
}

/// What a fully drained stream produced. Shows extracted before a failure are
/// kept alongside the error.
#[derive(Debug, Default)]
pub struct Drained {
    pub shows: Vec<Show>,
    pub pages: usize,
    pub error: Option<ScrapeError>,
    pub stop: Option<StopReason>,
}

impl ShowStream {
    pub(crate) fn start(
        scraper: VenueScraper,
        html: &str,
        page_url: &str,
        fetcher: Arc<dyn Fetcher>,
        max_pages: usize,
    ) -> Self {
        let mut stream = Self {
            scraper,
            fetcher,
            state: ScanState::ScanningPage,
            buffered: VecDeque::new(),
            pending_error: None,
            next_url: None,
            visited: HashSet::new(),
            pages_seen: 0,
            max_pages: max_pages.max(1),
            stop_reason: None,
        };
        stream.load_page(html, page_url);
        stream
    }

    fn venue_name(&self) -> &str {
        &self.scraper.venue().name
    }

    fn load_page(&mut self, html: &str, page_url: &str) {
        self.pages_seen += 1;
        self.visited.insert(page_url.to_string());

        let PageExtract { shows, error, next_url } = match self.scraper.extract_page(html, page_url) {
            Ok(page) => page,
            Err(e) => PageExtract { error: Some(e), ..Default::default() },
        };
        info!(
            "{}: page {} ({}) yielded {} shows",
            self.venue_name(),
            self.pages_seen,
            page_url,
            shows.len()
        );

        self.buffered.extend(shows);
        if error.is_some() {
            self.pending_error = error;
            self.next_url = None;
        } else {
            self.next_url = next_url;
        }
    }

    fn stop(&mut self, reason: StopReason) {
        match reason {
            StopReason::NoNextLink => debug!("{}: no next page after page {}", self.venue_name(), self.pages_seen),
            StopReason::PageLimit => warn!(
                "{}: stopping at page limit ({} pages)",
                self.venue_name(),
                self.max_pages
            ),
            StopReason::Cycle => warn!("{}: next link revisits a page, stopping", self.venue_name()),
            StopReason::Failed => debug!("{}: stopping after error", self.venue_name()),
        }
        self.state = ScanState::Done;
        self.stop_reason = Some(reason);
    }

    /// The next show, fetching the following page when the current one is used up.
    pub async fn next(&mut self) -> Option<Result<Show, ScrapeError>> {
        loop {
            if let Some(show) = self.buffered.pop_front() {
                return Some(Ok(show));
            }
            if self.state == ScanState::Done {
                return None;
            }
            if let Some(err) = self.pending_error.take() {
                self.stop(StopReason::Failed);
                return Some(Err(err));
            }

            let Some(url) = self.next_url.take() else {
                self.stop(StopReason::NoNextLink);
                return None;
            };
            if self.visited.contains(&url) {
                self.stop(StopReason::Cycle);
                return None;
            }
            if self.pages_seen >= self.max_pages {
                self.stop(StopReason::PageLimit);
                return None;
            }

            match self.fetcher.fetch(&url).await {
                Ok(html) => self.load_page(&html, &url),
                Err(e) => {
                    self.stop(StopReason::Failed);
                    return Some(Err(e.into()));
                }
            }
        }
    }

    /// Pull every show, keeping what was extracted before any error.
    pub async fn drain(mut self) -> Drained {
        let mut drained = Drained::default();
        while let Some(item) = self.next().await {
            match item {
                Ok(show) => drained.shows.push(show),
                Err(e) => drained.error = Some(e),
            }
        }
        drained.pages = self.pages_seen;
        drained.stop = self.stop_reason;
        drained
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
