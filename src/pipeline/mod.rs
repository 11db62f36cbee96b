//! Ingestion driver: venues → scraper → storage.
//!
//! Each venue is scraped on its own tokio task, at most `pipeline.concurrency`
//! at a time. Tasks only fetch and extract; shows are written to DuckDB from
//! the driving task as each venue finishes, so the connection never crosses
//! threads. A failing venue is logged and recorded and the run carries on.

use crate::config::AppConfig;
use crate::models::{Show, VenueDefinition};
use crate::scraper::{Fetcher, Fetchers, ScrapeError, VenueScraper};
use crate::storage::{Repository, VenueRunRecord};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};

/// What one venue's scrape produced. `shows` holds everything extracted
/// before `error`, if there was one.
#[derive(Debug)]
pub struct VenueScrape {
    pub venue: String,
    pub shows: Vec<Show>,
    pub pages: usize,
    pub error: Option<ScrapeError>,
}

impl VenueScrape {
    fn failed(venue: String, error: ScrapeError) -> Self {
        Self { venue, shows: Vec::new(), pages: 0, error: Some(error) }
    }

    /// Unwrap a joined scrape task. A task that could not run or panicked
    /// still yields a failed scrape so it gets recorded like any other.
    fn joined(venue: String, result: Result<Result<VenueScrape>, JoinError>) -> Self {
        let reason = match result {
            Ok(Ok(scrape)) => return scrape,
            Ok(Err(e)) => format!("{e:#}"),
            Err(e) => {
                error!("Task panic for {}: {}", venue, e);
                e.to_string()
            }
        };
        let error = ScrapeError::Task { venue: venue.clone(), reason };
        Self::failed(venue, error)
    }
}

/// Fetch a venue's first page and drain its show stream.
pub async fn scrape_venue(
    venue: VenueDefinition,
    fetcher: Arc<dyn Fetcher>,
    max_pages: usize,
) -> VenueScrape {
    let name = venue.name.clone();
    let scraper = match VenueScraper::new(venue) {
        Ok(s) => s,
        Err(e) => return VenueScrape::failed(name, e),
    };

    let url = scraper.venue().url.clone();
    let html = match fetcher.fetch(&url).await {
        Ok(html) => html,
        Err(e) => return VenueScrape::failed(name, e.into()),
    };

    let drained = scraper.scrape(&html, &url, fetcher, max_pages).drain().await;
    debug!("{}: stopped after {} pages ({:?})", name, drained.pages, drained.stop);
    VenueScrape {
        venue: name,
        shows: drained.shows,
        pages: drained.pages,
        error: drained.error,
    }
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Open the configured database and ingest every active venue, or only
    /// `only` when given.
    pub async fn run(&self, only: Option<&str>, reset: bool) -> Result<PipelineStats> {
        let repo = Repository::open(&self.config.storage.db_path).context("Failed to open DuckDB")?;

        if reset {
            repo.reset()?;
        } else if self.config.storage.run_migrations {
            repo.run_migrations()?;
        }

        let fetchers = Fetchers::new(&self.config.scraper).context("Failed to build fetchers")?;
        self.ingest(&repo, &fetchers, only).await
    }

    fn selected_venues(&self, only: Option<&str>) -> Result<Vec<VenueDefinition>> {
        if let Some(name) = only {
            let Some(venue) = self.config.venue(name) else {
                bail!("no venue named {:?} in configuration", name);
            };
            if !venue.active {
                warn!("{}: venue is inactive, scraping it because it was asked for", name);
            }
            return Ok(vec![venue.clone()]);
        }

        let (active, inactive): (Vec<_>, Vec<_>) =
            self.config.venues.iter().cloned().partition(|v| v.active);
        for venue in &inactive {
            info!("{}: inactive, skipped", venue.name);
        }
        Ok(active)
    }

    pub async fn ingest(
        &self,
        repo: &Repository,
        fetchers: &Fetchers,
        only: Option<&str>,
    ) -> Result<PipelineStats> {
        let venues = self.selected_venues(only)?;
        let run_id = repo.begin_scrape_run()?;
        info!("=== Run {}: scraping {} venues ===", run_id, venues.len());

        let sem = Arc::new(Semaphore::new(self.config.pipeline.concurrency.max(1)));
        let max_pages = self.config.scraper.max_pages;
        let mut stats = PipelineStats::default();
        let mut handles = Vec::new();

        for venue in venues {
            let name = venue.name.clone();
            let fetcher = match fetchers.get(venue.fetch_strategy) {
                Ok(f) => f,
                Err(e) => {
                    self.record(repo, run_id, VenueScrape::failed(name, e.into()), &mut stats)?;
                    continue;
                }
            };
            let sem = Arc::clone(&sem);

            let handle = tokio::spawn(async move {
                let _permit = sem.acquire_owned().await?;
                Ok::<_, anyhow::Error>(scrape_venue(venue, fetcher, max_pages).await)
            });
            handles.push((name, handle));
        }

        for (name, handle) in handles {
            let scrape = VenueScrape::joined(name, handle.await);
            self.record(repo, run_id, scrape, &mut stats)?;
        }

        repo.finish_scrape_run(run_id, stats.succeeded.len(), stats.failed.len(), stats.shows_inserted)?;

        info!(
            "=== Done: {} venues ok | {} failed | {} shows found | {} new | {} already stored ===",
            stats.succeeded.len(),
            stats.failed.len(),
            stats.shows_found,
            stats.shows_inserted,
            stats.shows_found - stats.shows_inserted,
        );
        Ok(stats)
    }

    /// Persist whatever the venue produced and log its outcome.
    fn record(
        &self,
        repo: &Repository,
        run_id: i64,
        scrape: VenueScrape,
        stats: &mut PipelineStats,
    ) -> Result<()> {
        let inserted = repo
            .insert_shows(&scrape.shows)
            .with_context(|| format!("storing shows for {}", scrape.venue))?;
        let error = scrape.error.as_ref().map(|e| e.to_string());

        repo.record_venue_run(
            run_id,
            &VenueRunRecord {
                venue: &scrape.venue,
                pages: scrape.pages,
                shows_found: scrape.shows.len(),
                shows_inserted: inserted,
                error: error.as_deref(),
            },
        )?;

        stats.shows_found += scrape.shows.len();
        stats.shows_inserted += inserted;

        match error {
            None => {
                info!(
                    "{}: {} shows over {} pages ({} new)",
                    scrape.venue,
                    scrape.shows.len(),
                    scrape.pages,
                    inserted
                );
                stats.succeeded.push((scrape.venue, scrape.shows.len()));
            }
            Some(msg) => {
                warn!(
                    "{}: failed after {} shows ({} kept): {}",
                    scrape.venue,
                    scrape.shows.len(),
                    inserted,
                    msg
                );
                stats.failed.push((scrape.venue, msg));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Venue name and shows extracted
    pub succeeded: Vec<(String, usize)>,
    /// Venue name and the error that stopped it
    pub failed: Vec<(String, String)>,
    pub shows_found: usize,
    pub shows_inserted: usize,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
