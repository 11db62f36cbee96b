use crate::models::VenueDefinition;
use crate::scraper::parsers::ListingSelectors;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub venues: Vec<VenueDefinition>,
}

/// Fetcher and pagination configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Upper bound on listing pages followed per venue
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Extra wait after navigation before the browser DOM is read
    #[serde(default = "default_browser_settle_ms")]
    pub browser_settle_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Venues scraped at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    500
}
fn default_jitter_ms() -> u64 {
    250
}
fn default_max_retries() -> u32 {
    2
}
fn default_user_agent() -> String {
    "whatson/0.1.0".to_string()
}
fn default_max_pages() -> usize {
    25
}
fn default_browser_settle_ms() -> u64 {
    1500
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/whatson.duckdb")
}
fn default_true() -> bool {
    true
}
fn default_concurrency() -> usize {
    4
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
            browser_settle_ms: default_browser_settle_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            run_migrations: true,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from config/default.toml, config/local.toml, an
    /// optional explicit file and `WHATSON__*` environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            );

        if let Some(path) = explicit {
            builder = builder.add_source(
                config::File::from(path)
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        let cfg = builder
            .add_source(config::Environment::with_prefix("WHATSON").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let app_cfg: AppConfig = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("Invalid configuration")?;
        app_cfg.validate()?;
        Ok(app_cfg)
    }

    /// Reject duplicate names, unparseable URLs and selectors that do not compile.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for venue in &self.venues {
            if !seen.insert(venue.name.as_str()) {
                bail!("venue {:?} is defined more than once", venue.name);
            }
            for (key, value) in [("url", &venue.url), ("root-url", &venue.root_url)] {
                url::Url::parse(value)
                    .with_context(|| format!("venue {:?}: invalid {} {:?}", venue.name, key, value))?;
            }
            ListingSelectors::compile(venue)
                .with_context(|| format!("venue {:?}: invalid selectors", venue.name))?;
        }
        Ok(())
    }

    pub fn venue(&self, name: &str) -> Option<&VenueDefinition> {
        self.venues.iter().find(|v| v.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateDialect;
    use crate::models::{FetchStrategy, ListingLayout};

    const SAMPLE: &str = r#"
[scraper]
max_pages = 3

[[venues]]
name = "belgrade"
root-url = "http://www.belgrade.co.uk"
url = "http://www.belgrade.co.uk/whats-on/"
fetch-strategy = "http"
link-relative = true
container-selector = "div.list-productions"
link-selector = "a.production-link"
image-selector = "a.production-link > img"
title-selector = "h3"
date-selector = "p.date"
layout = "heading-context"
heading-selector = "h2"

[[venues]]
name = "hippodrome"
active = false
root-url = "https://www.birminghamhippodrome.com"
url = "https://www.birminghamhippodrome.com/whats-on/"
fetch-strategy = "browser"
container-selector = "ul.main-events-list"
link-selector = "a.block"
image-selector = "a.block img"
title-selector = "h5.performance-listing-title"
date-selector = "p.performance-listing-date"
next-selector = "a.next"
date-dialect = "dual-separator"
"#;

    #[test]
    fn test_parse_venues() {
        let cfg = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.venues.len(), 2);
        assert_eq!(cfg.scraper.max_pages, 3);
        assert_eq!(cfg.scraper.user_agent, "whatson/0.1.0");

        let belgrade = cfg.venue("belgrade").unwrap();
        assert!(belgrade.active);
        assert!(belgrade.link_relative);
        assert_eq!(belgrade.layout, ListingLayout::HeadingContext);
        assert_eq!(belgrade.next_selector, None);
        assert_eq!(belgrade.date_dialect, DateDialect::Default);

        let hippodrome = cfg.venue("hippodrome").unwrap();
        assert!(!hippodrome.active);
        assert_eq!(hippodrome.fetch_strategy, FetchStrategy::Browser);
        assert_eq!(hippodrome.next_selector.as_deref(), Some("a.next"));
        assert_eq!(hippodrome.date_dialect, DateDialect::DualSeparator);
    }

    #[test]
    fn test_defaults_without_sections() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert!(cfg.venues.is_empty());
        assert_eq!(cfg.pipeline.concurrency, 4);
        assert!(cfg.storage.run_migrations);
    }

    #[test]
    fn test_rejects_duplicate_venue() {
        let doubled = format!("{SAMPLE}\n{}", &SAMPLE[SAMPLE.find("[[venues]]").unwrap()..]);
        let err = AppConfig::from_toml_str(&doubled).unwrap_err();
        assert!(format!("{err:#}").contains("more than once"));
    }

    #[test]
    fn test_rejects_bad_selector() {
        let broken = SAMPLE.replace("p.performance-listing-date", "p[[");
        let err = AppConfig::from_toml_str(&broken).unwrap_err();
        assert!(format!("{err:#}").contains("hippodrome"));
    }

    #[test]
    fn test_shipped_defaults_are_valid() {
        let cfg = AppConfig::from_toml_str(include_str!("../../config/default.toml")).unwrap();
        assert!(cfg.venues.iter().any(|v| v.layout == ListingLayout::HeadingContext));
        assert!(cfg.venues.iter().any(|v| !v.active));
    }

    #[test]
    fn test_heading_layout_requires_heading_selector() {
        let broken = SAMPLE.replace("heading-selector = \"h2\"\n", "");
        assert!(AppConfig::from_toml_str(&broken).is_err());
    }
}
