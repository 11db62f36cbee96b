use crate::dates::DateDialect;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Venue definition ──────────────────────────────────────────────────────────

/// How a venue's pages are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchStrategy {
    /// Plain HTTP GET with a fixed user agent.
    #[default]
    Http,
    /// Headless browser render, for listings built client-side.
    Browser,
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchStrategy::Http => f.pad("http"),
            FetchStrategy::Browser => f.pad("browser"),
        }
    }
}

/// Which traversal walks the listing container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingLayout {
    /// Every item carries self-contained date text.
    #[default]
    Generic,
    /// Items inherit year/month from heading elements interleaved between them.
    HeadingContext,
}

/// One venue, as declared in config. Read-only for the length of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VenueDefinition {
    pub name: String,

    #[serde(default = "default_true")]
    pub active: bool,

    pub root_url: String,
    pub url: String,

    #[serde(default)]
    pub fetch_strategy: FetchStrategy,

    #[serde(default)]
    pub link_relative: bool,

    pub container_selector: String,
    pub link_selector: String,
    pub image_selector: String,
    pub title_selector: String,
    pub date_selector: String,

    #[serde(default)]
    pub next_selector: Option<String>,

    #[serde(default)]
    pub date_dialect: DateDialect,

    #[serde(default)]
    pub layout: ListingLayout,

    #[serde(default)]
    pub heading_selector: Option<String>,
}

fn default_true() -> bool {
    true
}

// ── Show ──────────────────────────────────────────────────────────────────────

/// A show extracted from a listing. `start_date <= end_date` always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Show {
    pub name: String,
    pub theatre: String,
    pub image_url: String,
    pub link_url: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Show {
    /// Dedup key used by storage.
    pub fn key(&self) -> (&str, &str, NaiveDate, NaiveDate) {
        (&self.theatre, &self.name, self.start_date, self.end_date)
    }
}

// ── Raw item fields ───────────────────────────────────────────────────────────

/// Field text pulled out of one listing item, before dates are resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    pub title: String,
    pub image_url: String,
    pub link_url: String,
    pub date_text: String,
}
