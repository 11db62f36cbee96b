//! Per-page extraction: the generic selector walk and the heading-context
//! override, behind one [`VenueScraper`] type chosen from the venue's layout.

use super::cleaner::assemble_show;
use super::parsers::{container_children, extract_item, next_page_url, ListingSelectors};
use super::stream::ShowStream;
use super::{Fetcher, ScrapeError};
use crate::dates::{self, parse_heading, shift_years, DateContext, ResolvedDate};
use crate::models::{ListingLayout, RawItem, Show, VenueDefinition};
use chrono::Datelike;
use scraper::{ElementRef, Html};
use std::sync::Arc;
use tracing::debug;

/// Everything one page yields. `error` stops the scrape after `shows` have
/// been handed out; `next_url` is ignored when it is set.
#[derive(Debug, Default)]
pub struct PageExtract {
    pub shows: Vec<Show>,
    pub error: Option<ScrapeError>,
    pub next_url: Option<String>,
}

/// Extraction strategy for one venue.
#[derive(Debug, Clone)]
pub enum VenueScraper {
    Generic(Listing),
    HeadingContext(Listing),
}

/// A venue definition with its selectors compiled.
#[derive(Debug, Clone)]
pub struct Listing {
    venue: VenueDefinition,
    selectors: ListingSelectors,
}

impl VenueScraper {
    pub fn new(venue: VenueDefinition) -> Result<Self, ScrapeError> {
        let selectors = ListingSelectors::compile(&venue)?;
        let listing = Listing { venue, selectors };
        Ok(match listing.venue.layout {
            ListingLayout::Generic => VenueScraper::Generic(listing),
            ListingLayout::HeadingContext => VenueScraper::HeadingContext(listing),
        })
    }

    pub fn venue(&self) -> &VenueDefinition {
        match self {
            VenueScraper::Generic(l) | VenueScraper::HeadingContext(l) => &l.venue,
        }
    }

    /// Start a lazy show stream from the first page's HTML. Later pages are
    /// pulled through `fetcher` only as the stream is drained.
    pub fn scrape(
        self,
        html: &str,
        page_url: &str,
        fetcher: Arc<dyn Fetcher>,
        max_pages: usize,
    ) -> ShowStream {
        ShowStream::start(self, html, page_url, fetcher, max_pages)
    }

    /// Extract one page. `Err` only when the container itself is missing.
    pub fn extract_page(&self, html: &str, page_url: &str) -> Result<PageExtract, ScrapeError> {
        let doc = Html::parse_document(html);
        let (listing, mut page) = match self {
            VenueScraper::Generic(l) => (l, l.generic_items(&doc)?),
            VenueScraper::HeadingContext(l) => (l, l.heading_items(&doc)?),
        };

        if page.error.is_none() {
            match next_page_url(&doc, &listing.selectors, page_url) {
                Ok(next) => page.next_url = next,
                Err(e) => page.error = Some(e),
            }
        }
        Ok(page)
    }
}

impl Listing {
    fn children<'a>(&self, doc: &'a Html) -> Result<Vec<ElementRef<'a>>, ScrapeError> {
        container_children(doc, &self.selectors).ok_or_else(|| ScrapeError::ContainerNotFound {
            venue: self.venue.name.clone(),
            selector: self.venue.container_selector.clone(),
        })
    }

    fn item(&self, child: &ElementRef<'_>, index: usize) -> Option<RawItem> {
        let item = extract_item(child, &self.selectors);
        if item.is_none() {
            debug!(
                "{}: child {} <{}> is not a listing item",
                self.venue.name,
                index,
                child.value().name()
            );
        }
        item
    }

    fn date_error(&self, source: dates::DateParseError) -> ScrapeError {
        ScrapeError::Date { venue: self.venue.name.clone(), source }
    }

    /// Each item's date text stands on its own.
    fn generic_items(&self, doc: &Html) -> Result<PageExtract, ScrapeError> {
        let mut page = PageExtract::default();

        for (index, child) in self.children(doc)?.iter().enumerate() {
            let Some(raw) = self.item(child, index) else {
                continue;
            };
            match dates::resolve(&raw.date_text, self.venue.date_dialect, None) {
                Ok(resolved) => page.shows.push(assemble_show(&self.venue, raw, resolved)),
                Err(e) => {
                    page.error = Some(self.date_error(e));
                    break;
                }
            }
        }
        Ok(page)
    }

    /// Headings interleaved with items carry the year (and often the month)
    /// the following items' date text leaves out. The scan state starts empty
    /// on every page.
    fn heading_items(&self, doc: &Html) -> Result<PageExtract, ScrapeError> {
        let mut page = PageExtract::default();
        let mut scan = DateContext::default();

        for (index, child) in self.children(doc)?.iter().enumerate() {
            if self.is_heading(child) {
                let text = super::parsers::element_text(child);
                match parse_heading(&text) {
                    Some(heading) => {
                        scan = DateContext {
                            year: heading.year.or(scan.year),
                            month: heading.month,
                        };
                        debug!("{}: heading {:?} → {:?}", self.venue.name, text, scan);
                    }
                    None => debug!("{}: ignoring heading {:?}", self.venue.name, text),
                }
                continue;
            }

            let Some(raw) = self.item(child, index) else {
                continue;
            };
            let resolved = dates::resolve_in_context(&raw.date_text, self.venue.date_dialect, scan)
                .and_then(|resolved| anchor_to_heading(resolved, scan, &raw.date_text));
            match resolved {
                Ok(resolved) => page.shows.push(assemble_show(&self.venue, raw, resolved)),
                Err(e) => {
                    page.error = Some(self.date_error(e));
                    break;
                }
            }
        }
        Ok(page)
    }

    fn is_heading(&self, child: &ElementRef<'_>) -> bool {
        self.selectors
            .heading
            .as_ref()
            .is_some_and(|sel| sel.matches(child))
    }
}

/// A heading names the month a show starts in. When year rollback pushed a
/// range start into the year before the heading, move the range forward.
/// Text that spells out its own year is left alone.
fn anchor_to_heading(
    resolved: ResolvedDate,
    scan: DateContext,
    text: &str,
) -> Result<ResolvedDate, dates::DateParseError> {
    let (ResolvedDate::Range(range), Some(year)) = (resolved, scan.year) else {
        return Ok(resolved);
    };
    if range.start.year() >= year || dates::has_explicit_year(text) {
        return Ok(resolved);
    }

    let invalid = || dates::DateParseError::InvalidDate { text: text.to_string() };
    let start = shift_years(range.start, 1).ok_or_else(invalid)?;
    let end = shift_years(range.end, 1).ok_or_else(invalid)?;
    Ok(ResolvedDate::Range(dates::DateRange { start, end }))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn belgrade() -> VenueDefinition {
        VenueDefinition {
            name: "belgrade".into(),
            active: true,
            root_url: "http://www.belgrade.co.uk".into(),
            url: "http://www.belgrade.co.uk/whats-on/".into(),
            fetch_strategy: Default::default(),
            link_relative: true,
            container_selector: "div.list-productions".into(),
            link_selector: "a.production-link".into(),
            image_selector: "a.production-link img".into(),
            title_selector: "h3".into(),
            date_selector: "p.date".into(),
            next_selector: None,
            date_dialect: Default::default(),
            layout: ListingLayout::HeadingContext,
            heading_selector: Some("h2".into()),
        }
    }

    fn production(title: &str, date_text: &str) -> String {
        format!(
            r#"<div class="production-list-item">
                 <a class="production-link" href="/productions/{slug}"><img src="/img/{slug}.jpg"></a>
                 <h3>{title}</h3><p class="date">{date_text}</p>
               </div>"#,
            slug = title.to_lowercase().replace(' ', "-"),
        )
    }

    #[test]
    fn test_heading_context_threads_year_and_month() {
        let html = format!(
            r#"<div class="list-productions">
                 <div id="production-navigation">Filter</div>
                 <h2>September 2019</h2>
                 {}
                 <h2>October 2019</h2>
                 {}
                 {}
                 <h2>December 2019</h2>
                 {}
                 <h2>January 2020</h2>
                 {}
               </div>"#,
            production("Opening Night", "Fri 13th September"),
            production("Matinee", "Wed 2nd October"),
            production("Half Term", "Tue 29th - Sat 2nd November"),
            production("Panto", "Sat 28th December - Sun 3rd January"),
            production("New Year", "15th"),
        );

        let scraper = VenueScraper::new(belgrade()).unwrap();
        let page = scraper.extract_page(&html, "http://www.belgrade.co.uk/whats-on/").unwrap();
        assert!(page.error.is_none(), "{:?}", page.error);
        assert_eq!(page.next_url, None);

        let bounds: Vec<_> = page.shows.iter().map(|s| (s.start_date, s.end_date)).collect();
        assert_eq!(
            bounds,
            vec![
                (date(2019, 9, 13), date(2019, 9, 13)),
                (date(2019, 10, 2), date(2019, 10, 2)),
                (date(2019, 10, 29), date(2019, 11, 2)),
                (date(2019, 12, 28), date(2020, 1, 3)),
                (date(2020, 1, 15), date(2020, 1, 15)),
            ]
        );
        assert_eq!(page.shows[0].link_url, "http://www.belgrade.co.uk/productions/opening-night");
    }

    #[test]
    fn test_generic_date_error_keeps_earlier_items() {
        let mut venue = belgrade();
        venue.layout = ListingLayout::Generic;
        venue.heading_selector = None;
        let html = format!(
            r#"<div class="list-productions">{}{}{}</div>"#,
            production("First", "14 September 2019"),
            production("Broken", "Coming soon"),
            production("Never Reached", "15 September 2019"),
        );

        let page = VenueScraper::new(venue)
            .unwrap()
            .extract_page(&html, "http://www.belgrade.co.uk/whats-on/")
            .unwrap();
        assert_eq!(page.shows.len(), 1);
        assert!(matches!(page.error, Some(ScrapeError::Date { .. })));
    }

    #[test]
    fn test_missing_container_is_fatal() {
        let err = VenueScraper::new(belgrade())
            .unwrap()
            .extract_page("<div class='other'></div>", "http://www.belgrade.co.uk/")
            .unwrap_err();
        assert!(matches!(err, ScrapeError::ContainerNotFound { .. }));
    }

    #[test]
    fn test_anchor_leaves_ranges_in_heading_year() {
        let scan = DateContext { year: Some(2019), month: Some(12) };
        let range = ResolvedDate::Range(dates::DateRange { start: date(2019, 12, 1), end: date(2019, 12, 4) });
        assert_eq!(anchor_to_heading(range, scan, "").unwrap(), range);

        let rolled = ResolvedDate::Range(dates::DateRange { start: date(2018, 12, 28), end: date(2019, 1, 3) });
        assert_eq!(
            anchor_to_heading(rolled, scan, "28 dec - 3 jan").unwrap(),
            ResolvedDate::Range(dates::DateRange { start: date(2019, 12, 28), end: date(2020, 1, 3) })
        );
        assert_eq!(anchor_to_heading(rolled, scan, "28 dec - 3 jan 2019").unwrap(), rolled);
    }
}
