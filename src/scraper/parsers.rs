use super::ScrapeError;
use crate::models::{ListingLayout, RawItem, VenueDefinition};
use scraper::{ElementRef, Html, Selector};

// ── Selectors ─────────────────────────────────────────────────────────────────

pub fn compile(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// A venue's selectors, compiled once per scrape.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    pub container: Selector,
    pub link: Selector,
    pub image: Selector,
    pub title: Selector,
    pub date: Selector,
    pub next: Option<Selector>,
    pub heading: Option<Selector>,
}

impl ListingSelectors {
    pub fn compile(venue: &VenueDefinition) -> Result<Self, ScrapeError> {
        let heading = match (venue.layout, venue.heading_selector.as_deref()) {
            (_, Some(sel)) => Some(compile(sel)?),
            (ListingLayout::HeadingContext, None) => {
                return Err(ScrapeError::InvalidSelector {
                    selector: "heading-selector".to_string(),
                    reason: "heading-context layout needs a heading-selector".to_string(),
                });
            }
            (ListingLayout::Generic, None) => None,
        };

        Ok(Self {
            container: compile(&venue.container_selector)?,
            link: compile(&venue.link_selector)?,
            image: compile(&venue.image_selector)?,
            title: compile(&venue.title_selector)?,
            date: compile(&venue.date_selector)?,
            next: venue.next_selector.as_deref().map(compile).transpose()?,
            heading,
        })
    }
}

// ── Text helpers ──────────────────────────────────────────────────────────────

/// Element text with runs of whitespace collapsed.
pub fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_match<'a>(scope: &ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    scope.select(selector).next()
}

/// Image source, falling back to the lazy-loading attributes listings use.
fn image_source(img: &ElementRef<'_>) -> Option<String> {
    let attrs = img.value();
    attrs
        .attr("src")
        .or_else(|| attrs.attr("data-src"))
        .map(str::to_string)
        .or_else(|| {
            attrs
                .attr("data-srcset")
                .or_else(|| attrs.attr("srcset"))
                .and_then(|set| set.split_whitespace().next())
                .map(str::to_string)
        })
        .filter(|s| !s.trim().is_empty())
}

// ── Item extraction ───────────────────────────────────────────────────────────

/// Direct child elements of the listing container, or `None` when the
/// container selector matches nothing.
pub fn container_children<'a>(doc: &'a Html, selectors: &ListingSelectors) -> Option<Vec<ElementRef<'a>>> {
    let container = doc.select(&selectors.container).next()?;
    Some(container.children().filter_map(ElementRef::wrap).collect())
}

/// Pull the four fields out of one container child. `None` means the child is
/// not a listing item (a heading, a separator, an advert).
pub fn extract_item(child: &ElementRef<'_>, selectors: &ListingSelectors) -> Option<RawItem> {
    let title = element_text(&first_match(child, &selectors.title)?);
    let image_url = image_source(&first_match(child, &selectors.image)?)?;
    let link_url = first_match(child, &selectors.link)?
        .value()
        .attr("href")?
        .to_string();
    let date_text = element_text(&first_match(child, &selectors.date)?);

    if title.is_empty() || date_text.is_empty() {
        return None;
    }

    Some(RawItem { title, image_url, link_url, date_text })
}

// ── Pagination ────────────────────────────────────────────────────────────────

fn is_disabled(el: &ElementRef<'_>) -> bool {
    let attrs = el.value();
    attrs.classes().any(|c| c.eq_ignore_ascii_case("disabled"))
        || attrs.attr("disabled").is_some()
        || attrs.attr("aria-disabled") == Some("true")
}

/// The next-page URL, resolved against the page it was found on. `None` when
/// the venue has no next selector, nothing matches, the link is disabled or
/// has no href.
pub fn next_page_url(
    doc: &Html,
    selectors: &ListingSelectors,
    page_url: &str,
) -> Result<Option<String>, ScrapeError> {
    let Some(next_sel) = &selectors.next else {
        return Ok(None);
    };
    let Some(link) = doc.select(next_sel).next() else {
        return Ok(None);
    };
    if is_disabled(&link) {
        return Ok(None);
    }
    let Some(href) = link.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) else {
        return Ok(None);
    };

    let base = url::Url::parse(page_url).map_err(|e| ScrapeError::InvalidUrl {
        url: page_url.to_string(),
        reason: e.to_string(),
    })?;
    let next = base.join(href).map_err(|e| ScrapeError::InvalidUrl {
        url: href.to_string(),
        reason: e.to_string(),
    })?;
    Ok(Some(next.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
