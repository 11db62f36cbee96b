use crate::dates::ResolvedDate;
use crate::models::{RawItem, Show, VenueDefinition};

// ── URLs ──────────────────────────────────────────────────────────────────────

/// Prefix `link` with the venue root when the venue declares relative links.
/// "https://x.co.uk/" + "/shows/a" → "https://x.co.uk/shows/a"
pub fn absolute_link(venue: &VenueDefinition, link: &str) -> String {
    let link = link.trim();
    if !venue.link_relative || link.starts_with("http://") || link.starts_with("https://") {
        return link.to_string();
    }
    format!(
        "{}/{}",
        venue.root_url.trim_end_matches('/'),
        link.trim_start_matches('/')
    )
}

// ── Show assembly ─────────────────────────────────────────────────────────────

/// Combine extracted fields and resolved dates into a [`Show`].
pub fn assemble_show(venue: &VenueDefinition, raw: RawItem, dates: ResolvedDate) -> Show {
    let (start_date, end_date) = dates.bounds();
    Show {
        name: raw.title,
        theatre: venue.name.clone(),
        image_url: absolute_link(venue, &raw.image_url),
        link_url: absolute_link(venue, &raw.link_url),
        start_date,
        end_date,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateRange;
    use chrono::NaiveDate;

    fn venue(link_relative: bool) -> VenueDefinition {
        VenueDefinition {
            name: "belgrade".into(),
            active: true,
            root_url: "http://www.belgrade.co.uk/".into(),
            url: "http://www.belgrade.co.uk/whats-on/".into(),
            fetch_strategy: Default::default(),
            link_relative,
            container_selector: "div".into(),
            link_selector: "a".into(),
            image_selector: "img".into(),
            title_selector: "h3".into(),
            date_selector: "p".into(),
            next_selector: None,
            date_dialect: Default::default(),
            layout: Default::default(),
            heading_selector: None,
        }
    }

    fn raw() -> RawItem {
        RawItem {
            title: "Blood Brothers".into(),
            image_url: "/media/bb.jpg".into(),
            link_url: "productions/blood-brothers".into(),
            date_text: "unused".into(),
        }
    }

    #[test]
    fn test_absolute_link() {
        let v = venue(true);
        assert_eq!(absolute_link(&v, "/a/b"), "http://www.belgrade.co.uk/a/b");
        assert_eq!(absolute_link(&v, "a/b"), "http://www.belgrade.co.uk/a/b");
        assert_eq!(absolute_link(&v, "https://cdn.x/a.jpg"), "https://cdn.x/a.jpg");
        assert_eq!(absolute_link(&venue(false), "/a/b"), "/a/b");
    }

    #[test]
    fn test_single_date_flattens() {
        let day = NaiveDate::from_ymd_opt(2019, 9, 14).unwrap();
        let show = assemble_show(&venue(true), raw(), ResolvedDate::Single(day));
        assert_eq!(show.start_date, day);
        assert_eq!(show.end_date, day);
        assert_eq!(show.theatre, "belgrade");
        assert_eq!(show.link_url, "http://www.belgrade.co.uk/productions/blood-brothers");
        assert_eq!(show.image_url, "http://www.belgrade.co.uk/media/bb.jpg");
    }

    #[test]
    fn test_range_keeps_bounds() {
        let start = NaiveDate::from_ymd_opt(2019, 12, 28).unwrap();
        let end = NaiveDate::from_ymd_opt(2020, 1, 3).unwrap();
        let show = assemble_show(&venue(false), raw(), ResolvedDate::Range(DateRange { start, end }));
        assert_eq!((show.start_date, show.end_date), (start, end));
        assert_eq!(show.key(), ("belgrade", "Blood Brothers", start, end));
    }
}
