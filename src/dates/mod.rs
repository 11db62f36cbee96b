//! Free-text listing dates → exact calendar dates.
//!
//! Venues write dates the way people read them: "14 September 2019",
//! "Wed 8 Apr - Sat 11 Apr 2020", "2 - 6 October 2019", "28 Dec - 3 Jan 2020".
//! The resolver turns such text into either a single [`NaiveDate`] or a
//! [`DateRange`] and is a pure function of its inputs plus the fallback year.
//!
//! ## Year inference
//!
//! Single dates: explicit year > context year > current year.
//!
//! Ranges, evaluated per side: explicit year on that side > explicit year on
//! the other side > context year > current year. If the start then lands after
//! the end, the start moves back exactly one year ("28 Dec - 3 Jan 2020").

use chrono::{Datelike, Local, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"20\d{2}").expect("valid year regex"));

/// Day number, optional ordinal suffix, month token, optional 4-digit year.
static DAY_MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?P<day>\d{1,2})(?:st|nd|rd|th)?\s*(?P<month>[a-z]+)\.?(?:,?\s*(?P<year>\d{4}))?")
        .expect("valid day/month regex")
});

static DAY_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<day>\d{1,2})(?:st|nd|rd|th)?\b").expect("valid day regex"));

static HEADING_YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<year>\d{4})\b").expect("valid heading regex"));

/// Full names first, then three-letter abbreviations; index % 12 is the month.
const MONTHS: [&str; 24] = [
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december",
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateParseError {
    #[error("cannot parse date text {text:?}")]
    Unrecognised { text: String },

    #[error("date text {text:?} does not name a real calendar day")]
    InvalidDate { text: String },

    #[error("date range {text:?} ends before it starts")]
    Inverted { text: String },
}

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedDate {
    Single(NaiveDate),
    Range(DateRange),
}

impl ResolvedDate {
    /// `(start, end)`; a single date is a one-day range.
    pub fn bounds(&self) -> (NaiveDate, NaiveDate) {
        match *self {
            ResolvedDate::Single(d) => (d, d),
            ResolvedDate::Range(r) => (r.start, r.end),
        }
    }
}

/// Year/month supplied from outside the date text, e.g. a "September 2019"
/// heading that precedes the item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateContext {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

/// Grammar variant a venue writes its dates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateDialect {
    /// `-` separates ranges.
    #[default]
    Default,
    /// `-` and `&` both separate ranges.
    DualSeparator,
    /// `-` separates ranges and a start without a month borrows the end's month.
    SingleMonthRange,
}

impl DateDialect {
    fn separators(self) -> &'static [char] {
        match self {
            DateDialect::DualSeparator => &['-', '&'],
            DateDialect::Default | DateDialect::SingleMonthRange => &['-'],
        }
    }

    fn split_range(self, text: &str) -> Option<(&str, &str)> {
        self.separators()
            .iter()
            .find_map(|sep| text.split_once(*sep))
    }
}

impl std::str::FromStr for DateDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(DateDialect::Default),
            "dual-separator" => Ok(DateDialect::DualSeparator),
            "single-month-range" => Ok(DateDialect::SingleMonthRange),
            other => Err(format!("unknown date dialect {other:?}")),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

pub fn current_year() -> i32 {
    Local::now().year()
}

/// Resolve `text` with an optional context year.
pub fn resolve(
    text: &str,
    dialect: DateDialect,
    context_year: Option<i32>,
) -> Result<ResolvedDate, DateParseError> {
    let ctx = DateContext { year: context_year, month: None };
    resolve_at(text, dialect, ctx, current_year())
}

pub fn resolve_in_context(
    text: &str,
    dialect: DateDialect,
    ctx: DateContext,
) -> Result<ResolvedDate, DateParseError> {
    resolve_at(text, dialect, ctx, current_year())
}

/// Same as [`resolve_in_context`] with the "now" year pinned by the caller.
pub fn resolve_at(
    text: &str,
    dialect: DateDialect,
    ctx: DateContext,
    fallback_year: i32,
) -> Result<ResolvedDate, DateParseError> {
    let text = normalize(text);

    match dialect.split_range(&text) {
        Some((left, right)) => {
            resolve_range(&text, left, right, dialect, ctx, fallback_year).map(ResolvedDate::Range)
        }
        None => {
            let parts = parse_side(&text).ok_or_else(|| unrecognised(&text))?;
            let year = parts.year.or(ctx.year).unwrap_or(fallback_year);
            let month = parts.month.or(ctx.month).ok_or_else(|| unrecognised(&text))?;
            build_date(&text, year, month, parts.day).map(ResolvedDate::Single)
        }
    }
}

/// "September 2019" → year and month, "2019" → year only.
pub fn parse_heading(text: &str) -> Option<DateContext> {
    let text = normalize(text);
    let year = HEADING_YEAR_RE
        .captures(&text)
        .and_then(|c| c["year"].parse().ok());
    let month = text
        .split(|c: char| !c.is_ascii_alphabetic())
        .find_map(month_number);

    if year.is_none() && month.is_none() {
        return None;
    }
    Some(DateContext { year, month })
}

/// Whether the text spells out a year of its own.
pub fn has_explicit_year(text: &str) -> bool {
    explicit_year(text).is_some()
}

/// Move a date by whole years; `None` when the day does not exist (29 Feb).
pub fn shift_years(date: NaiveDate, years: i32) -> Option<NaiveDate> {
    date.with_year(date.year() + years)
}

// ── Internals ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SideParts {
    day: u32,
    month: Option<u32>,
    year: Option<i32>,
}

fn normalize(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .replace(['\u{2013}', '\u{2014}'], "-")
}

fn unrecognised(text: &str) -> DateParseError {
    DateParseError::Unrecognised { text: text.to_string() }
}

/// Exact name or abbreviation, else a longer prefix of a full name ("sept").
fn month_number(token: &str) -> Option<u32> {
    MONTHS
        .iter()
        .position(|m| *m == token)
        .or_else(|| {
            if token.len() <= 3 {
                return None;
            }
            MONTHS[..12].iter().position(|m| m.starts_with(token))
        })
        .map(|i| (i % 12) as u32 + 1)
}

/// Day/month/year found in one side of the text. The month is `None` when
/// only a bare day number is present ("2" in "2 - 6 october").
fn parse_side(text: &str) -> Option<SideParts> {
    for caps in DAY_MONTH_RE.captures_iter(text) {
        let Some(month) = month_number(&caps["month"]) else {
            continue;
        };
        let Ok(day) = caps["day"].parse() else {
            continue;
        };
        let year = caps.name("year").and_then(|y| y.as_str().parse().ok());
        return Some(SideParts { day, month: Some(month), year });
    }

    let caps = DAY_ONLY_RE.captures(text)?;
    let day = caps["day"].parse().ok()?;
    Some(SideParts { day, month: None, year: None })
}

fn explicit_year(text: &str) -> Option<i32> {
    YEAR_RE.find(text).and_then(|m| m.as_str().parse().ok())
}

fn build_date(text: &str, year: i32, month: u32, day: u32) -> Result<NaiveDate, DateParseError> {
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| DateParseError::InvalidDate {
        text: text.to_string(),
    })
}

fn resolve_range(
    whole: &str,
    left: &str,
    right: &str,
    dialect: DateDialect,
    ctx: DateContext,
    fallback_year: i32,
) -> Result<DateRange, DateParseError> {
    let left_year = explicit_year(left);
    let right_year = explicit_year(right);

    let start_year = left_year.or(right_year).or(ctx.year).unwrap_or(fallback_year);
    let end_year = right_year.or(left_year).or(ctx.year).unwrap_or(fallback_year);

    let end_parts = parse_side(right).ok_or_else(|| unrecognised(whole))?;
    let start_parts = parse_side(left).ok_or_else(|| unrecognised(whole))?;

    let end_month = end_parts.month.or(ctx.month).ok_or_else(|| unrecognised(whole))?;
    let start_month = match (start_parts.month, dialect) {
        (Some(m), _) => m,
        (None, DateDialect::SingleMonthRange) => end_month,
        (None, _) => ctx.month.ok_or_else(|| unrecognised(whole))?,
    };

    let end = build_date(whole, end_parts.year.unwrap_or(end_year), end_month, end_parts.day)?;
    let mut start = build_date(
        whole,
        start_parts.year.unwrap_or(start_year),
        start_month,
        start_parts.day,
    )?;

    if start > end {
        start = shift_years(start, -1).ok_or_else(|| DateParseError::InvalidDate {
            text: whole.to_string(),
        })?;
    }
    if start > end {
        return Err(DateParseError::Inverted { text: whole.to_string() });
    }

    Ok(DateRange { start, end })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i32 = 2024;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn range(start: NaiveDate, end: NaiveDate) -> ResolvedDate {
        ResolvedDate::Range(DateRange { start, end })
    }

    fn at(text: &str, dialect: DateDialect, year: Option<i32>) -> Result<ResolvedDate, DateParseError> {
        resolve_at(text, dialect, DateContext { year, month: None }, NOW)
    }

    #[test]
    fn test_single_date_with_explicit_year() {
        assert_eq!(
            at("14 September 2019", DateDialect::Default, None),
            Ok(ResolvedDate::Single(date(2019, 9, 14)))
        );
    }

    #[test]
    fn test_single_date_year_priority() {
        // explicit beats context
        assert_eq!(
            at("14 September 2019", DateDialect::Default, Some(2021)),
            Ok(ResolvedDate::Single(date(2019, 9, 14)))
        );
        assert_eq!(
            at("14 September", DateDialect::Default, Some(2021)),
            Ok(ResolvedDate::Single(date(2021, 9, 14)))
        );
        assert_eq!(
            at("14 September", DateDialect::Default, None),
            Ok(ResolvedDate::Single(date(NOW, 9, 14)))
        );
    }

    #[test]
    fn test_weekday_and_ordinals_are_ignored() {
        assert_eq!(
            at("Fri 13th September", DateDialect::Default, Some(2019)),
            Ok(ResolvedDate::Single(date(2019, 9, 13)))
        );
        assert_eq!(
            at("  Thursday 2nd Jan 2020 ", DateDialect::Default, None),
            Ok(ResolvedDate::Single(date(2020, 1, 2)))
        );
    }

    #[test]
    fn test_month_abbreviations_match_full_names() {
        for (text, month) in [("1 jan", 1), ("1 January", 1), ("1 SEP", 9), ("1 may", 5), ("1 Dec.", 12), ("1 Sept", 9)] {
            let resolved = at(text, DateDialect::Default, Some(2020)).unwrap();
            assert_eq!(resolved, ResolvedDate::Single(date(2020, month, 1)), "{text}");
        }
    }

    #[test]
    fn test_single_month_range() {
        assert_eq!(
            at("2 - 6 October 2019", DateDialect::SingleMonthRange, None),
            Ok(range(date(2019, 10, 2), date(2019, 10, 6)))
        );
        assert_eq!(
            at("30 Sep - 6 October 2019", DateDialect::SingleMonthRange, None),
            Ok(range(date(2019, 9, 30), date(2019, 10, 6)))
        );
    }

    #[test]
    fn test_bare_start_day_needs_single_month_dialect() {
        assert_eq!(
            at("2 - 6 October 2019", DateDialect::Default, None),
            Err(DateParseError::Unrecognised { text: "2 - 6 october 2019".into() })
        );
    }

    #[test]
    fn test_range_rolls_back_across_new_year() {
        assert_eq!(
            at("28 Dec - 3 Jan 2020", DateDialect::Default, None),
            Ok(range(date(2019, 12, 28), date(2020, 1, 3)))
        );
    }

    #[test]
    fn test_range_with_weekdays() {
        assert_eq!(
            at("Wed 8 Apr - Sat 11 Apr 2020", DateDialect::Default, None),
            Ok(range(date(2020, 4, 8), date(2020, 4, 11)))
        );
    }

    #[test]
    fn test_range_year_inherited_from_either_side() {
        // start year is explicit, end inherits it, so the start rolls back
        assert_eq!(
            at("21 Dec 2019 - 2 Feb", DateDialect::Default, None),
            Ok(range(date(2018, 12, 21), date(2019, 2, 2)))
        );
        assert_eq!(
            at("21 Dec 2019 - 2 Feb 2020", DateDialect::Default, None),
            Ok(range(date(2019, 12, 21), date(2020, 2, 2)))
        );
    }

    #[test]
    fn test_range_falls_back_to_context_then_now() {
        assert_eq!(
            at("1 Mar - 4 Mar", DateDialect::Default, Some(2018)),
            Ok(range(date(2018, 3, 1), date(2018, 3, 4)))
        );
        assert_eq!(
            at("1 Mar - 4 Mar", DateDialect::Default, None),
            Ok(range(date(NOW, 3, 1), date(NOW, 3, 4)))
        );
    }

    #[test]
    fn test_dual_separator_dialect() {
        assert_eq!(
            at("Wed 22 Jan & Thu 23 Jan 2020", DateDialect::DualSeparator, None),
            Ok(range(date(2020, 1, 22), date(2020, 1, 23)))
        );
        // the default dialect does not split on '&', and the year is not
        // adjacent to the first date
        assert_eq!(
            at("Wed 22 Jan & Thu 23 Jan 2020", DateDialect::Default, None),
            Ok(ResolvedDate::Single(date(NOW, 1, 22)))
        );
    }

    #[test]
    fn test_en_dash_is_a_range_separator() {
        assert_eq!(
            at("28 Dec \u{2013} 3 Jan 2020", DateDialect::Default, None),
            Ok(range(date(2019, 12, 28), date(2020, 1, 3)))
        );
    }

    #[test]
    fn test_context_month_fills_bare_day() {
        let ctx = DateContext { year: Some(2019), month: Some(10) };
        assert_eq!(
            resolve_at("Tue 29th - Sat 2nd November", DateDialect::Default, ctx, NOW),
            Ok(range(date(2019, 10, 29), date(2019, 11, 2)))
        );
        assert_eq!(
            resolve_at("13th", DateDialect::Default, ctx, NOW),
            Ok(ResolvedDate::Single(date(2019, 10, 13)))
        );
    }

    #[test]
    fn test_errors_carry_text() {
        assert_eq!(
            at("Coming soon", DateDialect::Default, None),
            Err(DateParseError::Unrecognised { text: "coming soon".into() })
        );
        assert_eq!(
            at("31 February 2020", DateDialect::Default, None),
            Err(DateParseError::InvalidDate { text: "31 february 2020".into() })
        );
        assert_eq!(
            at("1 Mar 2022 - 1 Feb 2020", DateDialect::Default, None),
            Err(DateParseError::Inverted { text: "1 mar 2022 - 1 feb 2020".into() })
        );
        assert_eq!(
            at("114 September 2019", DateDialect::Default, None),
            Err(DateParseError::Unrecognised { text: "114 september 2019".into() })
        );
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let first = at("28 Dec - 3 Jan 2020", DateDialect::DualSeparator, Some(2010));
        let second = at("28 Dec - 3 Jan 2020", DateDialect::DualSeparator, Some(2010));
        assert_eq!(first, second);
    }

    #[test]
    fn test_resolve_uses_current_year() {
        let resolved = resolve("5 June", DateDialect::Default, None).unwrap();
        assert_eq!(resolved.bounds().0.year(), current_year());
    }

    #[test]
    fn test_parse_heading() {
        assert_eq!(
            parse_heading("September 2019"),
            Some(DateContext { year: Some(2019), month: Some(9) })
        );
        assert_eq!(parse_heading(" 2020 "), Some(DateContext { year: Some(2020), month: None }));
        assert_eq!(parse_heading("Coming up"), None);
    }

    #[test]
    fn test_dialect_from_str() {
        assert_eq!("dual-separator".parse(), Ok(DateDialect::DualSeparator));
        assert!("fancy".parse::<DateDialect>().is_err());
    }
}
