//! Event date resolution
//!
//! Camp dates arrive in several encodings: explicit start/end fields, a
//! structured term string, stored date metadata, or nothing but a weekly
//! selection pattern. The resolver tries each strategy in priority order
//! and returns a typed result instead of ad hoc parsing at call sites.
//!
//! Term string grammar (one week descriptor):
//!
//! ```text
//! <season>-week-<n>-<month>-<day>-<month>-<day>[-<n>-days]   two-month span
//! <season>-week-<n>-<month>-<day>-<day>[-<n>-days]           single month
//! ```
//!
//! e.g. `summer-week-2-july-14-july-18-5-days`, `easter-week-1-march-31-april-4-5-days`.
//! The year is not encoded; it comes from the season hint ("Summer 2025"),
//! else the order's own date, else the current year. A December-to-January
//! span rolls the end year forward.

use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rollcall_common::db::models::DateConfidence;
use rollcall_common::text;

static TERM_TWO_MONTHS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"week-?(\d{1,2})-([a-z]+)-(\d{1,2})-([a-z]+)-(\d{1,2})(?:-(\d{1,2})-days?)?")
        .expect("valid two-month term pattern")
});

static TERM_SINGLE_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"week-?(\d{1,2})-([a-z]+)-(\d{1,2})-(\d{1,2})(?:-(\d{1,2})-days?)?")
        .expect("valid single-month term pattern")
});

static SEASON_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid year pattern"));

/// Explicit date formats accepted for start/end fields
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%B %d, %Y", "%d %B %Y"];

/// Successfully resolved event dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDates {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub confidence: DateConfidence,
}

/// Outcome of date resolution; `Unresolved` records stay listable with
/// sentinel dates but are excluded from date-bucketed reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateResolution {
    Resolved(ResolvedDates),
    Unresolved,
}

/// Candidate inputs for one item, gathered by the reconciler
#[derive(Debug, Clone, Copy, Default)]
pub struct DateInputs<'a> {
    /// Strategy 1: explicit start/end fields on the item
    pub explicit_start: Option<&'a str>,
    pub explicit_end: Option<&'a str>,
    /// Strategy 2: the item's resolved term string
    pub term: Option<&'a str>,
    /// Strategy 3: stored date metadata under alternate keys
    pub metadata_start: Option<&'a str>,
    pub metadata_end: Option<&'a str>,
    /// Strategy 4: term string re-derived from the product/variant
    pub product_term: Option<&'a str>,
    /// Season hint carrying the year ("Summer 2025")
    pub season: Option<&'a str>,
    /// The order's own date, year fallback for term parsing
    pub order_date: Option<NaiveDate>,
    /// Strategy 5: the item has per-weekday selection data
    pub has_weekday_selection: bool,
}

/// Resolve event dates, first successful strategy wins
pub fn resolve_dates(inputs: &DateInputs) -> DateResolution {
    // 1. Explicit fields beat every derived encoding
    if let (Some(start), Some(end)) = (
        inputs.explicit_start.and_then(parse_loose_date),
        inputs.explicit_end.and_then(parse_loose_date),
    ) {
        return resolved_exact(start, end);
    }

    let year = term_year(inputs);

    // 2. Structured term string on the item
    if let Some((start, end)) = inputs.term.and_then(|term| parse_term(term, year)) {
        return resolved_exact(start, end);
    }

    // 3. Stored date metadata
    if let (Some(start), Some(end)) = (
        inputs.metadata_start.and_then(parse_loose_date),
        inputs.metadata_end.and_then(parse_loose_date),
    ) {
        return resolved_exact(start, end);
    }

    // 4. Term string re-derived from the catalog
    if let Some((start, end)) = inputs.product_term.and_then(|term| parse_term(term, year)) {
        return resolved_exact(start, end);
    }

    // 5. Weekly pattern inference: January 1 of the season year, flagged
    //    low-confidence so reports can keep it out of date buckets
    if inputs.has_weekday_selection {
        if let Some(year) = inputs.season.and_then(season_year) {
            if let Some(jan1) = NaiveDate::from_ymd_opt(year, 1, 1) {
                tracing::debug!(year, "Event dates inferred from weekly pattern");
                return DateResolution::Resolved(ResolvedDates {
                    start: jan1,
                    end: jan1,
                    confidence: DateConfidence::Inferred,
                });
            }
        }
    }

    DateResolution::Unresolved
}

fn resolved_exact(start: NaiveDate, end: NaiveDate) -> DateResolution {
    // Keep the start <= end invariant even for reversed source fields
    let (start, end) = if start <= end {
        (start, end)
    } else {
        (end, start)
    };
    DateResolution::Resolved(ResolvedDates {
        start,
        end,
        confidence: DateConfidence::Exact,
    })
}

fn term_year(inputs: &DateInputs) -> i32 {
    inputs
        .season
        .and_then(season_year)
        .or_else(|| inputs.order_date.map(|d| d.year()))
        .unwrap_or_else(|| Utc::now().year())
}

/// Extract a 4-digit year from free season text ("Summer 2025" -> 2025)
pub fn season_year(season: &str) -> Option<i32> {
    SEASON_YEAR
        .captures(season)
        .and_then(|captures| captures.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a structured term string against the week-descriptor grammar
pub fn parse_term(term: &str, year: i32) -> Option<(NaiveDate, NaiveDate)> {
    let term = text::canonical(term);

    if let Some(captures) = TERM_TWO_MONTHS.captures(&term) {
        let start_month = month_number(&captures[2]);
        let end_month = month_number(&captures[4]);
        if let (Some(start_month), Some(end_month)) = (start_month, end_month) {
            let start_day: u32 = captures[3].parse().ok()?;
            let end_day: u32 = captures[5].parse().ok()?;
            let start = NaiveDate::from_ymd_opt(year, start_month, start_day)?;
            // December-to-January terms span the year boundary
            let end_year = if end_month < start_month { year + 1 } else { year };
            let end = NaiveDate::from_ymd_opt(end_year, end_month, end_day)?;
            if end >= start {
                return Some((start, end));
            }
        }
    }

    if let Some(captures) = TERM_SINGLE_MONTH.captures(&term) {
        let month = month_number(&captures[2])?;
        let start_day: u32 = captures[3].parse().ok()?;
        let end_day: u32 = captures[4].parse().ok()?;
        if end_day >= start_day {
            let start = NaiveDate::from_ymd_opt(year, month, start_day)?;
            let end = NaiveDate::from_ymd_opt(year, month, end_day)?;
            return Some((start, end));
        }
    }

    None
}

/// Parse an explicit date field in any recognized format
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let cleaned = text::clean(raw)?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}

fn month_number(name: &str) -> Option<u32> {
    match name.get(..3)? {
        "jan" => Some(1),
        "feb" => Some(2),
        "mar" => Some(3),
        "apr" => Some(4),
        "may" => Some(5),
        "jun" => Some(6),
        "jul" => Some(7),
        "aug" => Some(8),
        "sep" => Some(9),
        "oct" => Some(10),
        "nov" => Some(11),
        "dec" => Some(12),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn two_month_term_parses() {
        assert_eq!(
            parse_term("easter-week-1-march-31-april-4-5-days", 2025),
            Some((date(2025, 3, 31), date(2025, 4, 4)))
        );
    }

    #[test]
    fn single_month_term_parses() {
        assert_eq!(
            parse_term("summer-week-2-july-14-18-5-days", 2025),
            Some((date(2025, 7, 14), date(2025, 7, 18)))
        );
    }

    #[test]
    fn term_without_day_count_suffix() {
        assert_eq!(
            parse_term("Summer-Week-3-July-21-July-25", 2024),
            Some((date(2024, 7, 21), date(2024, 7, 25)))
        );
    }

    #[test]
    fn cross_year_term_rolls_end_forward() {
        assert_eq!(
            parse_term("winter-week-1-december-29-january-2-5-days", 2024),
            Some((date(2024, 12, 29), date(2025, 1, 2)))
        );
    }

    #[test]
    fn invalid_calendar_day_is_rejected() {
        assert_eq!(parse_term("spring-week-1-february-30-31", 2025), None);
        assert_eq!(parse_term("not a term at all", 2025), None);
    }

    #[test]
    fn explicit_fields_beat_term_string() {
        let inputs = DateInputs {
            explicit_start: Some("2025-06-02"),
            explicit_end: Some("2025-06-06"),
            term: Some("summer-week-2-july-14-18-5-days"),
            season: Some("Summer 2025"),
            ..Default::default()
        };
        assert_eq!(
            resolve_dates(&inputs),
            DateResolution::Resolved(ResolvedDates {
                start: date(2025, 6, 2),
                end: date(2025, 6, 6),
                confidence: DateConfidence::Exact,
            })
        );
    }

    #[test]
    fn season_hint_supplies_term_year() {
        let inputs = DateInputs {
            term: Some("summer-week-2-july-14-18-5-days"),
            season: Some("Summer 2023"),
            order_date: Some(date(2022, 11, 1)),
            ..Default::default()
        };
        match resolve_dates(&inputs) {
            DateResolution::Resolved(resolved) => {
                assert_eq!(resolved.start, date(2023, 7, 14));
            }
            DateResolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[test]
    fn order_date_year_when_season_has_none() {
        let inputs = DateInputs {
            term: Some("summer-week-1-july-7-11-5-days"),
            season: Some("Summer"),
            order_date: Some(date(2022, 3, 15)),
            ..Default::default()
        };
        match resolve_dates(&inputs) {
            DateResolution::Resolved(resolved) => {
                assert_eq!(resolved.start, date(2022, 7, 7));
            }
            DateResolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[test]
    fn product_term_fallback_applies() {
        let inputs = DateInputs {
            term: Some("garbled"),
            product_term: Some("summer-week-4-august-4-8-5-days"),
            season: Some("Summer 2025"),
            ..Default::default()
        };
        match resolve_dates(&inputs) {
            DateResolution::Resolved(resolved) => {
                assert_eq!(resolved.start, date(2025, 8, 4));
                assert_eq!(resolved.confidence, DateConfidence::Exact);
            }
            DateResolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[test]
    fn weekly_pattern_inference_is_flagged() {
        let inputs = DateInputs {
            season: Some("Autumn 2024"),
            has_weekday_selection: true,
            ..Default::default()
        };
        assert_eq!(
            resolve_dates(&inputs),
            DateResolution::Resolved(ResolvedDates {
                start: date(2024, 1, 1),
                end: date(2024, 1, 1),
                confidence: DateConfidence::Inferred,
            })
        );
    }

    #[test]
    fn inference_requires_a_season_year() {
        let inputs = DateInputs {
            season: Some("Autumn"),
            has_weekday_selection: true,
            order_date: Some(date(2024, 9, 1)),
            ..Default::default()
        };
        assert_eq!(resolve_dates(&inputs), DateResolution::Unresolved);
    }

    #[test]
    fn exhausted_strategies_return_unresolved() {
        assert_eq!(resolve_dates(&DateInputs::default()), DateResolution::Unresolved);
    }

    #[test]
    fn reversed_explicit_fields_keep_invariant() {
        let inputs = DateInputs {
            explicit_start: Some("2025-06-06"),
            explicit_end: Some("2025-06-02"),
            ..Default::default()
        };
        match resolve_dates(&inputs) {
            DateResolution::Resolved(resolved) => {
                assert!(resolved.start <= resolved.end);
            }
            DateResolution::Unresolved => panic!("expected resolution"),
        }
    }

    #[test]
    fn loose_date_formats() {
        assert_eq!(parse_loose_date("2025-07-14"), Some(date(2025, 7, 14)));
        assert_eq!(parse_loose_date("14/07/2025"), Some(date(2025, 7, 14)));
        assert_eq!(parse_loose_date("July 14, 2025"), Some(date(2025, 7, 14)));
        assert_eq!(parse_loose_date("nonsense"), None);
    }
}
