//! Report aggregation
//!
//! Groups roster ledger rows into report cells: camp reports bucket by
//! resolved date range, then by (region, venue, category), with per-weekday
//! presence counts and a min-max attendance range; course reports group by
//! (region, course name, course day) with plain counters.
//!
//! Counting rules that matter for correctness:
//! - rows without exactly-resolved dates cannot be placed in a date bucket
//!   and are excluded from camp grouping (they stay in flat listings);
//! - a full-week booking contributes to all five weekday counts but is ONE
//!   attendee; totals use `unique_records`, never the weekday sum;
//! - placeholder rows materialize an all-zero cell so empty events stay
//!   visible to administrators.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use rollcall_common::db::models::{
    ActivityType, BookingType, DiscountAllocation, RosterRecord, WeekDay,
};
use rollcall_common::text;
use serde::Serialize;

/// Filters for the camp report
#[derive(Debug, Clone, Default)]
pub struct CampFilters {
    /// Specific camp-shaped category; `None` covers all camp-like rows
    pub activity: Option<ActivityType>,
    /// Season label, e.g. "Summer 2025"; year fallback applies to rows
    /// without a season label of their own
    pub season: Option<String>,
    pub region: Option<String>,
}

/// Filters for the course report
#[derive(Debug, Clone, Default)]
pub struct CourseFilters {
    pub season: Option<String>,
    pub region: Option<String>,
}

/// Attendance counts of one (date range, region, venue, category) cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportCell {
    /// Bookings with booking type "full week"
    pub full_week: i64,
    /// Presence per weekday Mon..Fri: full-week bookings plus single-day
    /// bookings selecting that weekday
    pub per_weekday: [i64; 5],
    /// Minimum across the five weekday counts
    pub min: i64,
    /// Maximum across the five weekday counts
    pub max: i64,
    /// Count of source rows; one full-week booking is one attendee
    pub unique_records: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampCell {
    pub region: String,
    pub venue: String,
    pub category: String,
    #[serde(flatten)]
    pub cell: ReportCell,
}

#[derive(Debug, Clone, Serialize)]
pub struct DateRangeGroup {
    pub date_range: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub cells: Vec<CampCell>,
    /// Roll-up of `unique_records` across the group's cells
    pub unique_records: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampReport {
    pub groups: Vec<DateRangeGroup>,
    /// Grand total of unique records across all groups
    pub total_unique_records: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseCell {
    pub region: String,
    pub course_name: String,
    pub course_day: String,
    pub bookings: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseReport {
    pub cells: Vec<CourseCell>,
    pub total_bookings: i64,
}

/// One row of the discount audit
#[derive(Debug, Clone, Serialize)]
pub struct DiscountAuditRow {
    pub order_id: i64,
    pub order_item_id: i64,
    pub player_name: String,
    pub activity_type: String,
    pub base_price: f64,
    pub discount_total: f64,
    pub final_price: f64,
    pub breakdown: Vec<DiscountAllocation>,
    /// True when no persisted breakdown existed and the discount was
    /// approximated as base minus final (lower confidence)
    pub estimated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscountAudit {
    pub rows: Vec<DiscountAuditRow>,
    pub total_discount: f64,
    pub estimated_rows: usize,
}

/// Human-readable date range key ("July 14, 2025" or
/// "July 14 - July 18, 2025")
pub fn date_range_key(start: NaiveDate, end: NaiveDate) -> String {
    if start == end {
        format!("{}", start.format("%B %-d, %Y"))
    } else if start.year() == end.year() {
        format!(
            "{} - {}, {}",
            start.format("%B %-d"),
            end.format("%B %-d"),
            start.year()
        )
    } else {
        format!(
            "{} - {}",
            start.format("%B %-d, %Y"),
            end.format("%B %-d, %Y")
        )
    }
}

/// Build the camp report from ledger rows
pub fn aggregate_camps(rows: &[RosterRecord], filters: &CampFilters) -> CampReport {
    type CellKey = (String, String, String);
    let mut groups: BTreeMap<(NaiveDate, NaiveDate), BTreeMap<CellKey, ReportCell>> =
        BTreeMap::new();

    for row in rows {
        if !camp_row_matches(row, filters) {
            continue;
        }
        // Rows without exact dates cannot be placed in a date bucket
        if !row.has_resolved_dates() {
            continue;
        }

        let key = (
            row.region.clone(),
            row.venue.clone(),
            row.activity_type.label().to_string(),
        );
        let cell = groups
            .entry((row.start_date, row.end_date))
            .or_default()
            .entry(key)
            .or_default();

        if row.is_placeholder {
            // Presence of the cell is the whole point; counts stay zero
            continue;
        }

        cell.unique_records += 1;
        match row.booking_type {
            BookingType::FullWeek => {
                cell.full_week += 1;
                for day in WeekDay::ALL {
                    cell.per_weekday[day.index()] += 1;
                }
            }
            BookingType::SingleDay => {
                for day in &row.selected_days {
                    cell.per_weekday[day.index()] += 1;
                }
            }
            // Other booking shapes count as attendees without a weekday
            // footprint
            BookingType::Other(_) | BookingType::Unknown => {}
        }
    }

    let mut report_groups = Vec::new();
    let mut total_unique = 0;
    for ((start, end), cells) in groups {
        let mut camp_cells = Vec::new();
        let mut group_unique = 0;
        for ((region, venue, category), mut cell) in cells {
            cell.min = cell.per_weekday.iter().copied().min().unwrap_or(0);
            cell.max = cell.per_weekday.iter().copied().max().unwrap_or(0);
            group_unique += cell.unique_records;
            camp_cells.push(CampCell {
                region,
                venue,
                category,
                cell,
            });
        }
        total_unique += group_unique;
        report_groups.push(DateRangeGroup {
            date_range: date_range_key(start, end),
            start_date: start,
            end_date: end,
            cells: camp_cells,
            unique_records: group_unique,
        });
    }

    CampReport {
        groups: report_groups,
        total_unique_records: total_unique,
    }
}

/// Build the course report from ledger rows
pub fn aggregate_courses(rows: &[RosterRecord], filters: &CourseFilters) -> CourseReport {
    let mut cells: BTreeMap<(String, String, String), i64> = BTreeMap::new();

    for row in rows {
        if row.activity_type != ActivityType::Course {
            continue;
        }
        if !season_matches(row, filters.season.as_deref()) {
            continue;
        }
        if !region_matches(row, filters.region.as_deref()) {
            continue;
        }

        let key = (
            row.region.clone(),
            row.activity_name.clone(),
            row.course_day.clone(),
        );
        let count = cells.entry(key).or_insert(0);
        if !row.is_placeholder {
            *count += 1;
        }
    }

    let mut total = 0;
    let cells: Vec<CourseCell> = cells
        .into_iter()
        .map(|((region, course_name, course_day), bookings)| {
            total += bookings;
            CourseCell {
                region,
                course_name,
                course_day,
                bookings,
            }
        })
        .collect();

    CourseReport {
        cells,
        total_bookings: total,
    }
}

/// Build the discount audit from ledger rows.
///
/// Rows reconciled before discount attribution existed carry no breakdown;
/// for those the discount is approximated as base minus final and flagged.
pub fn discount_audit(rows: &[RosterRecord]) -> DiscountAudit {
    let mut audit_rows = Vec::new();
    let mut total_discount = 0.0;
    let mut estimated_rows = 0;

    for row in rows {
        if row.is_placeholder {
            continue;
        }

        let persisted = !row.discount_breakdown.is_empty() || row.discount_total > 0.0;
        let (discount_total, estimated) = if persisted {
            (row.discount_total, false)
        } else {
            let estimate = ((row.base_price - row.final_price) * 100.0).round() / 100.0;
            if estimate > 0.0 {
                tracing::warn!(
                    order_item_id = row.order_item_id,
                    estimate,
                    "No persisted discount breakdown, falling back to base minus final"
                );
                estimated_rows += 1;
                (estimate, true)
            } else {
                (0.0, false)
            }
        };

        total_discount += discount_total;
        audit_rows.push(DiscountAuditRow {
            order_id: row.order_id,
            order_item_id: row.order_item_id,
            player_name: row.player_name.clone(),
            activity_type: row.activity_type.label().to_string(),
            base_price: row.base_price,
            discount_total,
            final_price: row.final_price,
            breakdown: row.discount_breakdown.clone(),
            estimated,
        });
    }

    DiscountAudit {
        rows: audit_rows,
        total_discount: (total_discount * 100.0).round() / 100.0,
        estimated_rows,
    }
}

fn camp_row_matches(row: &RosterRecord, filters: &CampFilters) -> bool {
    let activity_ok = match &filters.activity {
        Some(activity) => &row.activity_type == activity,
        None => row.activity_type.is_camp_like(),
    };

    activity_ok
        && season_matches(row, filters.season.as_deref())
        && region_matches(row, filters.region.as_deref())
}

/// Season matching: the row's own season label is authoritative; the
/// resolved event year is consulted only when the label is absent
fn season_matches(row: &RosterRecord, filter: Option<&str>) -> bool {
    let Some(filter) = filter else {
        return true;
    };

    let row_season = text::canonical(&row.season);
    if !row_season.is_empty() && row_season != "unknown" {
        return row_season == text::canonical(filter);
    }

    match filter_year(filter) {
        Some(year) => row.has_resolved_dates() && row.start_date.year() == year,
        None => false,
    }
}

fn region_matches(row: &RosterRecord, filter: Option<&str>) -> bool {
    match filter {
        Some(region) => text::canonical(&row.region) == text::canonical(region),
        None => true,
    }
}

/// Pull a 4-digit year out of a season filter ("Summer 2025" -> 2025)
fn filter_year(filter: &str) -> Option<i32> {
    filter
        .split_whitespace()
        .filter_map(|token| token.parse::<i32>().ok())
        .find(|year| (1900..2100).contains(year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::db::models::DateConfidence;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn camp_row(venue: &str, booking: BookingType, days: Vec<WeekDay>) -> RosterRecord {
        let mut row = RosterRecord::new();
        row.order_id = 1;
        row.order_item_id = row.guid.as_u128() as i64; // unique enough for tests
        row.activity_type = ActivityType::Camp;
        row.venue = venue.to_string();
        row.region = "North".to_string();
        row.season = "Summer 2025".to_string();
        row.booking_type = booking;
        row.selected_days = days;
        row.start_date = date(2025, 7, 14);
        row.end_date = date(2025, 7, 18);
        row.date_confidence = DateConfidence::Exact;
        row
    }

    #[test]
    fn weekday_min_max_with_mixed_booking_types() {
        let rows = vec![
            camp_row("North Park", BookingType::FullWeek, vec![]),
            camp_row("North Park", BookingType::SingleDay, vec![WeekDay::Mon]),
        ];
        let report = aggregate_camps(&rows, &CampFilters::default());

        assert_eq!(report.groups.len(), 1);
        let cell = &report.groups[0].cells[0].cell;
        assert_eq!(cell.full_week, 1);
        assert_eq!(cell.per_weekday, [2, 1, 1, 1, 1]);
        assert_eq!(cell.min, 1);
        assert_eq!(cell.max, 2);
    }

    #[test]
    fn unique_records_is_row_count_not_weekday_sum() {
        let rows = vec![
            camp_row("North Park", BookingType::FullWeek, vec![]),
            camp_row("North Park", BookingType::FullWeek, vec![]),
            camp_row("North Park", BookingType::SingleDay, vec![WeekDay::Wed]),
        ];
        let report = aggregate_camps(&rows, &CampFilters::default());
        let cell = &report.groups[0].cells[0].cell;

        let weekday_sum: i64 = cell.per_weekday.iter().sum();
        assert_eq!(cell.unique_records, 3);
        assert!(weekday_sum > cell.unique_records);
        assert_eq!(report.total_unique_records, 3);
        assert_eq!(report.groups[0].unique_records, 3);
    }

    #[test]
    fn unresolved_and_inferred_dates_are_excluded() {
        let mut unresolved = camp_row("North Park", BookingType::FullWeek, vec![]);
        unresolved.start_date = rollcall_common::db::models::sentinel_date();
        unresolved.end_date = rollcall_common::db::models::sentinel_date();

        let mut inferred = camp_row("North Park", BookingType::FullWeek, vec![]);
        inferred.date_confidence = DateConfidence::Inferred;

        let resolved = camp_row("North Park", BookingType::FullWeek, vec![]);

        let report = aggregate_camps(&[unresolved, inferred, resolved], &CampFilters::default());
        assert_eq!(report.total_unique_records, 1);
    }

    #[test]
    fn placeholder_creates_zero_count_cell() {
        let mut placeholder = camp_row("Empty Venue", BookingType::Unknown, vec![]);
        placeholder.is_placeholder = true;

        let report = aggregate_camps(&[placeholder], &CampFilters::default());
        assert_eq!(report.groups.len(), 1);
        let cell = &report.groups[0].cells[0];
        assert_eq!(cell.venue, "Empty Venue");
        assert_eq!(cell.cell.unique_records, 0);
        assert_eq!(cell.cell.per_weekday, [0, 0, 0, 0, 0]);
        assert_eq!(report.total_unique_records, 0);
    }

    #[test]
    fn season_label_is_authoritative_over_event_year() {
        // Label says Summer 2024 even though the dates fall in 2025
        let mut row = camp_row("North Park", BookingType::FullWeek, vec![]);
        row.season = "Summer 2024".to_string();

        let filters = CampFilters {
            season: Some("Summer 2025".to_string()),
            ..Default::default()
        };
        let report = aggregate_camps(&[row], &filters);
        assert_eq!(report.total_unique_records, 0);
    }

    #[test]
    fn year_fallback_applies_only_without_label() {
        let mut row = camp_row("North Park", BookingType::FullWeek, vec![]);
        row.season = String::new();

        let filters = CampFilters {
            season: Some("Summer 2025".to_string()),
            ..Default::default()
        };
        let report = aggregate_camps(&[row], &filters);
        assert_eq!(report.total_unique_records, 1);

        let filters = CampFilters {
            season: Some("Summer 2024".to_string()),
            ..Default::default()
        };
        let report = aggregate_camps(&[camp_row("North Park", BookingType::FullWeek, vec![])], &filters);
        assert_eq!(report.total_unique_records, 0);
    }

    #[test]
    fn girls_only_included_in_camp_like_default() {
        let mut girls = camp_row("North Park", BookingType::FullWeek, vec![]);
        girls.activity_type = ActivityType::GirlsOnly;
        let mut course = camp_row("North Park", BookingType::FullWeek, vec![]);
        course.activity_type = ActivityType::Course;

        let report = aggregate_camps(&[girls.clone(), course], &CampFilters::default());
        assert_eq!(report.total_unique_records, 1);
        assert_eq!(report.groups[0].cells[0].category, "Girls Only");

        // Explicit filter narrows to one category
        let filters = CampFilters {
            activity: Some(ActivityType::GirlsOnly),
            ..Default::default()
        };
        let report = aggregate_camps(&[girls], &filters);
        assert_eq!(report.total_unique_records, 1);
    }

    #[test]
    fn date_range_key_formats() {
        assert_eq!(
            date_range_key(date(2025, 7, 14), date(2025, 7, 14)),
            "July 14, 2025"
        );
        assert_eq!(
            date_range_key(date(2025, 7, 14), date(2025, 7, 18)),
            "July 14 - July 18, 2025"
        );
        assert_eq!(
            date_range_key(date(2024, 12, 29), date(2025, 1, 2)),
            "December 29, 2024 - January 2, 2025"
        );
    }

    #[test]
    fn course_report_groups_by_region_name_day() {
        let mut monday = camp_row("North Park", BookingType::Other("term".to_string()), vec![]);
        monday.activity_type = ActivityType::Course;
        monday.activity_name = "Development Course".to_string();
        monday.course_day = "Monday".to_string();

        let mut monday2 = monday.clone();
        monday2.guid = uuid::Uuid::new_v4();
        monday2.order_item_id += 1;

        let mut wednesday = monday.clone();
        wednesday.guid = uuid::Uuid::new_v4();
        wednesday.order_item_id += 2;
        wednesday.course_day = "Wednesday".to_string();

        let report = aggregate_courses(&[monday, monday2, wednesday], &CourseFilters::default());
        assert_eq!(report.cells.len(), 2);
        assert_eq!(report.total_bookings, 3);

        let mondays = report
            .cells
            .iter()
            .find(|c| c.course_day == "Monday")
            .expect("monday cell");
        assert_eq!(mondays.bookings, 2);
    }

    #[test]
    fn discount_audit_flags_missing_breakdowns() {
        let mut persisted = camp_row("North Park", BookingType::FullWeek, vec![]);
        persisted.base_price = 100.0;
        persisted.final_price = 84.0;
        persisted.discount_total = 16.0;
        persisted.discount_breakdown = vec![DiscountAllocation {
            name: "Camp sibling discount".to_string(),
            kind: rollcall_common::db::models::DiscountKind::Sibling,
            amount: 16.0,
            applied_to: "ben".to_string(),
        }];

        let mut historical = camp_row("North Park", BookingType::FullWeek, vec![]);
        historical.base_price = 100.0;
        historical.final_price = 90.0;
        historical.discount_total = 0.0;

        let audit = discount_audit(&[persisted, historical]);
        assert_eq!(audit.rows.len(), 2);
        assert!(!audit.rows[0].estimated);
        assert!(audit.rows[1].estimated);
        assert_eq!(audit.rows[1].discount_total, 10.0);
        assert_eq!(audit.estimated_rows, 1);
        assert_eq!(audit.total_discount, 26.0);
    }
}
