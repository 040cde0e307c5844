//! Canonical roster ledger model
//!
//! One `RosterRecord` per reconciled booking, or one placeholder row per
//! published-but-unbooked event occurrence. Reconciliation is tolerant of
//! incomplete source data: unresolvable attributes land as the `Unknown`
//! sentinel and unresolvable dates as the 1970-01-01 sentinel, so a row is
//! always listable even when it cannot be bucketed.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::Result;

/// Sentinel value for attributes no source could resolve
pub const UNKNOWN: &str = "Unknown";

/// Sentinel date for records whose event dates could not be resolved
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid sentinel date")
}

/// Classified activity category
///
/// The textual girls-only signal always wins over every other token, and
/// textual signals always win over structural fallbacks (see the
/// classifier in rollcall-sync).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActivityType {
    Camp,
    Course,
    GirlsOnly,
    Event,
    /// Free-form category coming from explicit activity-type text
    Custom(String),
    Unknown,
}

impl ActivityType {
    /// Human-readable label, also the database representation
    pub fn label(&self) -> &str {
        match self {
            ActivityType::Camp => "Camp",
            ActivityType::Course => "Course",
            ActivityType::GirlsOnly => "Girls Only",
            ActivityType::Event => "Event",
            ActivityType::Custom(label) => label,
            ActivityType::Unknown => UNKNOWN,
        }
    }

    /// Camp-shaped activities share the camp report and the sibling
    /// discount rules; girls-only sessions are camps in the source data.
    pub fn is_camp_like(&self) -> bool {
        matches!(self, ActivityType::Camp | ActivityType::GirlsOnly)
    }
}

impl From<String> for ActivityType {
    fn from(value: String) -> Self {
        match crate::text::canonical(&value).as_str() {
            "camp" => ActivityType::Camp,
            "course" => ActivityType::Course,
            "girls only" | "girls' only" | "girls-only" => ActivityType::GirlsOnly,
            "event" => ActivityType::Event,
            "" | "unknown" => ActivityType::Unknown,
            _ => ActivityType::Custom(value.trim().to_string()),
        }
    }
}

impl From<ActivityType> for String {
    fn from(value: ActivityType) -> Self {
        value.label().to_string()
    }
}

impl std::fmt::Display for ActivityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// How a booking occupies its event's week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BookingType {
    FullWeek,
    SingleDay,
    /// Booking types this pipeline does not interpret (e.g. course terms)
    Other(String),
    Unknown,
}

impl BookingType {
    pub fn label(&self) -> &str {
        match self {
            BookingType::FullWeek => "full week",
            BookingType::SingleDay => "single day",
            BookingType::Other(label) => label,
            BookingType::Unknown => UNKNOWN,
        }
    }
}

impl From<String> for BookingType {
    fn from(value: String) -> Self {
        match crate::text::canonical(&value).as_str() {
            "full week" | "full-week" | "fullweek" => BookingType::FullWeek,
            "single day" | "single-day" | "singleday" => BookingType::SingleDay,
            "" | "unknown" => BookingType::Unknown,
            _ => BookingType::Other(value.trim().to_string()),
        }
    }
}

impl From<BookingType> for String {
    fn from(value: BookingType) -> Self {
        value.label().to_string()
    }
}

/// Operating weekdays of a camp week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeekDay {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
}

impl WeekDay {
    pub const ALL: [WeekDay; 5] = [
        WeekDay::Mon,
        WeekDay::Tue,
        WeekDay::Wed,
        WeekDay::Thu,
        WeekDay::Fri,
    ];

    /// Position in the Mon..Fri report axis
    pub fn index(&self) -> usize {
        match self {
            WeekDay::Mon => 0,
            WeekDay::Tue => 1,
            WeekDay::Wed => 2,
            WeekDay::Thu => 3,
            WeekDay::Fri => 4,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WeekDay::Mon => "mon",
            WeekDay::Tue => "tue",
            WeekDay::Wed => "wed",
            WeekDay::Thu => "thu",
            WeekDay::Fri => "fri",
        }
    }

    /// Parse a single day name ("Monday", "mon", "MON.")
    pub fn parse(raw: &str) -> Option<WeekDay> {
        let canonical = crate::text::canonical(raw);
        match canonical.trim_end_matches('.').get(..3) {
            Some("mon") => Some(WeekDay::Mon),
            Some("tue") => Some(WeekDay::Tue),
            Some("wed") => Some(WeekDay::Wed),
            Some("thu") => Some(WeekDay::Thu),
            Some("fri") => Some(WeekDay::Fri),
            _ => None,
        }
    }

    /// Parse a comma-separated day list attribute ("Monday, Wednesday")
    pub fn parse_list(raw: &str) -> Vec<WeekDay> {
        let mut days: Vec<WeekDay> = raw.split(',').filter_map(WeekDay::parse).collect();
        days.sort_by_key(WeekDay::index);
        days.dedup();
        days
    }
}

/// Confidence of a resolved event date
///
/// `Inferred` marks the weekly-pattern fallback that synthesizes January 1
/// of the season year; such dates are real enough to list but carry no
/// calendar meaning, so date-bucketed reports skip them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateConfidence {
    Exact,
    Inferred,
}

impl DateConfidence {
    pub fn label(&self) -> &'static str {
        match self {
            DateConfidence::Exact => "exact",
            DateConfidence::Inferred => "inferred",
        }
    }

    pub fn parse(raw: &str) -> DateConfidence {
        if raw.eq_ignore_ascii_case("inferred") {
            DateConfidence::Inferred
        } else {
            DateConfidence::Exact
        }
    }
}

/// One attributed discount line on a booked item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountAllocation {
    pub name: String,
    pub kind: DiscountKind,
    pub amount: f64,
    /// Player key the discount was attributed to
    pub applied_to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    Sibling,
    MultiChild,
    SameSeason,
    Coupon,
    Other,
}

/// One roster ledger row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRecord {
    pub guid: Uuid,
    pub order_id: i64,
    /// Stable external item identifier; `0` reserved for placeholders
    pub order_item_id: i64,
    pub product_id: i64,
    pub variant_id: i64,
    /// Content signature over the event-defining attributes
    pub event_signature: String,
    pub is_placeholder: bool,
    pub player_name: String,
    pub player_age: String,
    pub player_gender: String,
    pub parent_name: String,
    pub parent_email: String,
    pub parent_phone: String,
    pub activity_type: ActivityType,
    pub activity_name: String,
    pub venue: String,
    pub region: String,
    pub age_group: String,
    pub season: String,
    pub booking_type: BookingType,
    pub course_day: String,
    pub camp_term: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub date_confidence: DateConfidence,
    pub selected_days: Vec<WeekDay>,
    pub base_price: f64,
    pub discount_total: f64,
    pub final_price: f64,
    pub reimbursement: f64,
    pub discount_breakdown: Vec<DiscountAllocation>,
    pub order_status: String,
    pub order_date: Option<DateTime<Utc>>,
}

impl RosterRecord {
    /// Fresh record with sentinel values; callers fill in what they resolve
    pub fn new() -> Self {
        Self {
            guid: Uuid::new_v4(),
            order_id: 0,
            order_item_id: 0,
            product_id: 0,
            variant_id: 0,
            event_signature: String::new(),
            is_placeholder: false,
            player_name: String::new(),
            player_age: String::new(),
            player_gender: String::new(),
            parent_name: String::new(),
            parent_email: String::new(),
            parent_phone: String::new(),
            activity_type: ActivityType::Unknown,
            activity_name: String::new(),
            venue: UNKNOWN.to_string(),
            region: UNKNOWN.to_string(),
            age_group: UNKNOWN.to_string(),
            season: String::new(),
            booking_type: BookingType::Unknown,
            course_day: String::new(),
            camp_term: String::new(),
            start_date: sentinel_date(),
            end_date: sentinel_date(),
            date_confidence: DateConfidence::Exact,
            selected_days: Vec::new(),
            base_price: 0.0,
            discount_total: 0.0,
            final_price: 0.0,
            reimbursement: 0.0,
            discount_breakdown: Vec::new(),
            order_status: String::new(),
            order_date: None,
        }
    }

    /// Whether the event dates resolved to something bucketable
    pub fn has_resolved_dates(&self) -> bool {
        self.start_date != sentinel_date() && self.date_confidence == DateConfidence::Exact
    }

    /// Map a `roster_records` row back into the model
    pub fn from_row(row: &SqliteRow) -> Result<RosterRecord> {
        let guid_str: String = row.get("guid");
        let guid = Uuid::parse_str(&guid_str)
            .map_err(|e| crate::Error::Internal(format!("Invalid roster guid: {}", e)))?;

        let selected_days: Vec<WeekDay> =
            serde_json::from_str(row.get::<&str, _>("selected_days")).unwrap_or_default();
        let discount_breakdown: Vec<DiscountAllocation> =
            serde_json::from_str(row.get::<&str, _>("discount_breakdown")).unwrap_or_default();

        let order_date: Option<String> = row.get("order_date");
        let order_date = order_date
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RosterRecord {
            guid,
            order_id: row.get("order_id"),
            order_item_id: row.get("order_item_id"),
            product_id: row.get("product_id"),
            variant_id: row.get("variant_id"),
            event_signature: row.get("event_signature"),
            is_placeholder: row.get::<i64, _>("is_placeholder") != 0,
            player_name: row.get("player_name"),
            player_age: row.get("player_age"),
            player_gender: row.get("player_gender"),
            parent_name: row.get("parent_name"),
            parent_email: row.get("parent_email"),
            parent_phone: row.get("parent_phone"),
            activity_type: ActivityType::from(row.get::<String, _>("activity_type")),
            activity_name: row.get("activity_name"),
            venue: row.get("venue"),
            region: row.get("region"),
            age_group: row.get("age_group"),
            season: row.get("season"),
            booking_type: BookingType::from(row.get::<String, _>("booking_type")),
            course_day: row.get("course_day"),
            camp_term: row.get("camp_term"),
            start_date: parse_stored_date(row.get("start_date")),
            end_date: parse_stored_date(row.get("end_date")),
            date_confidence: DateConfidence::parse(row.get("date_confidence")),
            selected_days,
            base_price: row.get("base_price"),
            discount_total: row.get("discount_total"),
            final_price: row.get("final_price"),
            reimbursement: row.get("reimbursement"),
            discount_breakdown,
            order_status: row.get("order_status"),
            order_date,
        })
    }
}

impl Default for RosterRecord {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_stored_date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap_or_else(|_| sentinel_date())
}
