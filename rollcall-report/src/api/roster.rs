//! Flat roster listing
//!
//! The paginated per-booking view administrators export from. Unresolved
//! attributes and sentinel dates render as visible "N/A" placeholders;
//! the listing never hides a record for being incomplete.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rollcall_common::db::models::{sentinel_date, RosterRecord};

use crate::api::ReportError;
use crate::pagination::paginate;
use crate::AppState;

/// Query parameters for GET /api/roster
#[derive(Debug, Deserialize)]
pub struct RosterQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    pub page_size: Option<i64>,
    /// Filter by category label ("Camp", "Course", ...)
    pub activity: Option<String>,
    /// Include placeholder (empty event) rows; defaults to true
    pub include_placeholders: Option<bool>,
}

fn default_page() -> i64 {
    1
}

/// Roster listing response
#[derive(Debug, Serialize)]
pub struct RosterResponse {
    pub total_results: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// GET /api/roster
pub async fn roster_listing(
    State(state): State<AppState>,
    Query(query): Query<RosterQuery>,
) -> Result<Json<RosterResponse>, ReportError> {
    let include_placeholders = query.include_placeholders.unwrap_or(true);
    let activity = query.activity.clone();

    let mut count_sql =
        "SELECT COUNT(*) FROM roster_records WHERE (? OR is_placeholder = 0)".to_string();
    let mut select_sql = "SELECT * FROM roster_records WHERE (? OR is_placeholder = 0)".to_string();
    if activity.is_some() {
        count_sql.push_str(" AND activity_type = ?");
        select_sql.push_str(" AND activity_type = ?");
    }
    select_sql.push_str(" ORDER BY start_date ASC, venue ASC, order_item_id ASC LIMIT ? OFFSET ?");

    let mut count_query = sqlx::query_scalar(&count_sql).bind(include_placeholders);
    if let Some(activity) = &activity {
        count_query = count_query.bind(activity);
    }
    let total_results: i64 = count_query.fetch_one(&state.db).await?;

    let p = paginate(total_results, query.page, query.page_size);

    let mut select_query = sqlx::query(&select_sql).bind(include_placeholders);
    if let Some(activity) = &activity {
        select_query = select_query.bind(activity);
    }
    let rows = select_query
        .bind(p.page_size)
        .bind(p.offset)
        .fetch_all(&state.db)
        .await?;

    let records: Vec<RosterRecord> = rows
        .iter()
        .map(RosterRecord::from_row)
        .collect::<rollcall_common::Result<_>>()?;

    let columns: Vec<String> = [
        "order_id",
        "order_item_id",
        "player_name",
        "activity_type",
        "activity_name",
        "venue",
        "region",
        "age_group",
        "season",
        "booking_type",
        "start_date",
        "end_date",
        "base_price",
        "discount_total",
        "final_price",
        "is_placeholder",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    let json_rows = records.iter().map(listing_row).collect();

    Ok(Json(RosterResponse {
        total_results,
        page: p.page,
        page_size: p.page_size,
        total_pages: p.total_pages,
        columns,
        rows: json_rows,
    }))
}

fn listing_row(record: &RosterRecord) -> Vec<Value> {
    vec![
        json!(record.order_id),
        json!(record.order_item_id),
        display_or_na(&record.player_name),
        json!(record.activity_type.label()),
        display_or_na(&record.activity_name),
        json!(record.venue),
        json!(record.region),
        json!(record.age_group),
        display_or_na(&record.season),
        json!(record.booking_type.label()),
        date_or_na(record),
        end_date_or_na(record),
        json!(record.base_price),
        json!(record.discount_total),
        json!(record.final_price),
        json!(record.is_placeholder),
    ]
}

fn display_or_na(value: &str) -> Value {
    if value.trim().is_empty() {
        json!("N/A")
    } else {
        json!(value)
    }
}

fn date_or_na(record: &RosterRecord) -> Value {
    if record.start_date == sentinel_date() {
        json!("N/A")
    } else {
        json!(record.start_date.to_string())
    }
}

fn end_date_or_na(record: &RosterRecord) -> Value {
    if record.end_date == sentinel_date() {
        json!("N/A")
    } else {
        json!(record.end_date.to_string())
    }
}
