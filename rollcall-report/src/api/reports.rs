//! Aggregated report endpoints
//!
//! Read-only views over the roster ledger: camp attendance grids, course
//! counters and the discount audit. Aggregation happens in memory on each
//! request; nothing here is persisted.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use rollcall_common::db::models::ActivityType;

use crate::aggregate::{
    aggregate_camps, aggregate_courses, discount_audit, CampFilters, CampReport, CourseFilters,
    CourseReport, DiscountAudit,
};
use crate::api::{load_all_records, ReportError};
use crate::AppState;

/// Query parameters for GET /api/reports/camps
#[derive(Debug, Default, Deserialize)]
pub struct CampReportQuery {
    /// Category label ("Camp", "Girls Only"); omit for all camp-like rows
    pub activity: Option<String>,
    /// Season label, e.g. "Summer 2025"
    pub season: Option<String>,
    pub region: Option<String>,
}

/// Query parameters for GET /api/reports/courses
#[derive(Debug, Default, Deserialize)]
pub struct CourseReportQuery {
    pub season: Option<String>,
    pub region: Option<String>,
}

/// GET /api/reports/camps
///
/// Date-range grouped attendance report with per-weekday counts and
/// min-max ranges.
pub async fn camp_report(
    State(state): State<AppState>,
    Query(query): Query<CampReportQuery>,
) -> Result<Json<CampReport>, ReportError> {
    let rows = load_all_records(&state.db).await?;

    let filters = CampFilters {
        activity: query.activity.map(ActivityType::from),
        season: query.season,
        region: query.region,
    };

    Ok(Json(aggregate_camps(&rows, &filters)))
}

/// GET /api/reports/courses
///
/// Per (region, course name, course day) booking counters.
pub async fn course_report(
    State(state): State<AppState>,
    Query(query): Query<CourseReportQuery>,
) -> Result<Json<CourseReport>, ReportError> {
    let rows = load_all_records(&state.db).await?;

    let filters = CourseFilters {
        season: query.season,
        region: query.region,
    };

    Ok(Json(aggregate_courses(&rows, &filters)))
}

/// GET /api/reports/discounts
///
/// Per-booking discount breakdown; items reconciled before attribution
/// existed are approximated (base minus final) and flagged as estimated.
pub async fn discount_report(
    State(state): State<AppState>,
) -> Result<Json<DiscountAudit>, ReportError> {
    let rows = load_all_records(&state.db).await?;
    Ok(Json(discount_audit(&rows)))
}
