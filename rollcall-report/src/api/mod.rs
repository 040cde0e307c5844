//! HTTP API for rollcall-report

pub mod health;
pub mod reports;
pub mod roster;

pub use health::health_routes;
pub use reports::{camp_report, course_report, discount_report};
pub use roster::roster_listing;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::SqlitePool;

use rollcall_common::db::models::RosterRecord;

/// Report API errors
#[derive(Debug)]
pub enum ReportError {
    Database(String),
    Internal(String),
}

impl IntoResponse for ReportError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ReportError::Database(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            ReportError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {}", msg),
            ),
        };

        let body = Json(json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

impl From<rollcall_common::Error> for ReportError {
    fn from(err: rollcall_common::Error) -> Self {
        ReportError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for ReportError {
    fn from(err: sqlx::Error) -> Self {
        ReportError::Database(err.to_string())
    }
}

/// Load all roster rows for in-memory aggregation
pub(crate) async fn load_all_records(pool: &SqlitePool) -> Result<Vec<RosterRecord>, ReportError> {
    let rows = sqlx::query("SELECT * FROM roster_records ORDER BY start_date ASC, venue ASC")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| RosterRecord::from_row(row).map_err(ReportError::from))
        .collect()
}
