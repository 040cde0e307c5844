//! rollcall-report library - read-only roster reporting
//!
//! Serves aggregated camp/course reports, the discount audit and the flat
//! paginated roster listing over the shared database. Never writes.

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

pub mod aggregate;
pub mod api;
pub mod pagination;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (read-only)
    pub db: SqlitePool,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .route("/api/reports/camps", get(api::camp_report))
        .route("/api/reports/courses", get(api::course_report))
        .route("/api/reports/discounts", get(api::discount_report))
        .route("/api/roster", get(api::roster_listing))
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
