//! rollcall-sync library interface
//!
//! Reconciles commerce booking records into the canonical roster ledger:
//! attribute resolution, activity classification, event-date resolution,
//! tiered discount attribution, ledger writes and the batch pass
//! orchestration around them.

pub mod api;
pub mod catalog;
pub mod commerce;
pub mod discount;
pub mod ledger;
pub mod reconcile;
pub mod resolve;
pub mod retry;
pub mod session;

pub use crate::api::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Shared database connection pool
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
    Router::new()
        .merge(api::sync_routes())
        .merge(api::health_routes())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
