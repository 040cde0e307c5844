//! Sync trigger API handlers
//!
//! POST endpoints start a pass in a background task and return the session
//! id for polling; only one pass may run at a time (409 otherwise). The
//! external scheduler owns the cadence; this service only executes.

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{ApiError, ApiResult};
use crate::reconcile::Reconciler;
use crate::session::{
    self, SyncError, SyncKind, SyncProgress, SyncSession, SyncState,
};
use crate::AppState;

/// POST /api/sync/reconcile request
#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    /// Explicit order ids; omit to reconcile all paid orders
    #[serde(default)]
    pub order_ids: Option<Vec<i64>>,
}

/// POST /api/sync/migrate-discounts request
#[derive(Debug, Default, Deserialize)]
pub struct MigrateRequest {
    /// Orders per chunk; falls back to the `sync_chunk_size` setting
    #[serde(default)]
    pub chunk_size: Option<i64>,
}

/// Response for every pass-starting endpoint
#[derive(Debug, Serialize)]
pub struct StartSyncResponse {
    pub session_id: Uuid,
    pub kind: SyncKind,
    pub state: SyncState,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// GET /api/sync/sessions/{id} response
#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub kind: SyncKind,
    pub state: SyncState,
    pub progress: SyncProgress,
    pub failure_count: usize,
    pub errors: Vec<SyncError>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct PlaceholderResponse {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct ProductRemovalResponse {
    pub product_id: i64,
    pub deleted_rows: u64,
}

/// POST /api/sync/reconcile
pub async fn start_reconcile(
    State(state): State<AppState>,
    request: Option<Json<ReconcileRequest>>,
) -> ApiResult<Json<StartSyncResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let session = start_pass(&state, SyncKind::Reconcile).await?;
    let response = start_response(&session);

    let db = state.db.clone();
    tokio::spawn(async move {
        let reconciler = Reconciler::new(db);
        let finished = reconciler.run_reconcile(session, request.order_ids).await;
        tracing::info!(
            session_id = %finished.session_id,
            state = ?finished.state,
            failures = finished.failure_count(),
            "Reconcile pass finished"
        );
    });

    Ok(Json(response))
}

/// POST /api/sync/rebuild
pub async fn start_rebuild(
    State(state): State<AppState>,
) -> ApiResult<Json<StartSyncResponse>> {
    let session = start_pass(&state, SyncKind::Rebuild).await?;
    let response = start_response(&session);

    let db = state.db.clone();
    tokio::spawn(async move {
        let reconciler = Reconciler::new(db);
        let finished = reconciler.run_rebuild(session).await;
        tracing::info!(
            session_id = %finished.session_id,
            state = ?finished.state,
            "Rebuild pass finished"
        );
    });

    Ok(Json(response))
}

/// POST /api/sync/migrate-discounts
pub async fn start_migration(
    State(state): State<AppState>,
    request: Option<Json<MigrateRequest>>,
) -> ApiResult<Json<StartSyncResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let chunk_size = match request.chunk_size {
        Some(size) if size > 0 => size,
        Some(size) => {
            return Err(ApiError::BadRequest(format!(
                "chunk_size must be positive, got {}",
                size
            )))
        }
        None => rollcall_common::db::get_setting_i64(&state.db, "sync_chunk_size", 50).await,
    };

    let session = start_pass(&state, SyncKind::MigrateDiscounts).await?;
    let response = start_response(&session);

    let db = state.db.clone();
    tokio::spawn(async move {
        let reconciler = Reconciler::new(db);
        let finished = reconciler.run_migration(session, chunk_size).await;
        tracing::info!(
            session_id = %finished.session_id,
            state = ?finished.state,
            "Discount migration finished"
        );
    });

    Ok(Json(response))
}

/// POST /api/sync/placeholders
///
/// Placeholder refresh is fast enough to run inline.
pub async fn refresh_placeholders(
    State(state): State<AppState>,
) -> ApiResult<Json<PlaceholderResponse>> {
    let reconciler = Reconciler::new(state.db.clone());
    let summary = reconciler.refresh_placeholders().await?;

    Ok(Json(PlaceholderResponse {
        created: summary.created,
        updated: summary.updated,
        skipped: summary.skipped,
    }))
}

/// DELETE /api/sync/products/{id}
///
/// Removal hook: the originating product left the catalog, so its roster
/// rows (real and placeholder) go with it.
pub async fn remove_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<Json<ProductRemovalResponse>> {
    let reconciler = Reconciler::new(state.db.clone());
    let deleted_rows = reconciler.remove_product(product_id).await?;

    Ok(Json(ProductRemovalResponse {
        product_id,
        deleted_rows,
    }))
}

/// GET /api/sync/sessions/{id}
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<SessionStatusResponse>> {
    let session = session::load_session(&state.db, session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Sync session not found: {}", session_id)))?;

    Ok(Json(SessionStatusResponse {
        session_id: session.session_id,
        kind: session.kind,
        state: session.state,
        failure_count: session.failure_count(),
        progress: session.progress,
        errors: session.errors,
        started_at: session.started_at,
        ended_at: session.ended_at,
    }))
}

async fn start_pass(state: &AppState, kind: SyncKind) -> ApiResult<SyncSession> {
    if session::has_running_session(&state.db).await? {
        return Err(ApiError::Conflict(
            "A sync pass is already running".to_string(),
        ));
    }

    let session = SyncSession::new(kind);
    session::save_session(&state.db, &session).await?;

    tracing::info!(
        session_id = %session.session_id,
        kind = ?kind,
        "Sync pass started"
    );
    Ok(session)
}

fn start_response(session: &SyncSession) -> StartSyncResponse {
    StartSyncResponse {
        session_id: session.session_id,
        kind: session.kind,
        state: session.state,
        started_at: session.started_at,
    }
}

/// Build sync API routes
pub fn sync_routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync/reconcile", post(start_reconcile))
        .route("/api/sync/rebuild", post(start_rebuild))
        .route("/api/sync/migrate-discounts", post(start_migration))
        .route("/api/sync/placeholders", post(refresh_placeholders))
        .route("/api/sync/products/:product_id", delete(remove_product))
        .route("/api/sync/sessions/:session_id", get(session_status))
}
