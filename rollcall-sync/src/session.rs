//! Sync session state machine and persistence
//!
//! Every reconciliation pass runs under a session row so an external
//! scheduler can poll progress and failures. Sessions persist across
//! restarts; non-terminal sessions found at startup belong to a dead
//! process and are marked cancelled.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use rollcall_common::{Error, Result};

/// What kind of pass the session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Incremental reconciliation of paid orders
    Reconcile,
    /// Destructive full rebuild of the roster ledger
    Rebuild,
    /// Chunked discount back-fill over historical orders
    MigrateDiscounts,
}

/// Sync pass state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncState {
    /// Fetching source orders / catalog data
    Loading,
    /// Per-order resolve, price and write loop
    Processing,
    /// Single-transaction ledger write (rebuild only)
    Writing,
    /// Pass finished successfully
    Completed,
    /// Pass cancelled (service restart)
    Cancelled,
    /// Pass failed with a hard error
    Failed,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Completed | SyncState::Cancelled | SyncState::Failed
        )
    }
}

/// One item/order level failure inside a pass; never aborts the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub order_id: Option<i64>,
    pub order_item_id: Option<i64>,
    pub message: String,
}

/// Progress of a running pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: f64,
    pub current_operation: String,
}

/// One sync pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub session_id: Uuid,
    pub kind: SyncKind,
    pub state: SyncState,
    pub progress: SyncProgress,
    pub errors: Vec<SyncError>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl SyncSession {
    pub fn new(kind: SyncKind) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            kind,
            state: SyncState::Loading,
            progress: SyncProgress::default(),
            errors: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Transition to a new state; terminal states stamp the end time
    pub fn transition_to(&mut self, new_state: SyncState) {
        tracing::debug!(
            session_id = %self.session_id,
            from = ?self.state,
            to = ?new_state,
            "Session state transition"
        );
        self.state = new_state;
        if new_state.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
    }

    pub fn update_progress(&mut self, current: usize, total: usize, operation: String) {
        self.progress.current = current;
        self.progress.total = total;
        self.progress.percentage = if total > 0 {
            (current as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        self.progress.current_operation = operation;
    }

    /// Record a per-item failure without aborting the pass
    pub fn record_error(&mut self, error: SyncError) {
        tracing::warn!(
            session_id = %self.session_id,
            order_id = ?error.order_id,
            order_item_id = ?error.order_item_id,
            message = %error.message,
            "Sync item failed, continuing"
        );
        self.errors.push(error);
    }

    pub fn failure_count(&self) -> usize {
        self.errors.len()
    }
}

/// Save (insert or update) a session row
pub async fn save_session(pool: &SqlitePool, session: &SyncSession) -> Result<()> {
    let kind = serde_json::to_string(&session.kind)
        .map_err(|e| Error::Internal(format!("Failed to serialize kind: {}", e)))?;
    let state = serde_json::to_string(&session.state)
        .map_err(|e| Error::Internal(format!("Failed to serialize state: {}", e)))?;
    let errors = serde_json::to_string(&session.errors)
        .map_err(|e| Error::Internal(format!("Failed to serialize errors: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO sync_sessions (
            session_id, kind, state,
            progress_current, progress_total, progress_percentage,
            current_operation, errors, failure_count, started_at, ended_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(session_id) DO UPDATE SET
            state = excluded.state,
            progress_current = excluded.progress_current,
            progress_total = excluded.progress_total,
            progress_percentage = excluded.progress_percentage,
            current_operation = excluded.current_operation,
            errors = excluded.errors,
            failure_count = excluded.failure_count,
            ended_at = excluded.ended_at
        "#,
    )
    .bind(session.session_id.to_string())
    .bind(kind)
    .bind(state)
    .bind(session.progress.current as i64)
    .bind(session.progress.total as i64)
    .bind(session.progress.percentage)
    .bind(&session.progress.current_operation)
    .bind(errors)
    .bind(session.errors.len() as i64)
    .bind(session.started_at.to_rfc3339())
    .bind(session.ended_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a session by id
pub async fn load_session(pool: &SqlitePool, session_id: Uuid) -> Result<Option<SyncSession>> {
    let row = sqlx::query(
        r#"
        SELECT session_id, kind, state,
               progress_current, progress_total, progress_percentage,
               current_operation, errors, started_at, ended_at
        FROM sync_sessions
        WHERE session_id = ?
        "#,
    )
    .bind(session_id.to_string())
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let kind: SyncKind = serde_json::from_str(row.get("kind"))
        .map_err(|e| Error::Internal(format!("Failed to deserialize kind: {}", e)))?;
    let state: SyncState = serde_json::from_str(row.get("state"))
        .map_err(|e| Error::Internal(format!("Failed to deserialize state: {}", e)))?;
    let errors: Vec<SyncError> = serde_json::from_str(row.get("errors"))
        .map_err(|e| Error::Internal(format!("Failed to deserialize errors: {}", e)))?;

    let started_at: String = row.get("started_at");
    let started_at = DateTime::parse_from_rfc3339(&started_at)
        .map_err(|e| Error::Internal(format!("Failed to parse started_at: {}", e)))?
        .with_timezone(&Utc);

    let ended_at: Option<String> = row.get("ended_at");
    let ended_at = ended_at
        .map(|s| DateTime::parse_from_rfc3339(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to parse ended_at: {}", e)))?
        .map(|dt| dt.with_timezone(&Utc));

    Ok(Some(SyncSession {
        session_id,
        kind,
        state,
        progress: SyncProgress {
            current: row.get::<i64, _>("progress_current") as usize,
            total: row.get::<i64, _>("progress_total") as usize,
            percentage: row.get("progress_percentage"),
            current_operation: row.get("current_operation"),
        },
        errors,
        started_at,
        ended_at,
    }))
}

/// Whether any pass is currently running
pub async fn has_running_session(pool: &SqlitePool) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM sync_sessions
        WHERE state NOT IN ('"COMPLETED"', '"CANCELLED"', '"FAILED"')
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// Mark sessions from a previous process run as cancelled.
///
/// A pass runs in a background task that dies with the process, so a
/// non-terminal session at startup can never progress again.
pub async fn cleanup_stale_sessions(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query(
        r#"
        UPDATE sync_sessions
        SET state = '"CANCELLED"',
            ended_at = ?,
            current_operation = 'Cancelled: rollcall-sync was restarted'
        WHERE state NOT IN ('"COMPLETED"', '"CANCELLED"', '"FAILED"')
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::db::create_tables;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.expect("pool");
        create_tables(&pool).await.expect("tables");
        pool
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let pool = test_pool().await;
        let mut session = SyncSession::new(SyncKind::Reconcile);
        session.update_progress(3, 10, "Reconciling order 3".to_string());
        session.record_error(SyncError {
            order_id: Some(7),
            order_item_id: None,
            message: "malformed attributes".to_string(),
        });

        save_session(&pool, &session).await.expect("save");

        let loaded = load_session(&pool, session.session_id)
            .await
            .expect("load")
            .expect("exists");
        assert_eq!(loaded.kind, SyncKind::Reconcile);
        assert_eq!(loaded.state, SyncState::Loading);
        assert_eq!(loaded.progress.current, 3);
        assert_eq!(loaded.progress.percentage, 30.0);
        assert_eq!(loaded.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_transition_sets_end_time() {
        let mut session = SyncSession::new(SyncKind::Rebuild);
        assert!(session.ended_at.is_none());

        session.transition_to(SyncState::Processing);
        assert!(session.ended_at.is_none());

        session.transition_to(SyncState::Completed);
        assert!(session.ended_at.is_some());
        assert!(session.state.is_terminal());
    }

    #[tokio::test]
    async fn test_running_session_detection_and_cleanup() {
        let pool = test_pool().await;
        let session = SyncSession::new(SyncKind::MigrateDiscounts);
        save_session(&pool, &session).await.expect("save");

        assert!(has_running_session(&pool).await.expect("running"));

        let cleaned = cleanup_stale_sessions(&pool).await.expect("cleanup");
        assert_eq!(cleaned, 1);
        assert!(!has_running_session(&pool).await.expect("running"));

        let reloaded = load_session(&pool, session.session_id)
            .await
            .expect("load")
            .expect("exists");
        assert_eq!(reloaded.state, SyncState::Cancelled);
    }
}
