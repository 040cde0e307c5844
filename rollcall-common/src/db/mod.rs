//! Database initialization and connection helpers
//!
//! All Rollcall services share one SQLite database under the root folder.
//! The sync service opens it read-write and owns schema creation; the
//! report service connects read-only.

pub mod models;

use crate::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    configure_connection(&pool).await?;
    create_tables(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Connect to an existing database in read-only mode (report service)
pub async fn connect_readonly(db_path: &Path) -> Result<SqlitePool> {
    if !db_path.exists() {
        return Err(crate::Error::NotFound(format!(
            "Database not found: {}",
            db_path.display()
        )));
    }

    let db_url = format!("sqlite://{}?mode=ro", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    Ok(pool)
}

async fn configure_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("PRAGMA foreign_keys = ON").execute(pool).await?;

    // WAL keeps report reads open while a sync pass writes
    sqlx::query("PRAGMA journal_mode = WAL").execute(pool).await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the Rollcall-owned tables (idempotent)
pub async fn create_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roster_records (
            guid TEXT PRIMARY KEY,
            order_id INTEGER NOT NULL DEFAULT 0,
            order_item_id INTEGER NOT NULL DEFAULT 0,
            product_id INTEGER NOT NULL DEFAULT 0,
            variant_id INTEGER NOT NULL DEFAULT 0,
            event_signature TEXT NOT NULL DEFAULT '',
            is_placeholder INTEGER NOT NULL DEFAULT 0,
            player_name TEXT NOT NULL DEFAULT '',
            player_age TEXT NOT NULL DEFAULT '',
            player_gender TEXT NOT NULL DEFAULT '',
            parent_name TEXT NOT NULL DEFAULT '',
            parent_email TEXT NOT NULL DEFAULT '',
            parent_phone TEXT NOT NULL DEFAULT '',
            activity_type TEXT NOT NULL DEFAULT 'Unknown',
            activity_name TEXT NOT NULL DEFAULT '',
            venue TEXT NOT NULL DEFAULT 'Unknown',
            region TEXT NOT NULL DEFAULT 'Unknown',
            age_group TEXT NOT NULL DEFAULT 'Unknown',
            season TEXT NOT NULL DEFAULT '',
            booking_type TEXT NOT NULL DEFAULT 'Unknown',
            course_day TEXT NOT NULL DEFAULT '',
            camp_term TEXT NOT NULL DEFAULT '',
            start_date TEXT NOT NULL DEFAULT '1970-01-01',
            end_date TEXT NOT NULL DEFAULT '1970-01-01',
            date_confidence TEXT NOT NULL DEFAULT 'exact',
            selected_days TEXT NOT NULL DEFAULT '[]',
            base_price REAL NOT NULL DEFAULT 0,
            discount_total REAL NOT NULL DEFAULT 0,
            final_price REAL NOT NULL DEFAULT 0,
            reimbursement REAL NOT NULL DEFAULT 0,
            discount_breakdown TEXT NOT NULL DEFAULT '[]',
            order_status TEXT NOT NULL DEFAULT '',
            order_date TEXT,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    // One real row per order item, one placeholder row per event signature
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_roster_order_item
         ON roster_records(order_item_id) WHERE order_item_id != 0",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_roster_placeholder_signature
         ON roster_records(event_signature) WHERE is_placeholder = 1",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_roster_activity ON roster_records(activity_type)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_roster_signature ON roster_records(event_signature)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_sessions (
            session_id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            state TEXT NOT NULL,
            progress_current INTEGER NOT NULL DEFAULT 0,
            progress_total INTEGER NOT NULL DEFAULT 0,
            progress_percentage REAL NOT NULL DEFAULT 0.0,
            current_operation TEXT NOT NULL DEFAULT '',
            errors TEXT NOT NULL DEFAULT '[]',
            failure_count INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    let defaults = [
        ("sync_chunk_size", "50"),
        ("database_max_lock_wait_ms", "5000"),
    ];

    for (key, value) in defaults {
        sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Read an integer setting, falling back to a default when missing or bad
pub async fn get_setting_i64(pool: &SqlitePool, key: &str, default: i64) -> i64 {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await
        .ok()
        .flatten();

    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}
