//! rollcall-sync - Roster reconciliation microservice
//!
//! Turns commerce booking records into canonical roster ledger rows and
//! exposes the batch pass triggers (reconcile, rebuild, placeholder
//! refresh, discount migration) to an external scheduler.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rollcall_common::config::{RootFolderInitializer, RootFolderResolver};
use rollcall_sync::{build_router, AppState};

/// Command-line arguments for rollcall-sync
#[derive(Parser, Debug)]
#[command(name = "rollcall-sync")]
#[command(about = "Roster reconciliation microservice for Rollcall")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5821", env = "ROLLCALL_SYNC_PORT")]
    port: u16,

    /// Root folder containing the shared database
    #[arg(short, long, env = "ROLLCALL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rollcall_sync=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting rollcall-sync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let resolver = RootFolderResolver::new("sync").with_cli_arg(args.root_folder);
    let root_folder = resolver.resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database: {}", db_path.display());

    let pool = rollcall_common::db::init_database(&db_path).await?;
    rollcall_sync::commerce::init_mirror_tables(&pool).await?;

    // Sessions from a previous process run can never progress again
    let stale = rollcall_sync::session::cleanup_stale_sessions(&pool).await?;
    if stale > 0 {
        info!(stale, "Cancelled stale sync sessions from previous run");
    }

    let state = AppState::new(pool);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("rollcall-sync listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
