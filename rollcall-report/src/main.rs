//! rollcall-report - Read-only roster reporting microservice
//!
//! Connects to the shared database in read-only mode and serves the camp
//! and course reports, the discount audit and the flat roster listing.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use rollcall_common::config::{RootFolderInitializer, RootFolderResolver};
use rollcall_report::{build_router, AppState};

/// Command-line arguments for rollcall-report
#[derive(Parser, Debug)]
#[command(name = "rollcall-report")]
#[command(about = "Read-only roster reporting microservice for Rollcall")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5822", env = "ROLLCALL_REPORT_PORT")]
    port: u16,

    /// Root folder containing the shared database
    #[arg(short, long, env = "ROLLCALL_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting rollcall-report v{}", env!("CARGO_PKG_VERSION"));

    let resolver = RootFolderResolver::new("report").with_cli_arg(args.root_folder);
    let root_folder = resolver.resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    // Reports never write; the sync service owns the schema
    let pool = match rollcall_common::db::connect_readonly(&db_path).await {
        Ok(pool) => {
            info!("Connected to database (read-only)");
            pool
        }
        Err(e) => {
            error!("Failed to connect to database: {}", e);
            error!("Run rollcall-sync once to create the database first");
            return Err(e.into());
        }
    };

    let state = AppState::new(pool);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", args.port)).await?;
    info!("rollcall-report listening on http://127.0.0.1:{}", args.port);
    info!("Health check: http://127.0.0.1:{}/health", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
