// Price Archive - Web Server
// POST/GET /api/v0/prices over a single SQLite connection

use anyhow::{Context, Result};
use clap::Parser;
use price_archive::api::{router, AppState};
use price_archive::{close_database, logging, open_database, setup_database, Config};
use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

#[derive(Debug, Parser)]
#[command(name = "price-server")]
#[command(about = "HTTP API for importing and exporting price archives")]
struct Args {
    /// TOML configuration file
    #[arg(long, env = "PRICES_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the config file)
    #[arg(long, env = "PRICES_DATABASE")]
    database: Option<PathBuf>,

    /// Listen address, e.g. 0.0.0.0:8080 (overrides the config file)
    #[arg(long, env = "PRICES_BIND")]
    bind: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database = database;
    }
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    config.validate()?;
    logging::init_logger(&config.log, args.verbose);

    let conn = open_database(&config.database)
        .with_context(|| format!("Failed to open {}", config.database.display()))?;
    setup_database(&conn).context("Failed to ensure prices table")?;

    let state = AppState::new(conn, &config);
    let db = state.db.clone();
    let app = router(state);

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    tracing::info!(%addr, export_mode = ?config.export_mode, "Server is running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The router and its state clones are gone once serve returns
    match Arc::try_unwrap(db) {
        Ok(mutex) => close_database(mutex.into_inner().unwrap_or_else(PoisonError::into_inner))?,
        Err(_) => tracing::warn!("Database still in use at shutdown; dropping connection"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
