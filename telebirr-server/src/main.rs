//! Telebirr Payment Gateway Server
//!
//! Payment core of the restaurant backend: creates Telebirr B2B and C2B
//! payments, verifies gateway callbacks and reconciles order status, with a
//! durable retry queue for reconciliations that fail.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::{ConfigLoader, SharedConfig, get_database_url};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::{AppState, Components};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use telebirr_core::gateway::HttpTransport;
use telebirr_core::processors::{Reconciler, RetryWorker};
use telebirr_core::store::pg::PgStore;
use telebirr_core::utils::clock::SystemClock;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Telebirr payment gateway core
#[derive(Parser, Debug)]
#[command(name = "telebirr-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./telebirr-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting telebirr-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration; bad key material stops startup here
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!(
        b2b = loaded_config.telebirr.b2b.is_some(),
        c2b = loaded_config.telebirr.c2b.is_some(),
        "Configuration loaded from {:?}",
        args.config
    );

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let clock = Arc::new(SystemClock);
    let transport = Arc::new(HttpTransport::new(loaded_config.telebirr.request_timeout)?);

    // Create application state
    let state = AppState::new(
        Components {
            ledger: store.clone(),
            retries: store.clone(),
            transport,
            clock: clock.clone(),
            signer: Arc::new(loaded_config.signer),
        },
        &loaded_config.telebirr,
        loaded_config.retry,
        SharedConfig::new(loaded_config.admin, loaded_config.service),
    );

    // Spawn the retry worker
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = RetryWorker::new(
        store.clone(),
        Reconciler::new(store),
        clock,
        loaded_config.retry,
    );
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background tasks
    let _ = shutdown_tx.send(true);
    reload_notify.notify_one();
    if let Err(e) = worker_handle.await {
        tracing::error!("Retry worker task failed: {}", e);
    }

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
