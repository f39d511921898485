//! Sealdrop Server
//!
//! Zero-knowledge file sharing backend: chunked encrypted uploads against
//! S3-compatible storage, share links, and an approval handshake before any
//! decryption key leaves the server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use sealdrop_server::auth::StaticTokenProvider;
use sealdrop_server::billing::FixedPlanProvider;
use sealdrop_server::config::Config;
use sealdrop_server::state::AppState;
use sealdrop_server::storage::S3ObjectStore;
use sealdrop_server::sweeper::Sweeper;
use sealdrop_server::{app, db};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "sealdrop_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    tracing::info!("Starting Sealdrop Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("S3 endpoint: {}", config.storage.endpoint);
    tracing::info!("S3 bucket: {}", config.storage.bucket);

    // Initialize object storage
    let store = Arc::new(
        S3ObjectStore::new(&config.storage)
            .await
            .context("Failed to initialize object storage")?,
    );

    // Initialize database
    let db_pool = db::create_pool(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    tracing::info!("Database initialized at {}", config.database.url);

    // Collaborators
    let identity = Arc::new(StaticTokenProvider::from_config(&config.security.api_tokens));
    let billing = Arc::new(FixedPlanProvider::new(config.upload.max_file_size));

    // Create application state
    let app_state = AppState::new(
        config.clone(),
        db_pool.clone(),
        store.clone(),
        identity,
        billing,
    );

    // Start the expiry sweeper
    let sweeper = Sweeper::new(db_pool, store, config.sweeper.interval_secs);
    tokio::spawn(sweeper.run());

    // Build router
    let router = app(app_state);

    // Start server with graceful shutdown
    let addr = SocketAddr::new(
        config.server.host.parse().unwrap_or([0, 0, 0, 0].into()),
        config.server.port,
    );
    tracing::info!("Sealdrop Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind listener")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
