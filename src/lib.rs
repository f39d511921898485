//! Sealdrop Server Library
//!
//! Zero-knowledge file sharing: clients encrypt before upload, the server
//! stores ciphertext and brokers access. Uploads arrive in chunks against an
//! expiring session; recipients request access against a share id and, once
//! approved, pass the download gate to receive content and the encrypted key.
//!
//! The binary lives in main.rs; this crate exposes the modules and the
//! router assembly so integration tests drive the real HTTP surface.

pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod download;
pub mod error;
pub mod requests;
pub mod routes;
pub mod security;
pub mod state;
pub mod storage;
pub mod sweeper;
pub mod upload;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api/v1/files", routes::files::router())
        .nest("/api/v1/shares", routes::shares::router())
        .nest("/api/v1/requests", routes::requests::router())
        .nest("/api/v1/download", routes::download::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
