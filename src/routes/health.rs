//! Health check route

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    services: HealthServices,
}

#[derive(Serialize)]
pub struct HealthServices {
    database: &'static str,
    api: &'static str,
}

/// GET /health
///
/// Degrades rather than errors: reporting paths never propagate failures.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match sqlx::query("SELECT 1").execute(state.db()).await {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            "unhealthy"
        }
    };

    Json(HealthResponse {
        status: if database == "healthy" { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        services: HealthServices {
            database,
            api: "healthy",
        },
    })
}
