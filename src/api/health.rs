//! Health check endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{config::StorageBackend, error::AppResult};

use super::{ok, ApiResponse};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Current status of the service
    pub status: String,
    /// Version of the service
    pub version: String,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<ApiResponse<HealthResponse>> {
    ok(
        "Service is healthy",
        HealthResponse {
            status: "healthy".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    )
}

/// Readiness check endpoint (round-trips to the store)
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 500, description = "Store unreachable", body = crate::error::ErrorResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<crate::AppState>,
) -> AppResult<Json<ApiResponse<HealthResponse>>> {
    state.services.users.store_ready().await?;

    let status = match state.config.database.backend {
        StorageBackend::Postgres => "ready",
        StorageBackend::Memory => "ready (in-memory store)",
    };
    Ok(ok(
        "Service is ready",
        HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    ))
}
