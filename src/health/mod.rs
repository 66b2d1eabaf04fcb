/*!
 * # Health Check Module
 *
 * - Service banner (`/`)
 * - Health check (`/health`): pings the prediction cache and reports 503 when
 *   it cannot be reached
 */

use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::AppState;

/// Response of the service banner
#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct RootResponse {
    pub message: String,
    pub status: String,
}

/// Dependency status reported by the health check
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ToSchema)]
pub struct ServiceStatuses {
    pub redis: String,
    pub model_loading: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub services: ServiceStatuses,
}

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    tag = "Health",
    responses((status = 200, description = "Service is running", body = RootResponse))
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "ShopIntelli AI Service is running".to_string(),
        status: "healthy".to_string(),
    })
}

/// Health check against the prediction cache
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service and cache are healthy", body = HealthResponse),
        (status = 503, description = "Cache unreachable", body = crate::errors::ErrorResponse),
    )
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, ServiceError> {
    state.cache.ping().await.map_err(|e| {
        error!(backend = state.cache.backend_name(), error = %e, "Health check failed");
        ServiceError::ServiceUnavailable(e.to_string())
    })?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        services: ServiceStatuses {
            redis: "connected".to_string(),
            model_loading: "ready".to_string(),
        },
    }))
}

/// Health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}
