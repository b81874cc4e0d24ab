use crate::AppState;
use crate::api::error::AppError;
use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct ScannerHealth {
    /// "available", "unavailable" or "skipped"
    pub status: String,
    pub address: String,
    pub version: Option<String>,
    pub strictness: String,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
    pub scanner: ScannerHealth,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let policy = state.pipeline.policy();

    let (scanner_status, scanner_version) = if policy.skips_scanning() {
        ("skipped", None)
    } else {
        match state.pipeline.scanner().version().await {
            Ok(version) => ("available", Some(version)),
            Err(e) => {
                tracing::warn!("Health check could not reach ClamAV: {}", e);
                ("unavailable", None)
            }
        }
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        service: "FileNest".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scanner: ScannerHealth {
            status: scanner_status.to_string(),
            address: format!("{}:{}", state.config.daemon_host, state.config.daemon_port),
            version: scanner_version,
            strictness: policy.strictness().to_string(),
        },
    })
}

#[utoipa::path(
    get,
    path = "/health/scanner/stats",
    responses(
        (status = 200, description = "Raw clamd STATS output", body = String),
        (status = 503, description = "Scanner unreachable")
    ),
    tag = "system"
)]
pub async fn scanner_stats(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .pipeline
        .scanner()
        .stats()
        .await
        .map_err(|e| AppError::ServiceUnavailable(e.to_string()))
}
