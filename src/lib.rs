pub mod api;
pub mod config;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::ScanConfig;
use crate::services::upload_pipeline::UploadPipeline;
use crate::utils::validation::MAX_FILE_SIZE;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Room for multipart boundaries and part headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::health::health_check,
        api::handlers::health::scanner_stats,
    ),
    components(
        schemas(
            api::handlers::upload::UploadResponse,
            api::handlers::upload::UploadedFile,
            api::handlers::upload::ScanReport,
            api::handlers::upload::RejectionResponse,
            api::handlers::health::HealthResponse,
            api::handlers::health::ScannerHealth,
            models::RejectReason,
        )
    ),
    tags(
        (name = "files", description = "File upload endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<UploadPipeline>,
    pub config: ScanConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/health/scanner/stats",
            get(api::handlers::health::scanner_stats),
        )
        .route(
            "/upload",
            post(api::handlers::upload::upload_file)
                .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + MULTIPART_OVERHEAD)),
        )
        .with_state(state)
}
