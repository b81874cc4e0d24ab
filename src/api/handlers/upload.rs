use crate::AppState;
use crate::api::error::AppError;
use crate::models::{PipelineDecision, RejectReason, ScanAnnotation, UploadCandidate};
use crate::utils::validation::{
    ALLOWED_CONTENT_TYPES, MAX_FILE_SIZE, human_readable_size, is_image, is_text,
};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::MultipartError,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub file_size: u64,
    pub human_readable_size: String,
    pub is_image: bool,
    pub is_text: bool,
}

#[derive(Serialize, ToSchema)]
pub struct ScanReport {
    /// "clean" or "error" (the latter only under fail-open)
    pub status: String,
    pub warning: Option<String>,
    pub skipped: bool,
    pub scanned_at: DateTime<Utc>,
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub file: UploadedFile,
    pub scan: ScanReport,
}

#[derive(Serialize, ToSchema)]
pub struct RejectionResponse {
    pub message: String,
    pub reason: RejectReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_types: Option<Vec<String>>,
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "File upload (field name: file)"),
    responses(
        (status = 201, description = "File accepted", body = UploadResponse),
        (status = 413, description = "File too large", body = RejectionResponse),
        (status = 422, description = "File rejected", body = RejectionResponse),
        (status = 503, description = "Virus scanning unavailable", body = RejectionResponse)
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut candidate = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let declared = field.content_type().map(|s| s.to_string());
        let bytes = field.bytes().await.map_err(multipart_error)?;

        let mut upload = UploadCandidate::new(filename, bytes);
        upload.declared_content_type = declared;
        candidate = Some(upload);
    }

    let decision = state.pipeline.process(candidate.as_ref()).await;
    Ok(render_decision(decision, candidate.as_ref()))
}

/// The body limit surfaces as a multipart error mid-stream; keep it a size rejection
fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::info!("Rejecting upload over the body limit: {}", err.body_text());
        AppError::PayloadTooLarge(format!(
            "File size exceeds {}MB limit",
            MAX_FILE_SIZE / 1024 / 1024
        ))
    } else {
        AppError::BadRequest(err.body_text())
    }
}

fn render_decision(decision: PipelineDecision, candidate: Option<&UploadCandidate>) -> Response {
    match decision {
        PipelineDecision::Accept {
            content_type,
            scan,
            annotation,
        } => {
            let (filename, size) = candidate
                .map(|c| (c.filename.clone(), c.len() as u64))
                .unwrap_or_default();

            let body = UploadResponse {
                message: "File uploaded successfully".to_string(),
                file: UploadedFile {
                    filename,
                    file_size: size,
                    human_readable_size: human_readable_size(size),
                    is_image: is_image(&content_type),
                    is_text: is_text(&content_type),
                    content_type,
                },
                scan: ScanReport {
                    status: scan.status().to_string(),
                    warning: annotation.warning().map(str::to_string),
                    skipped: annotation == ScanAnnotation::Skipped,
                    scanned_at: scan.scanned_at,
                },
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        PipelineDecision::Reject {
            reason,
            message,
            detail,
        } => {
            let status = match reason {
                RejectReason::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                RejectReason::ScanUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            };
            let allowed_types = (reason == RejectReason::UnsupportedType).then(|| {
                ALLOWED_CONTENT_TYPES
                    .iter()
                    .map(|t| t.to_string())
                    .collect()
            });

            let body = RejectionResponse {
                message,
                reason,
                detail,
                allowed_types,
            };
            (status, Json(body)).into_response()
        }
    }
}
