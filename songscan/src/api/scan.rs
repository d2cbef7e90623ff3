//! Scan submission and status endpoints
//!
//! `POST /scan` answers with a job id as soon as the job exists; the work
//! happens in a detached [`ScanTask`](crate::services::ScanTask). Clients poll
//! `GET /scan/:id` (or subscribe to `/scan/:id/events`) for the outcome.

use axum::{
    extract::{multipart::Field, multipart::MultipartError, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult, ValidationError};
use crate::models::{JobId, JobStatus, ScanParameters};
use crate::services::{MediaSource, TempMedia};
use crate::AppState;

/// POST /scan response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
}

/// POST /scan
///
/// Multipart form: optional `file`, optional `url`, optional scan parameters.
/// A file takes precedence over a url when both are present.
pub async fn submit_scan(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<SubmitResponse>> {
    let mut upload: Option<TempMedia> = None;
    let mut url: Option<String> = None;
    let mut params = ScanParameters::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let has_name = field.file_name().map(|n| !n.is_empty()).unwrap_or(false);
                if has_name && upload.is_none() {
                    upload = Some(store_upload(&state.config.uploads_dir, field).await?);
                } else {
                    // Empty file input, or a second file: drain and ignore
                    field.bytes().await.map_err(multipart_error)?;
                }
            }
            "url" => {
                let value = field.text().await.map_err(multipart_error)?;
                let value = value.trim();
                if !value.is_empty() {
                    url = Some(value.to_string());
                }
            }
            _ => {
                let value = field.text().await.map_err(multipart_error)?;
                if !params.apply_field(&name, &value)? {
                    debug!(field = %name, "Ignoring unknown form field");
                }
            }
        }
    }

    params.validate()?;

    let source = match (upload, url) {
        (Some(media), _) => MediaSource::Upload(media),
        (None, Some(url)) => MediaSource::Url(url),
        (None, None) => return Err(ValidationError::MissingSource.into()),
    };

    let kind = match &source {
        MediaSource::Upload(_) => "upload",
        MediaSource::Url(_) => "url",
    };
    let job_id = state.registry.create().await;
    info!(job_id = %job_id, source = kind, "Scan job submitted");

    state.scan_task.spawn(job_id, source, params);

    Ok(Json(SubmitResponse {
        job_id: job_id.to_string(),
    }))
}

/// GET /scan/:id
///
/// Current snapshot. Unknown and malformed ids are both 404.
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    let job_id = parse_job_id(&id)?;
    state
        .registry
        .status(&job_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Job not found: {}", id)))
}

pub(crate) fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    raw.parse::<JobId>()
        .map_err(|_| ApiError::NotFound(format!("Job not found: {}", raw)))
}

/// Stream one multipart file field into the uploads directory
///
/// The guard exists before the first byte is written, so a failed or
/// rejected upload never leaves a partial file behind.
async fn store_upload(uploads_dir: &FsPath, mut field: Field<'_>) -> ApiResult<TempMedia> {
    let extension = field
        .file_name()
        .map(upload_extension)
        .unwrap_or_default();
    let media = TempMedia::new(uploads_dir.join(format!(
        "upload_{}{}",
        Uuid::new_v4().simple(),
        extension
    )))?;

    let mut file = tokio::fs::File::create(media.path()).await?;
    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!(path = %media.path().display(), bytes = written, "Stored upload");
    Ok(media)
}

/// Keep a short alphanumeric extension from the client's file name
fn upload_extension(file_name: &str) -> String {
    FsPath::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

/// Build scan routes
pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", post(submit_scan))
        .route("/scan/:id", get(get_scan_status))
}
