//! Transcription job endpoints.
//!
//! - `POST /api/transcriptions` uploads a file (multipart field `file`) and queues a job
//! - `GET /api/transcriptions/:id` reports the job record
//! - `GET /api/transcriptions/:id/download` streams a transcript or the summary

use crate::api::error::{ApiError, ApiResult};
use crate::jobs::{Job, JobStatus};
use crate::service::{ServiceError, TranscriptionService};
use axum::{
    body::Body,
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};

const UPLOAD_FIELD: &str = "file";

#[derive(Clone)]
pub struct TranscriptionState {
    pub service: TranscriptionService,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub file_name: String,
    pub status: JobStatus,
}

#[derive(Debug, Deserialize, Default)]
pub struct DownloadParams {
    /// Output key such as `default.srt`; the first output when omitted.
    pub key: Option<String>,
    /// Download the summary instead of a transcript.
    #[serde(default)]
    pub summary: bool,
}

pub fn router(state: TranscriptionState) -> Router {
    Router::new()
        .route("/", post(upload))
        .route("/:id", get(job_status))
        .route("/:id/download", get(download))
        .with_state(state)
}

/// POST /api/transcriptions
async fn upload(
    State(state): State<TranscriptionState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<SubmitResponse>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content = StreamReader::new(Box::pin(field.map_err(std::io::Error::other)));

        let job = match state.service.submit(&file_name, content).await {
            Ok(job) => job,
            Err(e) => return Err(multipart_failure(&e).unwrap_or_else(|| e.into())),
        };
        return Ok((
            StatusCode::ACCEPTED,
            Json(SubmitResponse {
                job_id: job.id,
                file_name: job.original_file_name,
                status: job.status,
            }),
        ));
    }

    Err(ApiError::bad_request(format!(
        "Multipart field '{}' is required",
        UPLOAD_FIELD
    )))
}

/// A body read error (size limit, truncated stream) surfaced while the
/// upload was being written keeps its own status code.
fn multipart_failure(err: &ServiceError) -> Option<ApiError> {
    let ServiceError::Internal(e) = err else {
        return None;
    };
    e.chain()
        .filter_map(|cause| cause.downcast_ref::<std::io::Error>())
        .filter_map(|io| io.get_ref())
        .find_map(|inner| inner.downcast_ref::<MultipartError>())
        .map(|m| ApiError::new(m.status(), m.body_text()))
}

/// GET /api/transcriptions/:id
async fn job_status(
    State(state): State<TranscriptionState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Job>> {
    Ok(Json(state.service.status(&id).await?))
}

/// GET /api/transcriptions/:id/download?key=..&summary=..
async fn download(
    State(state): State<TranscriptionState>,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> ApiResult<Response> {
    let target = state
        .service
        .resolve_download(&id, params.key.as_deref(), params.summary)
        .await?;

    let file = tokio::fs::File::open(&target.path)
        .await
        .map_err(|e| ApiError::not_found(format!("Failed to open transcript: {}", e)))?;
    let body = Body::from_stream(ReaderStream::new(file));

    let headers = [
        (header::CONTENT_TYPE, content_type(&target.file_name).to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"{}\"",
                header_safe(&target.file_name)
            ),
        ),
    ];
    Ok((headers, body).into_response())
}

fn content_type(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("txt") => "text/plain; charset=utf-8",
        Some("srt") => "application/x-subrip",
        Some("vtt") => "text/vtt; charset=utf-8",
        _ => "application/octet-stream",
    }
}

fn header_safe(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type("a_default.SRT"), "application/x-subrip");
        assert_eq!(content_type("a_summary.txt"), "text/plain; charset=utf-8");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn test_header_safe_replaces_quotes_and_unicode() {
        assert_eq!(header_safe("my \"talk\"_é.txt"), "my _talk___.txt");
    }
}
