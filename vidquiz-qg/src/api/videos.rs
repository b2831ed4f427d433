//! Video pipeline API handlers
//!
//! Upload signal, pipeline triggers (202 + job handle), read endpoints and cancel.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Question, TranscriptSegment, Video};
use crate::services::{JobHandle, JobKind, TranscriptView};
use crate::AppState;

/// POST /videos/uploaded request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUploadedRequest {
    pub video_id: Uuid,
    pub storage_path: String,
    #[serde(default)]
    pub title: Option<String>,
}

/// Accepted job, returned with 202
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub video_id: Uuid,
    pub kind: JobKind,
}

/// POST /videos/uploaded response
#[derive(Debug, Serialize)]
pub struct VideoUploadedResponse {
    pub video: Video,
    pub job: JobAccepted,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentsResponse {
    pub video_id: Uuid,
    pub segments: Vec<TranscriptSegment>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsResponse {
    pub video_id: Uuid,
    pub questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub video_id: Uuid,
    pub cancelled: bool,
}

/// POST /videos/uploaded
///
/// Upload-complete signal: registers the video (if new) and queues its pipeline.
pub async fn video_uploaded(
    State(state): State<AppState>,
    Json(request): Json<VideoUploadedRequest>,
) -> ApiResult<(StatusCode, Json<VideoUploadedResponse>)> {
    if request.storage_path.trim().is_empty() {
        return Err(ApiError::BadRequest("storagePath must not be empty".to_string()));
    }

    let title = request.title.unwrap_or_else(|| {
        std::path::Path::new(&request.storage_path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.video_id.to_string())
    });

    let video = state
        .orchestrator
        .register_upload(request.video_id, title, request.storage_path)
        .await?;

    let job = submit(&state, JobKind::Pipeline, video.id).await?;

    Ok((StatusCode::ACCEPTED, Json(VideoUploadedResponse { video, job })))
}

/// POST /videos/:id/transcription
pub async fn start_transcription(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let job = submit(&state, JobKind::Pipeline, video_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /videos/:id/transcript
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<TranscriptView>> {
    Ok(Json(state.orchestrator.get_transcript(video_id).await?))
}

/// POST /videos/:id/segments
pub async fn segment_transcript(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<SegmentsResponse>> {
    let segments = state.orchestrator.segment_transcript(video_id).await?;
    Ok(Json(SegmentsResponse { video_id, segments }))
}

/// GET /videos/:id/segments
pub async fn get_segments(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<SegmentsResponse>> {
    let segments = state.orchestrator.get_segments(video_id).await?;
    Ok(Json(SegmentsResponse { video_id, segments }))
}

/// POST /videos/:id/questions
pub async fn generate_questions(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<JobAccepted>)> {
    let job = submit(&state, JobKind::GenerateQuestions, video_id).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

/// GET /videos/:id/questions
pub async fn get_questions(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<QuestionsResponse>> {
    let questions = state.orchestrator.get_questions(video_id).await?;
    Ok(Json(QuestionsResponse { video_id, questions }))
}

/// GET /videos/:id
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<Video>> {
    Ok(Json(state.orchestrator.get_video(video_id).await?))
}

/// POST /videos/:id/cancel
pub async fn cancel_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> ApiResult<Json<CancelResponse>> {
    state.orchestrator.get_video(video_id).await?;
    let cancelled = state.workers.cancel(video_id).await;
    Ok(Json(CancelResponse { video_id, cancelled }))
}

/// Check the video's state, queue the job and watch its outcome in the background
async fn submit(state: &AppState, kind: JobKind, video_id: Uuid) -> ApiResult<JobAccepted> {
    state.orchestrator.check_startable(kind, video_id).await?;

    let handle = state.workers.submit(kind, video_id).await?;
    let accepted = JobAccepted {
        job_id: handle.job_id,
        video_id: handle.video_id,
        kind: handle.kind,
    };

    tokio::spawn(watch_job(state.clone(), handle));
    Ok(accepted)
}

/// Record failed jobs as the service's last error
async fn watch_job(state: AppState, handle: JobHandle) {
    let JobHandle {
        job_id,
        video_id,
        done,
        ..
    } = handle;

    match done.await {
        Ok(Ok(report)) => {
            tracing::debug!(job_id = %job_id, video_id = %video_id, status = %report.status, "Job completed");
        }
        Ok(Err(e)) => {
            *state.last_error.write().await = Some(format!("video {}: {}", video_id, e));
        }
        Err(_) => {
            tracing::warn!(job_id = %job_id, video_id = %video_id, "Job dropped before completion");
        }
    }
}

/// Build video routes
pub fn video_routes() -> Router<AppState> {
    Router::new()
        .route("/videos/uploaded", post(video_uploaded))
        .route("/videos/:id", get(get_video))
        .route("/videos/:id/transcription", post(start_transcription))
        .route("/videos/:id/transcript", get(get_transcript))
        .route("/videos/:id/segments", get(get_segments).post(segment_transcript))
        .route("/videos/:id/questions", get(get_questions).post(generate_questions))
        .route("/videos/:id/cancel", post(cancel_video))
}
