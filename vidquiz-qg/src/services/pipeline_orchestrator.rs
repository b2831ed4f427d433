//! Video pipeline orchestrator
//!
//! Drives one video through its phases:
//!
//! UPLOADED → PROCESSING → TRANSCRIBING → (segmentation) → GENERATING_QUESTIONS → COMPLETED
//!
//! Each phase persists the new status before work starts. Any unrecovered error moves the
//! video to FAILED with the error text and stops the run; artifacts written by earlier
//! phases are kept. Every mutating operation on a video holds that video's lock from
//! [`VideoLocks`], so the HTTP layer and the workers never write the same video at once.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vidquiz_common::events::{EventBus, PipelineEvent};

use super::remote_client::{RemoteCallClient, RemoteError};
use super::segment_processor::{SegmentProcessor, SegmentRunSummary};
use super::segmenter::{segment_transcript, SegmentError};
use super::worker_pool::{JobKind, JobRunner};
use crate::config::PipelineSettings;
use crate::db;
use crate::models::{InvalidTransition, Question, TranscriptSegment, Video, VideoStatus};

/// Error taxonomy exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    ValidationFailure,
    TransientIo,
    Fatal,
    InvalidState,
}

/// Pipeline operation failures
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Video {0} not found")]
    NotFound(Uuid),

    #[error("Cannot {operation} video {video_id} in status {status}")]
    InvalidState {
        video_id: Uuid,
        status: VideoStatus,
        operation: &'static str,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Segmentation(#[from] SegmentError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Failed to read video file {path}: {source}")]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Database(#[from] vidquiz_common::Error),

    #[error("Pipeline cancelled")]
    Cancelled,

    #[error("Pipeline job panicked: {0}")]
    Panicked(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::NotFound(_) => ErrorKind::NotFound,
            PipelineError::Database(vidquiz_common::Error::NotFound(_)) => ErrorKind::NotFound,
            PipelineError::InvalidState { .. } => ErrorKind::InvalidState,
            PipelineError::Validation(_) | PipelineError::Segmentation(_) => {
                ErrorKind::ValidationFailure
            }
            PipelineError::Remote(e) if e.is_retryable() => ErrorKind::TransientIo,
            PipelineError::Remote(_)
            | PipelineError::Storage { .. }
            | PipelineError::Transition(_)
            | PipelineError::Database(_)
            | PipelineError::Cancelled
            | PipelineError::Panicked(_) => ErrorKind::Fatal,
        }
    }
}

/// Result of a pipeline or question-generation run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub video_id: Uuid,
    pub status: VideoStatus,
    pub summary: SegmentRunSummary,
    pub elapsed_seconds: u64,
}

/// Transcript view returned by `get_transcript`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptView {
    pub video_id: Uuid,
    pub transcript: String,
    pub duration: Option<f64>,
    pub language: Option<String>,
}

/// Per-video single-writer locks
#[derive(Clone, Default)]
pub struct VideoLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl VideoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `video_id`
    pub async fn lock(&self, video_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Drop locks nobody holds or waits on
            map.retain(|id, l| *id == video_id || Arc::strong_count(l) > 1);
            map.entry(video_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Pipeline orchestrator service
pub struct PipelineOrchestrator {
    db: SqlitePool,
    event_bus: EventBus,
    remote: RemoteCallClient,
    segments: SegmentProcessor,
    settings: PipelineSettings,
    locks: VideoLocks,
}

impl PipelineOrchestrator {
    pub fn new(
        db: SqlitePool,
        event_bus: EventBus,
        remote: RemoteCallClient,
        settings: PipelineSettings,
    ) -> Self {
        let segments = SegmentProcessor::new(
            db.clone(),
            remote.clone(),
            event_bus.clone(),
            settings.questions_per_segment,
        );
        Self {
            db,
            event_bus,
            remote,
            segments,
            settings,
            locks: VideoLocks::new(),
        }
    }

    pub fn remote(&self) -> &RemoteCallClient {
        &self.remote
    }

    /// Record an uploaded video as UPLOADED; an existing record is returned unchanged.
    pub async fn register_upload(
        &self,
        video_id: Uuid,
        title: String,
        storage_path: String,
    ) -> Result<Video, PipelineError> {
        let _guard = self.locks.lock(video_id).await;

        let video = Video::new(video_id, title, storage_path);
        if db::videos::insert_video_if_absent(&self.db, &video).await? {
            tracing::info!(video_id = %video_id, path = %video.storage_path, "Video registered");
        }
        self.load(video_id).await
    }

    /// Check that a job of `kind` may start for this video.
    ///
    /// Full pipeline runs start only from UPLOADED. Question generation needs
    /// GENERATING_QUESTIONS or COMPLETED.
    pub async fn check_startable(&self, kind: JobKind, video_id: Uuid) -> Result<Video, PipelineError> {
        let video = self.load(video_id).await?;
        let allowed = match kind {
            JobKind::Pipeline => video.status == VideoStatus::Uploaded,
            JobKind::GenerateQuestions => matches!(
                video.status,
                VideoStatus::GeneratingQuestions | VideoStatus::Completed
            ),
        };
        if !allowed {
            return Err(PipelineError::InvalidState {
                video_id,
                status: video.status,
                operation: kind.operation(),
            });
        }
        Ok(video)
    }

    /// Run the whole pipeline for an UPLOADED video
    pub async fn run_pipeline(
        &self,
        video_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let _guard = self.locks.lock(video_id).await;
        let start_time = Instant::now();

        let mut video = self.check_startable(JobKind::Pipeline, video_id).await?;

        tracing::info!(video_id = %video_id, title = %video.title, "Starting pipeline");

        match self.execute_phases(&mut video, &cancel, start_time).await {
            Ok(report) => Ok(report),
            Err(err) => {
                self.handle_failure(&mut video, &err).await;
                Err(err)
            }
        }
    }

    /// Re-run question generation for PENDING/FAILED segments
    pub async fn generate_questions_for_video(
        &self,
        video_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        let _guard = self.locks.lock(video_id).await;
        let start_time = Instant::now();

        let mut video = self.check_startable(JobKind::GenerateQuestions, video_id).await?;

        let result = async {
            let segments = self.ensure_segments(&video).await?;
            let summary = self.segments.process_segments(video_id, &segments, &cancel).await?;
            if video.status == VideoStatus::GeneratingQuestions {
                self.persist_transition(&mut video, VideoStatus::Completed).await?;
            }
            Ok::<_, PipelineError>(summary)
        }
        .await;

        match result {
            Ok(summary) => Ok(self.complete(&video, summary, start_time)),
            Err(err) => {
                self.handle_failure(&mut video, &err).await;
                Err(err)
            }
        }
    }

    /// Create segments from the persisted transcript; existing segments are returned as is.
    pub async fn segment_transcript(
        &self,
        video_id: Uuid,
    ) -> Result<Vec<TranscriptSegment>, PipelineError> {
        let _guard = self.locks.lock(video_id).await;
        let video = self.load(video_id).await?;
        self.ensure_segments(&video).await
    }

    pub async fn get_video(&self, video_id: Uuid) -> Result<Video, PipelineError> {
        self.load(video_id).await
    }

    pub async fn get_transcript(&self, video_id: Uuid) -> Result<TranscriptView, PipelineError> {
        let video = self.load(video_id).await?;
        let transcript = video.transcript().ok_or(PipelineError::InvalidState {
            video_id,
            status: video.status,
            operation: "read transcript of",
        })?;

        Ok(TranscriptView {
            video_id,
            transcript: transcript.to_string(),
            duration: video.metadata.duration,
            language: video.metadata.language.clone(),
        })
    }

    pub async fn get_segments(&self, video_id: Uuid) -> Result<Vec<TranscriptSegment>, PipelineError> {
        self.load(video_id).await?;
        Ok(db::segments::load_segments(&self.db, video_id).await?)
    }

    pub async fn get_questions(&self, video_id: Uuid) -> Result<Vec<Question>, PipelineError> {
        self.load(video_id).await?;
        Ok(db::questions::load_questions_for_video(&self.db, video_id).await?)
    }

    async fn execute_phases(
        &self,
        video: &mut Video,
        cancel: &CancellationToken,
        start_time: Instant,
    ) -> Result<PipelineReport, PipelineError> {
        self.persist_transition(video, VideoStatus::Processing).await?;
        check_cancelled(cancel)?;

        self.phase_transcribing(video, cancel).await?;
        check_cancelled(cancel)?;

        let segments = self.ensure_segments(video).await?;
        check_cancelled(cancel)?;

        self.persist_transition(video, VideoStatus::GeneratingQuestions).await?;
        let summary = self.segments.process_segments(video.id, &segments, cancel).await?;

        self.persist_transition(video, VideoStatus::Completed).await?;
        Ok(self.complete(video, summary, start_time))
    }

    async fn phase_transcribing(
        &self,
        video: &mut Video,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        self.persist_transition(video, VideoStatus::Transcribing).await?;

        let bytes = tokio::fs::read(&video.storage_path)
            .await
            .map_err(|source| PipelineError::Storage {
                path: video.storage_path.clone(),
                source,
            })?;
        let file_name = Path::new(&video.storage_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.mp4", video.id));

        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = self.remote.transcribe(&file_name, bytes) => result?,
        };

        if output.text.trim().is_empty() {
            return Err(PipelineError::Validation(
                "transcription returned an empty transcript".to_string(),
            ));
        }
        if !(output.duration.is_finite() && output.duration > 0.0) {
            return Err(PipelineError::Validation(format!(
                "transcription returned invalid duration {}",
                output.duration
            )));
        }
        if output.duration > self.settings.max_duration_secs {
            return Err(PipelineError::Validation(format!(
                "transcription duration {}s exceeds the {}s limit",
                output.duration, self.settings.max_duration_secs
            )));
        }

        video.metadata.transcript = Some(output.text);
        video.metadata.duration = Some(output.duration);
        video.metadata.language = output.language;
        video.updated_at = Utc::now();
        db::videos::save_video(&self.db, video).await?;

        tracing::info!(
            video_id = %video.id,
            duration = output.duration,
            language = video.metadata.language.as_deref().unwrap_or("unknown"),
            "Transcript stored"
        );
        Ok(())
    }

    async fn ensure_segments(&self, video: &Video) -> Result<Vec<TranscriptSegment>, PipelineError> {
        let existing = db::segments::load_segments(&self.db, video.id).await?;
        if !existing.is_empty() {
            return Ok(existing);
        }

        let (Some(transcript), Some(duration)) = (video.transcript(), video.metadata.duration) else {
            return Err(PipelineError::InvalidState {
                video_id: video.id,
                status: video.status,
                operation: "segment transcript of",
            });
        };

        let segments: Vec<TranscriptSegment> =
            segment_transcript(transcript, duration, self.settings.segment_window_secs)?
                .into_iter()
                .map(|descriptor| TranscriptSegment::from_descriptor(video.id, descriptor))
                .collect();

        db::segments::insert_segments(&self.db, &segments).await?;

        tracing::info!(
            video_id = %video.id,
            segment_count = segments.len(),
            duration,
            "Transcript segmented"
        );
        self.event_bus.emit_lossy(PipelineEvent::SegmentsCreated {
            video_id: video.id,
            segment_count: segments.len(),
            timestamp: Utc::now(),
        });

        Ok(segments)
    }

    async fn persist_transition(
        &self,
        video: &mut Video,
        next: VideoStatus,
    ) -> Result<(), PipelineError> {
        let transition = video.transition_to(next)?;
        db::videos::save_video(&self.db, video).await?;

        tracing::info!(
            video_id = %video.id,
            from = %transition.old_status,
            to = %transition.new_status,
            "Video status changed"
        );
        self.event_bus.emit_lossy(PipelineEvent::VideoStatusChanged {
            video_id: video.id,
            old_status: transition.old_status.to_string(),
            new_status: transition.new_status.to_string(),
            timestamp: transition.transitioned_at,
        });
        Ok(())
    }

    fn complete(&self, video: &Video, summary: SegmentRunSummary, start_time: Instant) -> PipelineReport {
        let elapsed_seconds = start_time.elapsed().as_secs();

        tracing::info!(
            video_id = %video.id,
            completed = summary.completed,
            failed = summary.failed,
            questions = summary.questions,
            elapsed_seconds,
            "Question generation finished"
        );
        self.event_bus.emit_lossy(PipelineEvent::VideoCompleted {
            video_id: video.id,
            segments_completed: summary.completed,
            segments_failed: summary.failed,
            questions_created: summary.questions,
            duration_seconds: elapsed_seconds,
            timestamp: Utc::now(),
        });

        PipelineReport {
            video_id: video.id,
            status: video.status,
            summary,
            elapsed_seconds,
        }
    }

    /// Move the video to FAILED with the error text. Terminal videos are left alone.
    async fn handle_failure(&self, video: &mut Video, err: &PipelineError) {
        let message = err.to_string();

        if video.status.is_terminal() {
            tracing::warn!(
                video_id = %video.id,
                status = %video.status,
                error = %message,
                "Run failed on a finished video; status unchanged"
            );
            return;
        }

        tracing::error!(video_id = %video.id, status = %video.status, error = %message, "Pipeline failed");

        let transition = match video.fail(message.clone()) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(video_id = %video.id, error = %e, "Cannot mark video failed");
                return;
            }
        };

        if let Err(e) = db::videos::save_video(&self.db, video).await {
            tracing::error!(video_id = %video.id, error = %e, "Failed to persist FAILED status");
        }

        self.event_bus.emit_lossy(PipelineEvent::VideoStatusChanged {
            video_id: video.id,
            old_status: transition.old_status.to_string(),
            new_status: transition.new_status.to_string(),
            timestamp: transition.transitioned_at,
        });
        self.event_bus.emit_lossy(PipelineEvent::VideoFailed {
            video_id: video.id,
            error: message,
            timestamp: Utc::now(),
        });
    }

    async fn load(&self, video_id: Uuid) -> Result<Video, PipelineError> {
        db::videos::load_video(&self.db, video_id)
            .await?
            .ok_or(PipelineError::NotFound(video_id))
    }
}

#[async_trait]
impl JobRunner for PipelineOrchestrator {
    async fn run(
        &self,
        kind: JobKind,
        video_id: Uuid,
        cancel: CancellationToken,
    ) -> Result<PipelineReport, PipelineError> {
        match kind {
            JobKind::Pipeline => self.run_pipeline(video_id, cancel).await,
            JobKind::GenerateQuestions => self.generate_questions_for_video(video_id, cancel).await,
        }
    }

    async fn fail_abandoned(&self, video_id: Uuid, error: &PipelineError) {
        let _guard = self.locks.lock(video_id).await;
        match self.load(video_id).await {
            Ok(mut video) => self.handle_failure(&mut video, error).await,
            Err(e) => {
                tracing::error!(video_id = %video_id, error = %e, "Could not load video of abandoned job");
            }
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}
