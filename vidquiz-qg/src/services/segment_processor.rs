//! Segment processing loop
//!
//! Generates questions for each segment of a video, in index order. A failing segment
//! is marked FAILED and the loop moves on; only cancellation stops it early.

use chrono::Utc;
use serde::Serialize;
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vidquiz_common::events::{EventBus, PipelineEvent};

use super::pipeline_orchestrator::PipelineError;
use super::question_normalizer::normalize_candidates;
use super::remote_client::{GenerationRequest, RemoteCallClient};
use crate::db;
use crate::models::{Question, SegmentStatus, TranscriptSegment};

/// Outcome counts of one pass over a video's segments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SegmentRunSummary {
    pub completed: usize,
    pub failed: usize,
    pub questions: usize,
}

/// Per-segment question generation
#[derive(Clone)]
pub struct SegmentProcessor {
    db: SqlitePool,
    remote: RemoteCallClient,
    event_bus: EventBus,
    questions_per_segment: u32,
}

impl SegmentProcessor {
    pub fn new(
        db: SqlitePool,
        remote: RemoteCallClient,
        event_bus: EventBus,
        questions_per_segment: u32,
    ) -> Self {
        Self {
            db,
            remote,
            event_bus,
            questions_per_segment,
        }
    }

    /// Process every PENDING or FAILED segment; completed segments are skipped.
    ///
    /// Returns `Err(PipelineError::Cancelled)` if `cancel` fires; segments finished
    /// before that keep their questions.
    pub async fn process_segments(
        &self,
        video_id: Uuid,
        segments: &[TranscriptSegment],
        cancel: &CancellationToken,
    ) -> Result<SegmentRunSummary, PipelineError> {
        let mut summary = SegmentRunSummary::default();

        let mut ordered: Vec<&TranscriptSegment> =
            segments.iter().filter(|s| s.status.needs_processing()).collect();
        ordered.sort_by_key(|s| s.index);

        tracing::info!(
            video_id = %video_id,
            total_segments = segments.len(),
            to_process = ordered.len(),
            "Generating questions for segments"
        );

        for segment in ordered {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            match self.process_segment(video_id, segment, cancel).await {
                Ok(count) => {
                    summary.completed += 1;
                    summary.questions += count;

                    tracing::info!(
                        video_id = %video_id,
                        segment_index = segment.index,
                        questions = count,
                        "Segment completed"
                    );
                    self.event_bus.emit_lossy(PipelineEvent::SegmentCompleted {
                        video_id,
                        segment_index: segment.index,
                        question_count: count,
                        timestamp: Utc::now(),
                    });
                }
                Err(err) => {
                    let message = err.to_string();
                    self.mark_failed(segment, &message).await;

                    if matches!(err, PipelineError::Cancelled) {
                        return Err(err);
                    }

                    summary.failed += 1;
                    tracing::warn!(
                        video_id = %video_id,
                        segment_index = segment.index,
                        error = %message,
                        "Segment failed, continuing with next segment"
                    );
                    self.event_bus.emit_lossy(PipelineEvent::SegmentFailed {
                        video_id,
                        segment_index: segment.index,
                        error: message,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        Ok(summary)
    }

    async fn process_segment(
        &self,
        video_id: Uuid,
        segment: &TranscriptSegment,
        cancel: &CancellationToken,
    ) -> Result<usize, PipelineError> {
        db::segments::update_segment_status(
            &self.db,
            segment.id,
            SegmentStatus::GeneratingQuestions,
            None,
        )
        .await?;

        let request = GenerationRequest::new(&segment.text, self.questions_per_segment, video_id);

        let candidates = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = self.remote.generate_questions(&request) => result?,
        };

        let questions: Vec<Question> = normalize_candidates(&candidates)
            .into_iter()
            .map(|draft| Question::new(segment.id, video_id, draft))
            .collect();

        if questions.len() < candidates.len() {
            tracing::debug!(
                video_id = %video_id,
                segment_index = segment.index,
                candidates = candidates.len(),
                kept = questions.len(),
                "Some question candidates were discarded"
            );
        }

        db::questions::complete_segment_with_questions(&self.db, segment.id, &questions).await?;

        Ok(questions.len())
    }

    async fn mark_failed(&self, segment: &TranscriptSegment, message: &str) {
        if let Err(e) = db::segments::update_segment_status(
            &self.db,
            segment.id,
            SegmentStatus::Failed,
            Some(message),
        )
        .await
        {
            tracing::error!(
                segment_id = %segment.id,
                error = %e,
                "Failed to record segment failure"
            );
        }
    }
}
