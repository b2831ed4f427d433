//! Transcript segments: the unit of question generation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-segment processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentStatus {
    Pending,
    Processing,
    GeneratingQuestions,
    Completed,
    Failed,
}

impl SegmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentStatus::Pending => "PENDING",
            SegmentStatus::Processing => "PROCESSING",
            SegmentStatus::GeneratingQuestions => "GENERATING_QUESTIONS",
            SegmentStatus::Completed => "COMPLETED",
            SegmentStatus::Failed => "FAILED",
        }
    }

    /// Segments the processing loop should (re)visit.
    ///
    /// Jobs for a video never overlap, so a segment still marked in progress when a job
    /// starts was abandoned by an earlier run and is picked up again.
    pub fn needs_processing(&self) -> bool {
        !matches!(self, SegmentStatus::Completed)
    }
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SegmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SegmentStatus::Pending),
            "PROCESSING" => Ok(SegmentStatus::Processing),
            "GENERATING_QUESTIONS" => Ok(SegmentStatus::GeneratingQuestions),
            "COMPLETED" => Ok(SegmentStatus::Completed),
            "FAILED" => Ok(SegmentStatus::Failed),
            other => Err(format!("unknown segment status: {}", other)),
        }
    }
}

/// Segment boundaries and text as computed by the segmenter (not yet persisted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    pub index: u32,
    /// Seconds, inclusive
    pub start_time: f64,
    /// Seconds, exclusive
    pub end_time: f64,
    pub text: String,
}

/// Persisted transcript segment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub id: Uuid,
    pub video_id: Uuid,
    pub index: u32,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub status: SegmentStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TranscriptSegment {
    /// New PENDING segment from a segmenter descriptor
    pub fn from_descriptor(video_id: Uuid, descriptor: SegmentDescriptor) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            video_id,
            index: descriptor.index,
            start_time: descriptor.start_time,
            end_time: descriptor.end_time,
            text: descriptor.text,
            status: SegmentStatus::Pending,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_completed_segments_are_skipped() {
        assert!(SegmentStatus::Pending.needs_processing());
        assert!(SegmentStatus::Failed.needs_processing());
        // Left behind by an interrupted run
        assert!(SegmentStatus::Processing.needs_processing());
        assert!(SegmentStatus::GeneratingQuestions.needs_processing());
        assert!(!SegmentStatus::Completed.needs_processing());
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [
            SegmentStatus::Pending,
            SegmentStatus::Processing,
            SegmentStatus::GeneratingQuestions,
            SegmentStatus::Completed,
            SegmentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SegmentStatus>(), Ok(status));
        }
        assert!("DONE".parse::<SegmentStatus>().is_err());
    }
}
