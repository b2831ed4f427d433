//! Video processing state machine
//!
//! UPLOADED → PROCESSING → TRANSCRIBING → GENERATING_QUESTIONS → COMPLETED,
//! with any non-terminal state allowed to fall to FAILED.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Video processing status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoStatus {
    /// File stored by the upload collaborator, pipeline not started
    Uploaded,
    /// Pipeline picked up the video
    Processing,
    /// Remote transcription in flight
    Transcribing,
    /// Segments written, questions being generated
    GeneratingQuestions,
    /// Pipeline finished (possibly with failed segments)
    Completed,
    /// Pipeline halted with an error
    Failed,
}

impl VideoStatus {
    /// Persisted string form
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "UPLOADED",
            VideoStatus::Processing => "PROCESSING",
            VideoStatus::Transcribing => "TRANSCRIBING",
            VideoStatus::GeneratingQuestions => "GENERATING_QUESTIONS",
            VideoStatus::Completed => "COMPLETED",
            VideoStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, VideoStatus::Completed | VideoStatus::Failed)
    }

    /// Whether `self → next` is a legal move.
    ///
    /// Forward moves follow the phase order one step at a time; FAILED is reachable
    /// from every non-terminal state; nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        match (self, next) {
            (Completed | Failed, _) => false,
            (_, Failed) => true,
            (Uploaded, Processing)
            | (Processing, Transcribing)
            | (Transcribing, GeneratingQuestions)
            | (GeneratingQuestions, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADED" => Ok(VideoStatus::Uploaded),
            "PROCESSING" => Ok(VideoStatus::Processing),
            "TRANSCRIBING" => Ok(VideoStatus::Transcribing),
            "GENERATING_QUESTIONS" => Ok(VideoStatus::GeneratingQuestions),
            "COMPLETED" => Ok(VideoStatus::Completed),
            "FAILED" => Ok(VideoStatus::Failed),
            other => Err(format!("unknown video status: {}", other)),
        }
    }
}

/// Rejected status change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: VideoStatus,
    pub to: VideoStatus,
}

/// Status transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusTransition {
    pub video_id: Uuid,
    pub old_status: VideoStatus,
    pub new_status: VideoStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// Transcription output attached to a video (set once)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub transcript: Option<String>,
    /// Seconds
    pub duration: Option<f64>,
    pub language: Option<String>,
}

/// Uploaded video record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub storage_path: String,
    pub size_bytes: Option<i64>,
    pub mime_type: Option<String>,
    pub status: VideoStatus,
    pub metadata: VideoMetadata,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// New record in UPLOADED state
    pub fn new(id: Uuid, title: String, storage_path: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            storage_path,
            size_bytes: None,
            mime_type: None,
            status: VideoStatus::Uploaded,
            metadata: VideoMetadata::default(),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `new_status`, enforcing the state machine.
    pub fn transition_to(
        &mut self,
        new_status: VideoStatus,
    ) -> Result<StatusTransition, InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }

        let transition = StatusTransition {
            video_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;
        self.updated_at = transition.transitioned_at;
        Ok(transition)
    }

    /// Move to FAILED and record the cause.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<StatusTransition, InvalidTransition> {
        let transition = self.transition_to(VideoStatus::Failed)?;
        self.error = Some(message.into());
        Ok(transition)
    }

    /// Non-empty transcript, if one has been recorded
    pub fn transcript(&self) -> Option<&str> {
        self.metadata
            .transcript
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video() -> Video {
        Video::new(Uuid::new_v4(), "Lecture 1".to_string(), "/tmp/l1.mp4".to_string())
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut v = video();
        for next in [
            VideoStatus::Processing,
            VideoStatus::Transcribing,
            VideoStatus::GeneratingQuestions,
            VideoStatus::Completed,
        ] {
            let t = v.transition_to(next).unwrap();
            assert_eq!(t.new_status, next);
        }
        assert!(v.status.is_terminal());
    }

    #[test]
    fn test_cannot_skip_phases() {
        let mut v = video();
        let err = v.transition_to(VideoStatus::Transcribing).unwrap_err();
        assert_eq!(err.from, VideoStatus::Uploaded);
        assert_eq!(v.status, VideoStatus::Uploaded);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut v = video();
        v.fail("boom").unwrap();
        assert_eq!(v.error.as_deref(), Some("boom"));
        assert!(v.transition_to(VideoStatus::Processing).is_err());
        assert!(v.fail("again").is_err());
        assert_eq!(v.error.as_deref(), Some("boom"));

        assert!(!VideoStatus::Completed.can_transition_to(VideoStatus::Failed));
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for status in [
            VideoStatus::Uploaded,
            VideoStatus::Processing,
            VideoStatus::Transcribing,
            VideoStatus::GeneratingQuestions,
        ] {
            assert!(status.can_transition_to(VideoStatus::Failed), "{status}");
        }
    }

    #[test]
    fn test_status_string_round_trip() {
        for status in [
            VideoStatus::Uploaded,
            VideoStatus::GeneratingQuestions,
            VideoStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<VideoStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<VideoStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&VideoStatus::GeneratingQuestions).unwrap(),
            "\"GENERATING_QUESTIONS\""
        );
    }

    #[test]
    fn test_blank_transcript_is_treated_as_missing() {
        let mut v = video();
        v.metadata.transcript = Some("   ".to_string());
        assert!(v.transcript().is_none());
    }
}
