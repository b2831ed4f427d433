//! Event types for the vidquiz event system
//!
//! Provides the shared `PipelineEvent` definitions and the broadcast `EventBus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline progress events
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
/// Statuses travel as their persisted string form (e.g. `"GENERATING_QUESTIONS"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A pipeline job was accepted by the worker pool
    JobQueued {
        job_id: Uuid,
        video_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Video status changed (persisted before the event is emitted)
    VideoStatusChanged {
        video_id: Uuid,
        old_status: String,
        new_status: String,
        timestamp: DateTime<Utc>,
    },

    /// Transcript segments were written
    SegmentsCreated {
        video_id: Uuid,
        segment_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One segment finished question generation
    SegmentCompleted {
        video_id: Uuid,
        segment_index: u32,
        question_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// One segment failed; siblings keep going
    SegmentFailed {
        video_id: Uuid,
        segment_index: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Video reached COMPLETED
    VideoCompleted {
        video_id: Uuid,
        segments_completed: usize,
        segments_failed: usize,
        questions_created: usize,
        duration_seconds: u64,
        timestamp: DateTime<Utc>,
    },

    /// Video reached FAILED
    VideoFailed {
        video_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::JobQueued { .. } => "JobQueued",
            PipelineEvent::VideoStatusChanged { .. } => "VideoStatusChanged",
            PipelineEvent::SegmentsCreated { .. } => "SegmentsCreated",
            PipelineEvent::SegmentCompleted { .. } => "SegmentCompleted",
            PipelineEvent::SegmentFailed { .. } => "SegmentFailed",
            PipelineEvent::VideoCompleted { .. } => "VideoCompleted",
            PipelineEvent::VideoFailed { .. } => "VideoFailed",
        }
    }

    /// Video the event refers to
    pub fn video_id(&self) -> Uuid {
        match self {
            PipelineEvent::JobQueued { video_id, .. }
            | PipelineEvent::VideoStatusChanged { video_id, .. }
            | PipelineEvent::SegmentsCreated { video_id, .. }
            | PipelineEvent::SegmentCompleted { video_id, .. }
            | PipelineEvent::SegmentFailed { video_id, .. }
            | PipelineEvent::VideoCompleted { video_id, .. }
            | PipelineEvent::VideoFailed { video_id, .. } => *video_id,
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// slowest subscriber starts losing old events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let video_id = Uuid::new_v4();

        bus.emit_lossy(PipelineEvent::VideoFailed {
            video_id,
            error: "boom".to_string(),
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "VideoFailed");
        assert_eq!(event.video_id(), video_id);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        bus.emit_lossy(PipelineEvent::SegmentsCreated {
            video_id: Uuid::new_v4(),
            segment_count: 3,
            timestamp: Utc::now(),
        });

        // Late subscribers only see events sent after they join
        let mut rx = bus.subscribe();
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PipelineEvent::VideoStatusChanged {
            video_id: Uuid::nil(),
            old_status: "UPLOADED".to_string(),
            new_status: "PROCESSING".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "VideoStatusChanged");
        assert_eq!(json["new_status"], "PROCESSING");
    }
}
