//! Data models for vidquiz-qg

pub mod question;
pub mod segment;
pub mod video;

pub use question::{Question, QuestionDraft, QuestionError, MAX_OPTIONS, MIN_OPTIONS};
pub use segment::{SegmentDescriptor, SegmentStatus, TranscriptSegment};
pub use video::{InvalidTransition, StatusTransition, Video, VideoMetadata, VideoStatus};
