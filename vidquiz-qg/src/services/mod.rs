//! Pipeline services
//!
//! Leaf-first: segmenter, remote client and normalizer are used by the segment
//! processor, which the orchestrator drives from the worker pool.

pub mod pipeline_orchestrator;
pub mod question_normalizer;
pub mod remote_client;
pub mod segment_processor;
pub mod segmenter;
pub mod worker_pool;

pub use pipeline_orchestrator::{
    ErrorKind, PipelineError, PipelineOrchestrator, PipelineReport, TranscriptView, VideoLocks,
};
pub use question_normalizer::normalize_candidates;
pub use remote_client::{
    GenerationRequest, HttpInferenceApi, InferenceApi, RemoteCallClient, RemoteError,
    TranscriptionOutput,
};
pub use segment_processor::{SegmentProcessor, SegmentRunSummary};
pub use segmenter::{segment_transcript, SegmentError, DEFAULT_WINDOW_SECS, MAX_SEGMENTS};
pub use worker_pool::{JobHandle, JobKind, JobResult, JobRunner, PipelineWorkers, SubmitError};
