//! HTTP API handlers for vidquiz-qg
//!
//! REST endpoints over the pipeline orchestrator plus an SSE event stream.

pub mod health;
pub mod sse;
pub mod videos;

pub use health::health_routes;
pub use sse::event_stream;
pub use videos::video_routes;
