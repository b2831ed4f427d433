//! Remote inference client
//!
//! Wraps the two remote operations (transcription, question generation) in bounded
//! retry with linear backoff. A single attempt either fully succeeds or is discarded;
//! there are no partial results.
//!
//! The transport sits behind [`InferenceApi`] so the pipeline can be driven without a
//! network in tests. [`HttpInferenceApi`] is the production implementation.

mod http;

pub use http::{parse_generation_body, HttpInferenceApi};

use crate::config::RetryPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Remote call failures
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Connection refused/reset, DNS, etc.
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status
    #[error("remote returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Success status but an error body (`{"error": ...}` / `{"detail": ...}`)
    #[error("remote reported error: {0}")]
    Remote(String),

    /// Body did not match the expected shape
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Request could not be built; retrying cannot help
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Retries exhausted; wraps the last underlying failure
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        last: Box<RemoteError>,
    },
}

impl RemoteError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RemoteError::InvalidRequest(_) | RemoteError::Exhausted { .. }
        )
    }
}

/// Transcription endpoint result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionOutput {
    pub text: String,
    /// Seconds
    pub duration: f64,
    #[serde(default)]
    pub language: Option<String>,
}

/// Generation endpoint request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub text: String,
    pub num_questions: u32,
    pub video_id: String,
}

impl GenerationRequest {
    pub fn new(text: impl Into<String>, num_questions: u32, video_id: Uuid) -> Self {
        Self {
            text: text.into(),
            num_questions,
            video_id: video_id.to_string(),
        }
    }
}

/// Single-attempt transport for the remote inference service
#[async_trait]
pub trait InferenceApi: Send + Sync {
    /// Upload file bytes for transcription
    async fn transcribe_once(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<TranscriptionOutput, RemoteError>;

    /// Request question candidates; returns the unvalidated candidate values
    async fn generate_once(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<serde_json::Value>, RemoteError>;

    /// Check that the remote service is reachable
    async fn health(&self) -> Result<(), RemoteError>;
}

/// Retrying client used by the pipeline
#[derive(Clone)]
pub struct RemoteCallClient {
    api: Arc<dyn InferenceApi>,
    transcribe_retry: RetryPolicy,
    generate_retry: RetryPolicy,
}

impl RemoteCallClient {
    pub fn new(
        api: Arc<dyn InferenceApi>,
        transcribe_retry: RetryPolicy,
        generate_retry: RetryPolicy,
    ) -> Self {
        Self {
            api,
            transcribe_retry,
            generate_retry,
        }
    }

    /// Transcribe a stored video file
    pub async fn transcribe(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<TranscriptionOutput, RemoteError> {
        tracing::info!(file_name, size_bytes = bytes.len(), "Requesting transcription");

        let output = with_retry("transcribe", self.transcribe_retry, |_| {
            self.api.transcribe_once(file_name, bytes.clone())
        })
        .await?;

        tracing::info!(
            file_name,
            duration = output.duration,
            chars = output.text.len(),
            "Transcription received"
        );
        Ok(output)
    }

    /// Generate raw question candidates for one segment's text
    pub async fn generate_questions(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<serde_json::Value>, RemoteError> {
        tracing::debug!(
            video_id = %request.video_id,
            num_questions = request.num_questions,
            chars = request.text.len(),
            "Requesting question generation"
        );

        with_retry("generate_questions", self.generate_retry, |_| {
            self.api.generate_once(request)
        })
        .await
    }

    pub async fn health(&self) -> Result<(), RemoteError> {
        self.api.health().await
    }
}

/// Run `call` up to `policy.max_attempts` times.
///
/// Retry `n` (1-based) starts `n * base_delay` after the previous failure. Errors that
/// are not retryable return immediately; the final failure is wrapped in
/// [`RemoteError::Exhausted`].
pub async fn with_retry<F, Fut, T>(
    operation: &'static str,
    policy: RetryPolicy,
    mut call: F,
) -> Result<T, RemoteError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match call(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Remote call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => return Err(err),
            Err(err) if attempt >= max_attempts => {
                tracing::error!(
                    operation,
                    attempt,
                    error = %err,
                    "Remote call failed: retries exhausted"
                );
                return Err(RemoteError::Exhausted {
                    operation,
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => {
                let delay = policy.delay_before_retry(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    error = %err,
                    "Remote call failed, will retry after backoff"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
