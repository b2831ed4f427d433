//! Configuration for vidquiz-qg
//!
//! Bootstrap TOML (see `vidquiz_common::config` for file resolution). Every field has
//! a built-in default, so an empty or missing file yields a working configuration.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 5730
//!
//! [logging]
//! level = "info"
//!
//! [remote]
//! transcription_url = "http://localhost:8000/transcribe"
//! generation_url = "http://localhost:8000/generate-mcq"
//!
//! [pipeline]
//! max_retries = 3
//! segment_window_secs = 300.0
//! worker_count = 4
//! queue_capacity = 32
//! admission = "reject"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use vidquiz_common::config::LoggingConfig;
use vidquiz_common::{Error, Result};

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data root folder (database location); CLI and environment take priority
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl TomlConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.remote.validate()
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Remote inference service endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Multipart upload endpoint returning `{text, duration}`
    #[serde(default = "default_transcription_url")]
    pub transcription_url: String,

    /// JSON endpoint returning `{questions: [...]}`
    #[serde(default = "default_generation_url")]
    pub generation_url: String,

    /// Health check of the remote service
    #[serde(default = "default_health_url")]
    pub health_url: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl RemoteConfig {
    fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("transcription_url", &self.transcription_url),
            ("generation_url", &self.generation_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "remote.{} must be an http(s) URL, got {:?}",
                    name, url
                )));
            }
        }
        Ok(())
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            transcription_url: default_transcription_url(),
            generation_url: default_generation_url(),
            health_url: default_health_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// What `submit` does when the job queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionPolicy {
    /// Fail immediately with `QueueFull`
    Reject,
    /// Wait for queue space
    Wait,
}

/// Retry/backoff/timeout, scheduling and segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Attempts per remote operation (first call included)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff base for transcription: retry n waits n * base
    #[serde(default = "default_transcribe_base_delay_secs")]
    pub transcribe_base_delay_secs: f64,

    /// Linear backoff base for question generation
    #[serde(default = "default_generate_base_delay_secs")]
    pub generate_base_delay_secs: f64,

    /// Per-call timeout for question generation (model inference is slow)
    #[serde(default = "default_per_call_timeout_secs")]
    pub per_call_timeout_secs: u64,

    /// Per-call timeout for transcription uploads
    #[serde(default = "default_transcribe_timeout_secs")]
    pub transcribe_timeout_secs: u64,

    /// Longest transcript duration accepted from the transcription endpoint
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,

    /// Segment length in seconds
    #[serde(default = "default_segment_window_secs")]
    pub segment_window_secs: f64,

    /// `num_questions` sent per segment
    #[serde(default = "default_questions_per_segment")]
    pub questions_per_segment: u32,

    /// Concurrent pipeline jobs
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Jobs waiting for a worker
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_admission")]
    pub admission: AdmissionPolicy,
}

/// Largest accepted retry backoff base
pub const MAX_BASE_DELAY_SECS: f64 = 3600.0;

impl PipelineSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::Config("pipeline.max_retries must be at least 1".into()));
        }
        if !(self.segment_window_secs.is_finite() && self.segment_window_secs > 0.0) {
            return Err(Error::Config(format!(
                "pipeline.segment_window_secs must be > 0, got {}",
                self.segment_window_secs
            )));
        }
        for (name, value) in [
            ("transcribe_base_delay_secs", self.transcribe_base_delay_secs),
            ("generate_base_delay_secs", self.generate_base_delay_secs),
        ] {
            if !(value.is_finite() && (0.0..=MAX_BASE_DELAY_SECS).contains(&value)) {
                return Err(Error::Config(format!(
                    "pipeline.{} must be between 0 and {}, got {}",
                    name, MAX_BASE_DELAY_SECS, value
                )));
            }
        }
        if !(self.max_duration_secs.is_finite() && self.max_duration_secs > 0.0) {
            return Err(Error::Config(format!(
                "pipeline.max_duration_secs must be > 0, got {}",
                self.max_duration_secs
            )));
        }
        if self.per_call_timeout_secs == 0 || self.transcribe_timeout_secs == 0 {
            return Err(Error::Config("pipeline timeouts must be > 0".into()));
        }
        if self.questions_per_segment == 0 {
            return Err(Error::Config("pipeline.questions_per_segment must be > 0".into()));
        }
        if self.worker_count == 0 || self.queue_capacity == 0 {
            return Err(Error::Config(
                "pipeline.worker_count and pipeline.queue_capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn transcribe_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: backoff_base(self.transcribe_base_delay_secs),
        }
    }

    pub fn generate_retry(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: backoff_base(self.generate_base_delay_secs),
        }
    }
}

/// Out-of-range values (unvalidated settings) fall back to zero or the cap
fn backoff_base(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.min(MAX_BASE_DELAY_SECS)).unwrap_or_default()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            transcribe_base_delay_secs: default_transcribe_base_delay_secs(),
            generate_base_delay_secs: default_generate_base_delay_secs(),
            per_call_timeout_secs: default_per_call_timeout_secs(),
            transcribe_timeout_secs: default_transcribe_timeout_secs(),
            max_duration_secs: default_max_duration_secs(),
            segment_window_secs: default_segment_window_secs(),
            questions_per_segment: default_questions_per_segment(),
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            admission: default_admission(),
        }
    }
}

/// Bounded linear backoff: attempt n+1 starts `n * base_delay` after attempt n failed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.base_delay * retry
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5730
}

fn default_transcription_url() -> String {
    "http://localhost:8000/transcribe".to_string()
}

fn default_generation_url() -> String {
    "http://localhost:8000/generate-mcq".to_string()
}

fn default_health_url() -> String {
    "http://localhost:8000/health".to_string()
}

fn default_user_agent() -> String {
    format!("vidquiz-qg/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_retries() -> u32 {
    3
}

fn default_transcribe_base_delay_secs() -> f64 {
    2.0
}

fn default_generate_base_delay_secs() -> f64 {
    5.0
}

fn default_per_call_timeout_secs() -> u64 {
    600
}

fn default_transcribe_timeout_secs() -> u64 {
    300
}

fn default_max_duration_secs() -> f64 {
    // 24 hours
    86_400.0
}

fn default_segment_window_secs() -> f64 {
    300.0
}

fn default_questions_per_segment() -> u32 {
    3
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    32
}

fn default_admission() -> AdmissionPolicy {
    AdmissionPolicy::Reject
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 5730);
        assert_eq!(config.pipeline.max_retries, 3);
        assert_eq!(config.pipeline.segment_window_secs, 300.0);
        assert_eq!(config.pipeline.admission, AdmissionPolicy::Reject);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: TomlConfig = toml::from_str(
            "[pipeline]\nworker_count = 2\nadmission = \"wait\"\n",
        )
        .unwrap();
        assert_eq!(config.pipeline.worker_count, 2);
        assert_eq!(config.pipeline.admission, AdmissionPolicy::Wait);
        assert_eq!(config.pipeline.queue_capacity, 32);
    }

    #[test]
    fn test_retry_policies_are_linear() {
        let settings = PipelineSettings::default();
        let transcribe = settings.transcribe_retry();
        assert_eq!(transcribe.max_attempts, 3);
        assert_eq!(transcribe.delay_before_retry(1), Duration::from_secs(2));
        assert_eq!(transcribe.delay_before_retry(2), Duration::from_secs(4));

        let generate = settings.generate_retry();
        assert_eq!(generate.delay_before_retry(2), Duration::from_secs(10));
    }

    #[test]
    fn test_backoff_base_is_bounded() {
        let mut settings = PipelineSettings {
            transcribe_base_delay_secs: 1e30,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        assert_eq!(
            settings.transcribe_retry().base_delay,
            Duration::from_secs_f64(MAX_BASE_DELAY_SECS)
        );

        settings.transcribe_base_delay_secs = MAX_BASE_DELAY_SECS;
        assert!(settings.validate().is_ok());

        settings.generate_base_delay_secs = -1.0;
        assert!(settings.validate().is_err());
        assert_eq!(settings.generate_retry().base_delay, Duration::ZERO);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut settings = PipelineSettings {
            segment_window_secs: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        settings.segment_window_secs = 300.0;
        settings.worker_count = 0;
        assert!(settings.validate().is_err());

        settings.worker_count = 1;
        settings.max_retries = 0;
        assert!(settings.validate().is_err());

        settings.max_retries = 3;
        settings.max_duration_secs = f64::INFINITY;
        assert!(settings.validate().is_err());

        let mut config = TomlConfig::default();
        config.remote.generation_url = "localhost:8000".to_string();
        assert!(config.validate().is_err());
    }
}
