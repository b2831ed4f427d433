//! Shared test utilities for vidquiz-qg integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;
use vidquiz_common::events::EventBus;
use vidquiz_qg::config::{AdmissionPolicy, PipelineSettings};
use vidquiz_qg::models::{Video, VideoStatus};
use vidquiz_qg::services::{
    GenerationRequest, InferenceApi, PipelineOrchestrator, RemoteCallClient, RemoteError,
    TranscriptionOutput,
};
use vidquiz_qg::AppState;

/// Temporary database with tables created
///
/// TempDir must be kept alive for the duration of the test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test_vidquiz.db");
    let pool = vidquiz_qg::db::init_database_pool(&db_path)
        .await
        .expect("Failed to create test database");
    (temp_dir, pool)
}

/// Settings with zero backoff so retry paths run instantly
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        transcribe_base_delay_secs: 0.0,
        generate_base_delay_secs: 0.0,
        worker_count: 2,
        queue_capacity: 8,
        admission: AdmissionPolicy::Reject,
        ..Default::default()
    }
}

/// Write a fake video file and register it as UPLOADED
pub async fn seed_video(pool: &SqlitePool, dir: &TempDir) -> Video {
    let path: PathBuf = dir.path().join(format!("{}.mp4", Uuid::new_v4()));
    std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42fake video bytes").unwrap();

    let video = Video::new(
        Uuid::new_v4(),
        "Networking 101".to_string(),
        path.to_string_lossy().into_owned(),
    );
    vidquiz_qg::db::videos::insert_video_if_absent(pool, &video)
        .await
        .unwrap();
    video
}

/// A well-formed four-option candidate
pub fn candidate(text: &str) -> Value {
    json!({
        "question": text,
        "options": ["FTP", "SMTP", "HTTP", "SSH"],
        "correctAnswer": 2,
        "explanation": "HTTP serves web pages."
    })
}

/// Scripted remote: pops queued responses in call order, then falls back to defaults
pub struct ScriptedInferenceApi {
    transcriptions: Mutex<VecDeque<Result<TranscriptionOutput, RemoteError>>>,
    default_transcription: Result<TranscriptionOutput, RemoteError>,
    generations: Mutex<VecDeque<Result<Vec<Value>, RemoteError>>>,
    default_generation: Result<Vec<Value>, RemoteError>,
    pub transcribe_calls: Mutex<Vec<String>>,
    pub generate_calls: Mutex<Vec<GenerationRequest>>,
    pub healthy: bool,
    /// Panic inside the transcription call, as a bug in the transport would
    pub panic_on_transcribe: bool,
}

impl ScriptedInferenceApi {
    /// Transcript of `words` words over `duration` seconds; every segment gets one question
    pub fn new(words: usize, duration: f64) -> Self {
        let text = (1..=words).map(|i| format!("word{}", i)).collect::<Vec<_>>().join(" ");
        Self {
            transcriptions: Mutex::new(VecDeque::new()),
            default_transcription: Ok(TranscriptionOutput {
                text,
                duration,
                language: Some("en".to_string()),
            }),
            generations: Mutex::new(VecDeque::new()),
            default_generation: Ok(vec![candidate("Which protocol serves web pages?")]),
            transcribe_calls: Mutex::new(Vec::new()),
            generate_calls: Mutex::new(Vec::new()),
            healthy: true,
            panic_on_transcribe: false,
        }
    }

    pub fn push_transcription(&self, result: Result<TranscriptionOutput, RemoteError>) {
        self.transcriptions.lock().unwrap().push_back(result);
    }

    pub fn push_generation(&self, result: Result<Vec<Value>, RemoteError>) {
        self.generations.lock().unwrap().push_back(result);
    }

    pub fn with_default_generation(mut self, result: Result<Vec<Value>, RemoteError>) -> Self {
        self.default_generation = result;
        self
    }

    pub fn transcribe_count(&self) -> usize {
        self.transcribe_calls.lock().unwrap().len()
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.lock().unwrap().len()
    }
}

#[async_trait]
impl InferenceApi for ScriptedInferenceApi {
    async fn transcribe_once(
        &self,
        file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<TranscriptionOutput, RemoteError> {
        self.transcribe_calls.lock().unwrap().push(file_name.to_string());
        if self.panic_on_transcribe {
            panic!("transcription transport bug");
        }
        let scripted = self.transcriptions.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.default_transcription.clone())
    }

    async fn generate_once(&self, request: &GenerationRequest) -> Result<Vec<Value>, RemoteError> {
        self.generate_calls.lock().unwrap().push(request.clone());
        let scripted = self.generations.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.default_generation.clone())
    }

    async fn health(&self) -> Result<(), RemoteError> {
        if self.healthy {
            Ok(())
        } else {
            Err(RemoteError::Network("connection refused".to_string()))
        }
    }
}

/// Orchestrator over a scripted remote
pub fn orchestrator(
    pool: &SqlitePool,
    api: Arc<ScriptedInferenceApi>,
    settings: PipelineSettings,
) -> (PipelineOrchestrator, EventBus) {
    let event_bus = EventBus::new(256);
    let remote = RemoteCallClient::new(api, settings.transcribe_retry(), settings.generate_retry());
    (
        PipelineOrchestrator::new(pool.clone(), event_bus.clone(), remote, settings),
        event_bus,
    )
}

/// Full application state over a scripted remote
pub fn app_state(pool: &SqlitePool, api: Arc<ScriptedInferenceApi>) -> AppState {
    AppState::new(pool.clone(), EventBus::new(256), api, fast_settings())
}

/// Poll until the video reaches a terminal status
pub async fn wait_for_terminal(pool: &SqlitePool, video_id: Uuid) -> Video {
    for _ in 0..200 {
        let video = vidquiz_qg::db::videos::load_video(pool, video_id)
            .await
            .unwrap()
            .unwrap();
        if matches!(video.status, VideoStatus::Completed | VideoStatus::Failed) {
            return video;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("video {} did not reach a terminal status", video_id);
}
