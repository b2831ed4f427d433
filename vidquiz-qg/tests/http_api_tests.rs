//! Integration tests for vidquiz-qg HTTP endpoints

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use helpers::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

/// Send one request through the router and decode the JSON body
async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

fn write_video_file(dir: &tempfile::TempDir) -> String {
    let path = dir.path().join("lecture.mp4");
    std::fs::write(&path, b"\x00\x00\x00\x18ftypmp42fake video bytes").unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api));

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "vidquiz-qg");
    assert_eq!(body["remote"], "ok");
    assert_eq!(body["jobs_in_flight"], 0);
    assert!(body["last_error"].is_null());
}

#[tokio::test]
async fn test_health_reports_unreachable_remote() {
    let (_dir, pool) = create_test_db().await;
    let mut scripted = ScriptedInferenceApi::new(10, 60.0);
    scripted.healthy = false;
    let app = vidquiz_qg::build_router(app_state(&pool, Arc::new(scripted)));

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["remote"], "unreachable");
}

#[tokio::test]
async fn test_unknown_video_returns_404() {
    let (_dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api));
    let id = Uuid::new_v4();

    for uri in [
        format!("/videos/{}", id),
        format!("/videos/{}/transcript", id),
        format!("/videos/{}/segments", id),
        format!("/videos/{}/questions", id),
    ] {
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }

    let (status, _) = send(&app, "POST", &format!("/videos/{}/transcription", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upload_signal_runs_full_pipeline() {
    let (dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(40, 905.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api.clone()));
    let video_id = Uuid::new_v4();

    let (status, body) = send(
        &app,
        "POST",
        "/videos/uploaded",
        Some(json!({
            "videoId": video_id,
            "storagePath": write_video_file(&dir),
            "title": "Networking 101"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["video"]["id"], video_id.to_string());
    assert_eq!(body["video"]["status"], "UPLOADED");
    assert_eq!(body["job"]["kind"], "pipeline");
    assert_eq!(body["job"]["videoId"], video_id.to_string());

    let video = wait_for_terminal(&pool, video_id).await;
    assert_eq!(video.status.as_str(), "COMPLETED");

    let (status, body) = send(&app, "GET", &format!("/videos/{}/questions", video_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let questions = body["questions"].as_array().unwrap();
    assert_eq!(questions.len(), 4);
    assert!(questions[0]["options"].as_array().unwrap().len() >= 2);
    assert!(questions[0]["correctAnswer"].is_u64());

    let (status, body) = send(&app, "GET", &format!("/videos/{}/segments", video_id), None).await;
    assert_eq!(status, StatusCode::OK);
    let segments = body["segments"].as_array().unwrap();
    assert_eq!(segments.len(), 4);
    assert_eq!(segments[3]["endTime"], 905.0);

    let (status, body) = send(&app, "GET", &format!("/videos/{}/transcript", video_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["duration"], 905.0);
    assert!(body["transcript"].as_str().unwrap().starts_with("word1"));

    // A completed video cannot be transcribed again
    let (status, body) = send(
        &app,
        "POST",
        &format!("/videos/{}/transcription", video_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
    assert_eq!(api.transcribe_count(), 1);
}

#[tokio::test]
async fn test_upload_signal_is_idempotent_for_started_video() {
    let (dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api.clone()));
    let video_id = Uuid::new_v4();
    let request = json!({"videoId": video_id, "storagePath": write_video_file(&dir)});

    let (status, _) = send(&app, "POST", "/videos/uploaded", Some(request.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_terminal(&pool, video_id).await;

    let (status, _) = send(&app, "POST", "/videos/uploaded", Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(api.transcribe_count(), 1);
}

#[tokio::test]
async fn test_failed_pipeline_is_reported() {
    let (dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    for _ in 0..3 {
        api.push_transcription(Err(vidquiz_qg::services::RemoteError::Network(
            "connection refused".into(),
        )));
    }
    let state = app_state(&pool, api);
    let app = vidquiz_qg::build_router(state.clone());
    let video_id = Uuid::new_v4();

    send(
        &app,
        "POST",
        "/videos/uploaded",
        Some(json!({"videoId": video_id, "storagePath": write_video_file(&dir)})),
    )
    .await;
    wait_for_terminal(&pool, video_id).await;

    let (status, body) = send(&app, "GET", &format!("/videos/{}", video_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILED");
    assert!(!body["error"].as_str().unwrap().is_empty());

    let (status, _) = send(&app, "GET", &format!("/videos/{}/transcript", video_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_empty_storage_path_is_rejected() {
    let (_dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api));

    let (status, body) = send(
        &app,
        "POST",
        "/videos/uploaded",
        Some(json!({"videoId": Uuid::new_v4(), "storagePath": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_generate_questions_requires_transcript() {
    let (dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api));
    let video = seed_video(&pool, &dir).await;

    let (status, _) = send(&app, "POST", &format!("/videos/{}/questions", video.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, "POST", &format!("/videos/{}/segments", video.id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_cancel_without_running_job() {
    let (dir, pool) = create_test_db().await;
    let api = Arc::new(ScriptedInferenceApi::new(10, 60.0));
    let app = vidquiz_qg::build_router(app_state(&pool, api));
    let video = seed_video(&pool, &dir).await;

    let (status, body) = send(&app, "POST", &format!("/videos/{}/cancel", video.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], false);
    assert_eq!(body["videoId"], video.id.to_string());
}

#[tokio::test]
async fn test_panicking_job_marks_video_failed_and_frees_worker() {
    let (dir, pool) = create_test_db().await;
    let mut scripted = ScriptedInferenceApi::new(10, 60.0);
    scripted.panic_on_transcribe = true;
    let app = vidquiz_qg::build_router(app_state(&pool, Arc::new(scripted)));
    let video_id = Uuid::new_v4();

    let (status, _) = send(
        &app,
        "POST",
        "/videos/uploaded",
        Some(json!({"videoId": video_id, "storagePath": write_video_file(&dir)})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let video = wait_for_terminal(&pool, video_id).await;
    assert_eq!(video.status.as_str(), "FAILED");
    assert!(video.error.unwrap().contains("panicked"));

    let (_, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(body["jobs_in_flight"], 0);
}
