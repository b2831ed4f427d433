//! HTTP transport for the remote inference service

use super::{GenerationRequest, InferenceApi, RemoteError, TranscriptionOutput};
use crate::config::{PipelineSettings, RemoteConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// reqwest-backed [`InferenceApi`]
pub struct HttpInferenceApi {
    http_client: reqwest::Client,
    transcription_url: String,
    generation_url: String,
    health_url: String,
    transcribe_timeout: Duration,
    generate_timeout: Duration,
}

impl HttpInferenceApi {
    pub fn new(remote: &RemoteConfig, settings: &PipelineSettings) -> Result<Self, RemoteError> {
        let http_client = reqwest::Client::builder()
            .user_agent(remote.user_agent.as_str())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http_client,
            transcription_url: remote.transcription_url.clone(),
            generation_url: remote.generation_url.clone(),
            health_url: remote.health_url.clone(),
            transcribe_timeout: Duration::from_secs(settings.transcribe_timeout_secs),
            generate_timeout: Duration::from_secs(settings.per_call_timeout_secs),
        })
    }

    fn map_send_error(err: reqwest::Error, timeout: Duration) -> RemoteError {
        if err.is_timeout() {
            RemoteError::Timeout(timeout)
        } else if err.is_builder() {
            RemoteError::InvalidRequest(err.to_string())
        } else {
            RemoteError::Network(err.to_string())
        }
    }

    async fn read_success_body(
        response: reqwest::Response,
        timeout: Duration,
    ) -> Result<String, RemoteError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Self::map_send_error(e, timeout))?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body: truncate(&body, 500),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl InferenceApi for HttpInferenceApi {
    async fn transcribe_once(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<TranscriptionOutput, RemoteError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| RemoteError::InvalidRequest(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(&self.transcription_url)
            .timeout(self.transcribe_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.transcribe_timeout))?;

        let body = Self::read_success_body(response, self.transcribe_timeout).await?;

        serde_json::from_str::<TranscriptionOutput>(&body)
            .map_err(|e| RemoteError::MalformedResponse(format!("transcription body: {}", e)))
    }

    async fn generate_once(&self, request: &GenerationRequest) -> Result<Vec<Value>, RemoteError> {
        let response = self
            .http_client
            .post(&self.generation_url)
            .timeout(self.generate_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, self.generate_timeout))?;

        let body = Self::read_success_body(response, self.generate_timeout).await?;
        let candidates = parse_generation_body(&body)?;

        tracing::debug!(
            video_id = %request.video_id,
            candidates = candidates.len(),
            "Generation response parsed"
        );
        Ok(candidates)
    }

    async fn health(&self) -> Result<(), RemoteError> {
        let timeout = Duration::from_secs(5);
        let response = self
            .http_client
            .get(&self.health_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::map_send_error(e, timeout))?;

        Self::read_success_body(response, timeout).await.map(|_| ())
    }
}

/// Extract the candidate list from a generation response body.
///
/// Accepted shapes: `{"questions": [...]}`, a bare array, or `{"questions": "<json>"}`
/// where the string holds one of the former, optionally inside a markdown code fence.
/// `{"error": ...}` / `{"detail": ...}` bodies and anything else are failures.
pub fn parse_generation_body(body: &str) -> Result<Vec<Value>, RemoteError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|e| RemoteError::MalformedResponse(format!("generation body is not JSON: {}", e)))?;
    extract_candidates(value, true)
}

fn extract_candidates(value: Value, allow_encoded: bool) -> Result<Vec<Value>, RemoteError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            if let Some(questions) = map.remove("questions") {
                return match questions {
                    Value::Array(items) => Ok(items),
                    Value::String(encoded) if allow_encoded => {
                        let inner: Value = serde_json::from_str(strip_code_fence(&encoded))
                            .map_err(|e| {
                                RemoteError::MalformedResponse(format!(
                                    "encoded questions are not JSON: {}",
                                    e
                                ))
                            })?;
                        extract_candidates(inner, false)
                    }
                    other => Err(RemoteError::MalformedResponse(format!(
                        "questions field has unexpected type: {}",
                        json_type(&other)
                    ))),
                };
            }

            if let Some(message) = map.get("error").or_else(|| map.get("detail")) {
                let message = match message {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(RemoteError::Remote(message));
            }

            Err(RemoteError::MalformedResponse(
                "expected an object with a questions field".to_string(),
            ))
        }
        other => Err(RemoteError::MalformedResponse(format!(
            "expected object or array, got {}",
            json_type(&other)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrapped_questions() {
        let body = r#"{"questions": [{"question": "A?"}, {"question": "B?"}]}"#;
        assert_eq!(parse_generation_body(body).unwrap().len(), 2);
    }

    #[test]
    fn test_bare_array() {
        let candidates = parse_generation_body(r#"[{"question": "A?"}, 3]"#).unwrap();
        assert_eq!(candidates, vec![json!({"question": "A?"}), json!(3)]);
    }

    #[test]
    fn test_encoded_questions_in_code_fence() {
        let body = json!({
            "questions": "```json\n[{\"question\": \"A?\"}]\n```"
        })
        .to_string();
        assert_eq!(parse_generation_body(&body).unwrap(), vec![json!({"question": "A?"})]);
    }

    #[test]
    fn test_empty_list_is_valid() {
        assert!(parse_generation_body(r#"{"questions": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_error_body_is_failure() {
        let err = parse_generation_body(r#"{"detail": "Text cannot be empty"}"#).unwrap_err();
        assert!(matches!(err, RemoteError::Remote(ref m) if m == "Text cannot be empty"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unexpected_shapes_are_malformed() {
        for body in ["not json", "42", r#"{"answers": []}"#, r#"{"questions": 7}"#] {
            assert!(
                matches!(parse_generation_body(body), Err(RemoteError::MalformedResponse(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn test_mime_for_extension() {
        assert_eq!(mime_for("lecture.MP4"), "video/mp4");
        assert_eq!(mime_for("clip.webm"), "video/webm");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }

    #[test]
    fn test_truncate_long_bodies() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
