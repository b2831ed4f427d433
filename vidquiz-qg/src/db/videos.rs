//! Video record persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use vidquiz_common::{Error, Result};

use super::{parse_timestamp, parse_uuid};
use crate::models::{Video, VideoMetadata, VideoStatus};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Register a video if no record with its id exists.
///
/// Returns true when a row was inserted.
pub async fn insert_video_if_absent(pool: &SqlitePool, video: &Video) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO videos (
            id, title, storage_path, size_bytes, mime_type, status,
            transcript, duration, language, error, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO NOTHING
        "#,
    )
    .bind(video.id.to_string())
    .bind(&video.title)
    .bind(&video.storage_path)
    .bind(video.size_bytes)
    .bind(&video.mime_type)
    .bind(video.status.as_str())
    .bind(&video.metadata.transcript)
    .bind(video.metadata.duration)
    .bind(&video.metadata.language)
    .bind(&video.error)
    .bind(video.created_at.to_rfc3339())
    .bind(video.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Persist the mutable part of a video (status, metadata, error)
///
/// Uses retry_on_lock; workers for different videos write concurrently.
pub async fn save_video(pool: &SqlitePool, video: &Video) -> Result<()> {
    let id = video.id.to_string();
    let updated_at = video.updated_at.to_rfc3339();
    let (id, updated_at) = (&id, &updated_at);

    let rows = retry_on_lock("save_video", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        let result = sqlx::query(
            r#"
            UPDATE videos SET
                status = ?,
                transcript = ?,
                duration = ?,
                language = ?,
                error = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(video.status.as_str())
        .bind(&video.metadata.transcript)
        .bind(video.metadata.duration)
        .bind(&video.metadata.language)
        .bind(&video.error)
        .bind(updated_at)
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    })
    .await?;

    if rows == 0 {
        return Err(Error::NotFound(format!("Video {}", video.id)));
    }
    Ok(())
}

/// Load a video by id
pub async fn load_video(pool: &SqlitePool, video_id: Uuid) -> Result<Option<Video>> {
    let row = sqlx::query(
        r#"
        SELECT id, title, storage_path, size_bytes, mime_type, status,
               transcript, duration, language, error, created_at, updated_at
        FROM videos
        WHERE id = ?
        "#,
    )
    .bind(video_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| video_from_row(&row)).transpose()
}

fn video_from_row(row: &SqliteRow) -> Result<Video> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let status: VideoStatus = status
        .parse()
        .map_err(|e: String| Error::Internal(format!("Failed to parse video status: {}", e)))?;
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Video {
        id: parse_uuid(&id, "videos.id")?,
        title: row.get("title"),
        storage_path: row.get("storage_path"),
        size_bytes: row.get("size_bytes"),
        mime_type: row.get("mime_type"),
        status,
        metadata: VideoMetadata {
            transcript: row.get("transcript"),
            duration: row.get("duration"),
            language: row.get("language"),
        },
        error: row.get("error"),
        created_at: parse_timestamp(&created_at, "videos.created_at")?,
        updated_at: parse_timestamp(&updated_at, "videos.updated_at")?,
    })
}
