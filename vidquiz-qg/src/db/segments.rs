//! Transcript segment persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use vidquiz_common::{Error, Result};

use super::{parse_timestamp, parse_uuid};
use crate::models::{SegmentStatus, TranscriptSegment};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Insert all segments of a video in one transaction
pub async fn insert_segments(pool: &SqlitePool, segments: &[TranscriptSegment]) -> Result<()> {
    retry_on_lock("insert_segments", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        let mut tx = pool.begin().await?;

        for segment in segments {
            sqlx::query(
                r#"
                INSERT INTO transcript_segments (
                    id, video_id, segment_index, start_time, end_time, text,
                    status, error, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(segment.id.to_string())
            .bind(segment.video_id.to_string())
            .bind(segment.index as i64)
            .bind(segment.start_time)
            .bind(segment.end_time)
            .bind(&segment.text)
            .bind(segment.status.as_str())
            .bind(&segment.error)
            .bind(segment.created_at.to_rfc3339())
            .bind(segment.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    })
    .await
}

/// All segments of a video, ordered by index
pub async fn load_segments(pool: &SqlitePool, video_id: Uuid) -> Result<Vec<TranscriptSegment>> {
    let rows = sqlx::query(
        r#"
        SELECT id, video_id, segment_index, start_time, end_time, text,
               status, error, created_at, updated_at
        FROM transcript_segments
        WHERE video_id = ?
        ORDER BY segment_index
        "#,
    )
    .bind(video_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(segment_from_row).collect()
}

/// Update a segment's status and error text
pub async fn update_segment_status(
    pool: &SqlitePool,
    segment_id: Uuid,
    status: SegmentStatus,
    error: Option<&str>,
) -> Result<()> {
    let id = segment_id.to_string();
    let id = &id;

    retry_on_lock("update_segment_status", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        sqlx::query(
            "UPDATE transcript_segments SET status = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

fn segment_from_row(row: &SqliteRow) -> Result<TranscriptSegment> {
    let id: String = row.get("id");
    let video_id: String = row.get("video_id");
    let index: i64 = row.get("segment_index");
    let status: String = row.get("status");
    let status: SegmentStatus = status
        .parse()
        .map_err(|e: String| Error::Internal(format!("Failed to parse segment status: {}", e)))?;
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(TranscriptSegment {
        id: parse_uuid(&id, "transcript_segments.id")?,
        video_id: parse_uuid(&video_id, "transcript_segments.video_id")?,
        index: u32::try_from(index)
            .map_err(|e| Error::Internal(format!("Invalid segment index {}: {}", index, e)))?,
        start_time: row.get("start_time"),
        end_time: row.get("end_time"),
        text: row.get("text"),
        status,
        error: row.get("error"),
        created_at: parse_timestamp(&created_at, "transcript_segments.created_at")?,
        updated_at: parse_timestamp(&updated_at, "transcript_segments.updated_at")?,
    })
}
