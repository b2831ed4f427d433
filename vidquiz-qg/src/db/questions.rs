//! Question persistence

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use vidquiz_common::{Error, Result};

use super::{parse_timestamp, parse_uuid};
use crate::models::{Question, SegmentStatus};
use crate::utils::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Replace a segment's questions and mark it COMPLETED, atomically.
///
/// Any questions left by an earlier partial run of the segment are removed first.
pub async fn complete_segment_with_questions(
    pool: &SqlitePool,
    segment_id: Uuid,
    questions: &[Question],
) -> Result<()> {
    let mut encoded = Vec::with_capacity(questions.len());
    for question in questions {
        let options = serde_json::to_string(&question.options)
            .map_err(|e| Error::Internal(format!("Failed to serialize options: {}", e)))?;
        encoded.push((question, options));
    }
    let segment_id = segment_id.to_string();
    let (segment_id, encoded) = (&segment_id, &encoded);

    retry_on_lock("complete_segment_with_questions", DEFAULT_MAX_LOCK_WAIT_MS, || async move {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM questions WHERE segment_id = ?")
            .bind(segment_id)
            .execute(&mut *tx)
            .await?;

        for (question, options) in encoded {
            sqlx::query(
                r#"
                INSERT INTO questions (
                    id, segment_id, video_id, question, options, correct_answer,
                    explanation, question_order, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(question.id.to_string())
            .bind(question.segment_id.to_string())
            .bind(question.video_id.to_string())
            .bind(&question.question)
            .bind(options)
            .bind(question.correct_answer as i64)
            .bind(&question.explanation)
            .bind(question.order as i64)
            .bind(question.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE transcript_segments SET status = ?, error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(SegmentStatus::Completed.as_str())
        .bind(chrono::Utc::now().to_rfc3339())
        .bind(segment_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    })
    .await
}

/// All questions of a video, in segment order then question order
pub async fn load_questions_for_video(pool: &SqlitePool, video_id: Uuid) -> Result<Vec<Question>> {
    let rows = sqlx::query(
        r#"
        SELECT q.id, q.segment_id, q.video_id, q.question, q.options, q.correct_answer,
               q.explanation, q.question_order, q.created_at
        FROM questions q
        JOIN transcript_segments s ON s.id = q.segment_id
        WHERE q.video_id = ?
        ORDER BY s.segment_index, q.question_order
        "#,
    )
    .bind(video_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(question_from_row).collect()
}

fn question_from_row(row: &SqliteRow) -> Result<Question> {
    let id: String = row.get("id");
    let segment_id: String = row.get("segment_id");
    let video_id: String = row.get("video_id");
    let options: String = row.get("options");
    let options: Vec<String> = serde_json::from_str(&options)
        .map_err(|e| Error::Internal(format!("Failed to deserialize options: {}", e)))?;
    let correct_answer: i64 = row.get("correct_answer");
    let order: i64 = row.get("question_order");
    let created_at: String = row.get("created_at");

    Ok(Question {
        id: parse_uuid(&id, "questions.id")?,
        segment_id: parse_uuid(&segment_id, "questions.segment_id")?,
        video_id: parse_uuid(&video_id, "questions.video_id")?,
        question: row.get("question"),
        options,
        correct_answer: correct_answer.max(0) as usize,
        explanation: row.get("explanation"),
        order: order.max(0) as u32,
        created_at: parse_timestamp(&created_at, "questions.created_at")?,
    })
}
