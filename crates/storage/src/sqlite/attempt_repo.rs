use academy_core::model::{AttemptId, QuizAttempt, QuizId};
use sqlx::Row;

use super::mapping::{conn, decode_answers, encode_answers, ser, u32_from_i64};
use super::SqliteRepository;
use crate::repository::{AttemptRepository, StorageError};

fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<QuizAttempt, StorageError> {
    let quiz_id: String = row.try_get("quiz_id").map_err(ser)?;
    let student_name: String = row.try_get("student_name").map_err(ser)?;
    let score = u32_from_i64("score", row.try_get::<i64, _>("score").map_err(ser)?)?;
    let total = u32_from_i64(
        "total_questions",
        row.try_get::<i64, _>("total_questions").map_err(ser)?,
    )?;
    let answers = decode_answers(row.try_get::<&str, _>("answers").map_err(ser)?)?;
    let time_taken = u32_from_i64(
        "time_taken_secs",
        row.try_get::<i64, _>("time_taken_secs").map_err(ser)?,
    )?;
    let timestamp = row.try_get("timestamp").map_err(ser)?;

    QuizAttempt::from_persisted(
        QuizId::new(quiz_id),
        student_name,
        score,
        total,
        answers,
        time_taken,
        timestamp,
    )
    .map_err(ser)
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<AttemptId, StorageError> {
        let id = AttemptId::generate();

        sqlx::query(
            r"
                INSERT INTO quiz_attempts (
                    id, quiz_id, student_name, score, total_questions,
                    answers, time_taken_secs, timestamp
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id.as_str())
        .bind(attempt.quiz_id().as_str())
        .bind(attempt.student_name())
        .bind(i64::from(attempt.score()))
        .bind(i64::from(attempt.total_questions()))
        .bind(encode_answers(attempt.answers())?)
        .bind(i64::from(attempt.time_taken_secs()))
        .bind(attempt.timestamp())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(id)
    }

    async fn get_attempt(&self, id: &AttemptId) -> Result<QuizAttempt, StorageError> {
        let row = sqlx::query(
            r"
                SELECT quiz_id, student_name, score, total_questions,
                       answers, time_taken_secs, timestamp
                FROM quiz_attempts
                WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_attempt_row(&row)
    }

    async fn list_attempts_for_quiz(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Vec<(AttemptId, QuizAttempt)>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, quiz_id, student_name, score, total_questions,
                       answers, time_taken_secs, timestamp
                FROM quiz_attempts
                WHERE quiz_id = ?1
                ORDER BY timestamp DESC, id DESC
            ",
        )
        .bind(quiz_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(ser)?;
            out.push((AttemptId::new(id), map_attempt_row(&row)?));
        }
        Ok(out)
    }
}
