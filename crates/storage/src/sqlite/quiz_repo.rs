use academy_core::model::{Question, QuizDefinition, QuizId};
use sqlx::Row;

use super::mapping::{conn, decode_options, encode_options, ser, u32_from_i64};
use super::SqliteRepository;
use crate::repository::{QuizRepository, StorageError};

struct QuizHeader {
    id: String,
    class_id: String,
    subject_id: String,
    title: String,
    description: String,
    time_limit_minutes: u32,
}

fn map_quiz_header(row: &sqlx::sqlite::SqliteRow) -> Result<QuizHeader, StorageError> {
    Ok(QuizHeader {
        id: row.try_get("id").map_err(ser)?,
        class_id: row.try_get("class_id").map_err(ser)?,
        subject_id: row.try_get("subject_id").map_err(ser)?,
        title: row.try_get("title").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        time_limit_minutes: u32_from_i64(
            "time_limit_minutes",
            row.try_get::<i64, _>("time_limit_minutes").map_err(ser)?,
        )?,
    })
}

fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let prompt: String = row.try_get("prompt").map_err(ser)?;
    let options = decode_options(row.try_get::<&str, _>("options").map_err(ser)?)?;
    let correct = row.try_get::<i64, _>("correct_answer").map_err(ser)?;
    let correct = usize::try_from(correct)
        .map_err(|_| StorageError::Serialization(format!("invalid correct_answer: {correct}")))?;

    Question::new(prompt, options, correct).map_err(ser)
}

impl SqliteRepository {
    async fn load_questions(&self, quiz_id: &str) -> Result<Vec<Question>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT prompt, options, correct_answer
                FROM questions
                WHERE quiz_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_question_row(&row)?);
        }
        Ok(out)
    }

    async fn assemble_quiz(&self, header: QuizHeader) -> Result<QuizDefinition, StorageError> {
        let questions = self.load_questions(&header.id).await?;
        QuizDefinition::new(
            QuizId::new(header.id),
            header.class_id,
            header.subject_id,
            header.title,
            header.description,
            questions,
            header.time_limit_minutes,
        )
        .map_err(ser)
    }
}

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &QuizDefinition) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO quizzes (
                    id, class_id, subject_id, title, description, time_limit_minutes
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    class_id = excluded.class_id,
                    subject_id = excluded.subject_id,
                    title = excluded.title,
                    description = excluded.description,
                    time_limit_minutes = excluded.time_limit_minutes
            ",
        )
        .bind(quiz.id().as_str())
        .bind(quiz.class_id())
        .bind(quiz.subject_id())
        .bind(quiz.title())
        .bind(quiz.description())
        .bind(i64::from(quiz.time_limit_minutes()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Replace the full question list; positions define the order.
        sqlx::query("DELETE FROM questions WHERE quiz_id = ?1")
            .bind(quiz.id().as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (position, question) in quiz.questions().iter().enumerate() {
            let position = i64::try_from(position).map_err(ser)?;
            sqlx::query(
                r"
                    INSERT INTO questions (quiz_id, position, prompt, options, correct_answer)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(quiz.id().as_str())
            .bind(position)
            .bind(question.prompt())
            .bind(encode_options(question.options())?)
            .bind(question.correct_answer() as i64)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }

        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn get_quiz(&self, id: &QuizId) -> Result<QuizDefinition, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, class_id, subject_id, title, description, time_limit_minutes
                FROM quizzes
                WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        self.assemble_quiz(map_quiz_header(&row)?).await
    }

    async fn list_quizzes(&self) -> Result<Vec<QuizDefinition>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, class_id, subject_id, title, description, time_limit_minutes
                FROM quizzes
                ORDER BY class_id, subject_id, title
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(self.assemble_quiz(map_quiz_header(&row)?).await?);
        }
        Ok(out)
    }
}
