use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::ids::QuizId;
use crate::model::quiz::{OPTIONS_PER_QUESTION, QuizDefinition};

/// Sentinel marking a question that was never answered.
///
/// Outside the valid `0..4` option range, so it can never match a correct
/// index during scoring.
pub const UNANSWERED: i8 = -1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("expected {expected} answers, got {got}")]
    AnswerCountMismatch { expected: usize, got: usize },

    #[error("answer {value} at position {index} is not a valid option")]
    InvalidAnswer { index: usize, value: i8 },

    #[error("score {score} exceeds total questions {total}")]
    ScoreOutOfRange { score: u32, total: u32 },

    #[error("time taken {got}s exceeds the quiz time budget {limit}s")]
    TimeTakenOutOfRange { got: u32, limit: u32 },
}

/// Immutable record of one completed quiz run.
///
/// Created exactly once per submission; the score is derived at creation
/// time and never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizAttempt {
    quiz_id: QuizId,
    student_name: String,
    score: u32,
    total_questions: u32,
    answers: Vec<i8>,
    time_taken_secs: u32,
    timestamp: DateTime<Utc>,
}

fn check_answers(answers: &[i8]) -> Result<(), AttemptError> {
    for (index, &value) in answers.iter().enumerate() {
        let valid = value == UNANSWERED
            || (0..OPTIONS_PER_QUESTION as i8).contains(&value);
        if !valid {
            return Err(AttemptError::InvalidAnswer { index, value });
        }
    }
    Ok(())
}

impl QuizAttempt {
    /// Scores an answer set against a quiz definition and freezes the result.
    ///
    /// The score counts positions where the selected index equals the
    /// question's correct index; `UNANSWERED` never matches. `elapsed_secs`
    /// is clamped to the quiz time budget.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AnswerCountMismatch` if the answer list length
    /// differs from the question count, or `AttemptError::InvalidAnswer` for
    /// values outside `{-1, 0..4}`.
    pub fn grade(
        quiz: &QuizDefinition,
        student_name: impl Into<String>,
        answers: Vec<i8>,
        elapsed_secs: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        let total = quiz.total_questions();
        if answers.len() != total {
            return Err(AttemptError::AnswerCountMismatch {
                expected: total,
                got: answers.len(),
            });
        }
        check_answers(&answers)?;

        let score = quiz
            .questions()
            .iter()
            .zip(&answers)
            .filter(|(question, answer)| **answer == question.correct_answer() as i8)
            .count() as u32;

        Ok(Self {
            quiz_id: quiz.id().clone(),
            student_name: student_name.into(),
            score,
            total_questions: total as u32,
            answers,
            time_taken_secs: elapsed_secs.min(quiz.time_limit_seconds()),
            timestamp,
        })
    }

    /// Rehydrates an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` if the stored fields violate the attempt
    /// invariants (answer count, answer range, score bound).
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        quiz_id: QuizId,
        student_name: String,
        score: u32,
        total_questions: u32,
        answers: Vec<i8>,
        time_taken_secs: u32,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if answers.len() != total_questions as usize {
            return Err(AttemptError::AnswerCountMismatch {
                expected: total_questions as usize,
                got: answers.len(),
            });
        }
        check_answers(&answers)?;
        if score > total_questions {
            return Err(AttemptError::ScoreOutOfRange {
                score,
                total: total_questions,
            });
        }

        Ok(Self {
            quiz_id,
            student_name,
            score,
            total_questions,
            answers,
            time_taken_secs,
            timestamp,
        })
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz_id
    }

    #[must_use]
    pub fn student_name(&self) -> &str {
        &self.student_name
    }

    /// Count of correctly answered questions.
    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    /// Selected option per question, `UNANSWERED` where none was chosen.
    #[must_use]
    pub fn answers(&self) -> &[i8] {
        &self.answers
    }

    /// Seconds spent on the attempt, within `[0, time_limit_seconds]`.
    #[must_use]
    pub fn time_taken_secs(&self) -> u32 {
        self.time_taken_secs
    }

    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
