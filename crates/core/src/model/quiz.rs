use thiserror::Error;

use crate::model::ids::QuizId;

/// Every question carries exactly this many answer options.
pub const OPTIONS_PER_QUESTION: usize = 4;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question must have exactly {OPTIONS_PER_QUESTION} options, got {got}")]
    WrongOptionCount { got: usize },

    #[error("correct answer index {got} is out of range")]
    CorrectAnswerOutOfRange { got: usize },

    #[error("quiz must contain at least one question")]
    NoQuestions,

    #[error("time limit must be at least one minute")]
    InvalidTimeLimit,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A single multiple-choice question with one correct option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    prompt: String,
    options: Vec<String>,
    correct_answer: usize,
}

impl Question {
    /// Builds a question, validating option count and correct-answer range.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::EmptyPrompt` for a blank prompt,
    /// `QuizError::WrongOptionCount` unless exactly four options are given, and
    /// `QuizError::CorrectAnswerOutOfRange` if the correct index is not `0..4`.
    pub fn new(
        prompt: impl Into<String>,
        options: Vec<String>,
        correct_answer: usize,
    ) -> Result<Self, QuizError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(QuizError::EmptyPrompt);
        }
        if options.len() != OPTIONS_PER_QUESTION {
            return Err(QuizError::WrongOptionCount { got: options.len() });
        }
        if correct_answer >= OPTIONS_PER_QUESTION {
            return Err(QuizError::CorrectAnswerOutOfRange {
                got: correct_answer,
            });
        }

        Ok(Self {
            prompt,
            options,
            correct_answer,
        })
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    /// Index of the correct option, always in `0..4`.
    #[must_use]
    pub fn correct_answer(&self) -> usize {
        self.correct_answer
    }
}

//
// ─── QUIZ DEFINITION ───────────────────────────────────────────────────────────
//

/// An ordered question set with a wall-clock time limit.
///
/// Owned by the content-management collaborator; read-only to the quiz
/// engine once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizDefinition {
    id: QuizId,
    class_id: String,
    subject_id: String,
    title: String,
    description: String,
    questions: Vec<Question>,
    time_limit_minutes: u32,
}

impl QuizDefinition {
    /// Builds a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoQuestions` for an empty question list and
    /// `QuizError::InvalidTimeLimit` for a zero time limit.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuizId,
        class_id: impl Into<String>,
        subject_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        questions: Vec<Question>,
        time_limit_minutes: u32,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        if time_limit_minutes == 0 {
            return Err(QuizError::InvalidTimeLimit);
        }

        Ok(Self {
            id,
            class_id: class_id.into(),
            subject_id: subject_id.into(),
            title: title.into(),
            description: description.into(),
            questions,
            time_limit_minutes,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn class_id(&self) -> &str {
        &self.class_id
    }

    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Number of questions in this quiz.
    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes
    }

    /// The time budget for one attempt, in seconds.
    #[must_use]
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_minutes * 60
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into(), "d".into()]
    }

    #[test]
    fn question_requires_four_options() {
        let err = Question::new("Q", vec!["a".into(), "b".into()], 0).unwrap_err();
        assert_eq!(err, QuizError::WrongOptionCount { got: 2 });
    }

    #[test]
    fn question_rejects_out_of_range_answer() {
        let err = Question::new("Q", options(), 4).unwrap_err();
        assert_eq!(err, QuizError::CorrectAnswerOutOfRange { got: 4 });
    }

    #[test]
    fn question_rejects_blank_prompt() {
        let err = Question::new("   ", options(), 1).unwrap_err();
        assert_eq!(err, QuizError::EmptyPrompt);
    }

    #[test]
    fn quiz_requires_questions_and_time_limit() {
        let err = QuizDefinition::new(
            QuizId::new("q1"),
            "class-10",
            "maths",
            "Algebra",
            "",
            Vec::new(),
            10,
        )
        .unwrap_err();
        assert_eq!(err, QuizError::NoQuestions);

        let question = Question::new("Q", options(), 0).unwrap();
        let err = QuizDefinition::new(
            QuizId::new("q1"),
            "class-10",
            "maths",
            "Algebra",
            "",
            vec![question],
            0,
        )
        .unwrap_err();
        assert_eq!(err, QuizError::InvalidTimeLimit);
    }

    #[test]
    fn time_limit_converts_to_seconds() {
        let question = Question::new("Q", options(), 0).unwrap();
        let quiz = QuizDefinition::new(
            QuizId::new("q1"),
            "class-10",
            "maths",
            "Algebra",
            "Chapter test",
            vec![question],
            15,
        )
        .unwrap();
        assert_eq!(quiz.time_limit_seconds(), 900);
        assert_eq!(quiz.total_questions(), 1);
    }
}
