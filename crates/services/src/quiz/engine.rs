use chrono::{DateTime, Utc};

use academy_core::model::{
    AttemptId, OPTIONS_PER_QUESTION, Question, QuizAttempt, QuizDefinition, UNANSWERED,
};
use academy_core::time::format_mm_ss;

use crate::error::EngineError;

/// Where an attempt stands in its submission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    /// Answering and navigation are open; the countdown is running.
    InProgress,
    /// Answers are frozen and graded; the attempt record is not yet stored.
    Submitting,
    /// The attempt record is stored; terminal.
    Submitted,
}

/// Outcome of one countdown tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Time remains; carries the new remaining-seconds value.
    Running { remaining_seconds: u32 },
    /// The counter just reached zero; the caller must auto-submit.
    /// Returned exactly once per engine.
    Expired,
    /// The countdown no longer applies (already expired or submitting).
    Idle,
}

/// Drives one student through one timed quiz attempt.
///
/// Pure state machine: timers and persistence live in `QuizTimer` and
/// `QuizLoopService`.
#[derive(Debug)]
pub struct QuizEngine {
    quiz: QuizDefinition,
    student_name: String,
    current_index: usize,
    answers: Vec<i8>,
    remaining_seconds: u32,
    state: SubmissionState,
    pending: Option<QuizAttempt>,
    attempt_id: Option<AttemptId>,
}

impl QuizEngine {
    /// Start an attempt: first question, all answers unanswered, full time
    /// budget.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Empty` for a definition with no questions.
    pub fn new(quiz: QuizDefinition, student_name: impl Into<String>) -> Result<Self, EngineError> {
        if quiz.questions().is_empty() {
            return Err(EngineError::Empty);
        }

        let answers = vec![UNANSWERED; quiz.total_questions()];
        let remaining_seconds = quiz.time_limit_seconds();
        Ok(Self {
            quiz,
            student_name: student_name.into(),
            current_index: 0,
            answers,
            remaining_seconds,
            state: SubmissionState::InProgress,
            pending: None,
            attempt_id: None,
        })
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizDefinition {
        &self.quiz
    }

    #[must_use]
    pub fn student_name(&self) -> &str {
        &self.student_name
    }

    #[must_use]
    pub fn state(&self) -> SubmissionState {
        self.state
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        &self.quiz.questions()[self.current_index]
    }

    #[must_use]
    pub fn answers(&self) -> &[i8] {
        &self.answers
    }

    /// The answer currently selected for the displayed question, if any.
    #[must_use]
    pub fn current_answer(&self) -> Option<usize> {
        let value = self.answers[self.current_index];
        (value >= 0).then_some(value as usize)
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    /// Countdown formatted as zero-padded `MM:SS`.
    #[must_use]
    pub fn remaining_display(&self) -> String {
        format_mm_ss(self.remaining_seconds)
    }

    /// Completion fraction for a progress bar, counting the shown question.
    #[must_use]
    pub fn progress(&self) -> f32 {
        (self.current_index + 1) as f32 / self.quiz.total_questions() as f32
    }

    #[must_use]
    pub fn is_first_question(&self) -> bool {
        self.current_index == 0
    }

    /// Manual submission is only offered here.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.quiz.total_questions()
    }

    /// The graded attempt awaiting persistence, once submission has begun.
    #[must_use]
    pub fn pending_attempt(&self) -> Option<&QuizAttempt> {
        self.pending.as_ref()
    }

    /// Identifier of the stored attempt, once submitted.
    #[must_use]
    pub fn attempt_id(&self) -> Option<&AttemptId> {
        self.attempt_id.as_ref()
    }

    /// Select (or change) the answer for the current question. Never
    /// advances the index.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Frozen` after submission has begun and
    /// `EngineError::OptionOutOfRange` for an index outside `0..4`.
    pub fn select_answer(&mut self, option: usize) -> Result<(), EngineError> {
        if self.state != SubmissionState::InProgress {
            return Err(EngineError::Frozen);
        }
        if option >= OPTIONS_PER_QUESTION {
            return Err(EngineError::OptionOutOfRange { got: option });
        }

        self.answers[self.current_index] = option as i8;
        Ok(())
    }

    /// Move to the next question; returns false on the last question.
    /// Navigation never alters answers.
    pub fn next(&mut self) -> bool {
        if self.state == SubmissionState::InProgress && !self.is_last_question() {
            self.current_index += 1;
            true
        } else {
            false
        }
    }

    /// Move to the previous question; returns false on the first question.
    pub fn previous(&mut self) -> bool {
        if self.state == SubmissionState::InProgress && self.current_index > 0 {
            self.current_index -= 1;
            true
        } else {
            false
        }
    }

    /// Advance the countdown by one second.
    ///
    /// Returns `Tick::Expired` exactly once, at the transition to zero; the
    /// caller reacts by auto-submitting. Ticks that arrive after submission
    /// began, or after expiry was already reported, are `Tick::Idle`.
    pub fn tick(&mut self) -> Tick {
        if self.state != SubmissionState::InProgress || self.remaining_seconds == 0 {
            return Tick::Idle;
        }

        self.remaining_seconds -= 1;
        if self.remaining_seconds == 0 {
            Tick::Expired
        } else {
            Tick::Running {
                remaining_seconds: self.remaining_seconds,
            }
        }
    }

    /// Freeze answers and grade them, entering `Submitting`.
    ///
    /// Shared by the manual and auto-submit paths. Repeated invocation is
    /// rejected, which is what makes the timer-vs-confirm race harmless.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Frozen` unless the attempt is `InProgress`.
    pub fn begin_submission(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state != SubmissionState::InProgress {
            return Err(EngineError::Frozen);
        }

        let elapsed = self
            .quiz
            .time_limit_seconds()
            .saturating_sub(self.remaining_seconds);
        let attempt = QuizAttempt::grade(
            &self.quiz,
            self.student_name.clone(),
            self.answers.clone(),
            elapsed,
            now,
        )?;

        self.pending = Some(attempt);
        self.state = SubmissionState::Submitting;
        Ok(())
    }

    /// Record the store-assigned identifier and finish the attempt.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotSubmitting` unless a submission is pending.
    pub fn mark_submitted(&mut self, id: AttemptId) -> Result<(), EngineError> {
        if self.state != SubmissionState::Submitting {
            return Err(EngineError::NotSubmitting);
        }
        self.attempt_id = Some(id);
        self.state = SubmissionState::Submitted;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
