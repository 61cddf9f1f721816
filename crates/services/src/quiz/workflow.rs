use std::sync::Arc;

use academy_core::model::{AttemptId, QuizAttempt, QuizDefinition, QuizId};
use academy_core::time::Clock;
use storage::repository::{AttemptRepository, QuizRepository};
use tracing::{info, warn};

use super::engine::{QuizEngine, SubmissionState};
use crate::error::{EngineError, QuizServiceError};

/// Bridges quiz attempts to the attempt store.
///
/// The engine stays a pure state machine; everything async (loading
/// definitions, persisting graded attempts) goes through here.
#[derive(Clone)]
pub struct QuizLoopService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl QuizLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            attempts,
        }
    }

    /// Load a quiz definition and start a fresh attempt on it.
    ///
    /// # Errors
    ///
    /// Fails if the quiz does not exist or its definition cannot start an
    /// attempt.
    pub async fn start_quiz(
        &self,
        quiz_id: &QuizId,
        student_name: impl Into<String>,
    ) -> Result<QuizEngine, QuizServiceError> {
        let quiz = self.quizzes.get_quiz(quiz_id).await?;
        let engine = QuizEngine::new(quiz, student_name)?;
        Ok(engine)
    }

    /// Grade and persist the attempt, exactly once.
    ///
    /// Safe to call from both the confirm path and the timer-expiry path,
    /// and safe to call again after a persistence failure: a submitted
    /// engine just returns its stored identifier, and a `Submitting` engine
    /// retries the insert with the attempt it already graded.
    ///
    /// # Errors
    ///
    /// Returns a storage error when the insert fails; the engine stays in
    /// `Submitting` so a later call can retry.
    pub async fn submit(
        &self,
        engine: &mut QuizEngine,
        auto: bool,
    ) -> Result<AttemptId, QuizServiceError> {
        if let Some(id) = engine.attempt_id() {
            return Ok(id.clone());
        }

        if engine.state() == SubmissionState::InProgress {
            engine.begin_submission(self.clock.now())?;
        }
        let Some(pending) = engine.pending_attempt().cloned() else {
            return Err(EngineError::NotSubmitting.into());
        };

        match self.attempts.insert_attempt(&pending).await {
            Ok(id) => {
                info!(
                    quiz_id = %pending.quiz_id(),
                    score = pending.score(),
                    auto,
                    "quiz attempt stored"
                );
                engine.mark_submitted(id.clone())?;
                Ok(id)
            }
            Err(error) => {
                warn!(quiz_id = %pending.quiz_id(), %error, "storing quiz attempt failed");
                Err(error.into())
            }
        }
    }

    /// Load a stored attempt for the result view.
    ///
    /// # Errors
    ///
    /// Fails if the attempt does not exist or the store is unavailable.
    pub async fn load_result(&self, id: &AttemptId) -> Result<QuizAttempt, QuizServiceError> {
        Ok(self.attempts.get_attempt(id).await?)
    }

    /// Attempts recorded against one quiz, most recent first.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub async fn attempt_history(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Vec<(AttemptId, QuizAttempt)>, QuizServiceError> {
        Ok(self.attempts.list_attempts_for_quiz(quiz_id).await?)
    }

    /// Quizzes available to pick from.
    ///
    /// # Errors
    ///
    /// Fails if the store is unavailable.
    pub async fn available_quizzes(&self) -> Result<Vec<QuizDefinition>, QuizServiceError> {
        Ok(self.quizzes.list_quizzes().await?)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
