use std::sync::Arc;
use std::time::Duration;

use academy_core::model::AttemptId;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use super::engine::{QuizEngine, SubmissionState, Tick};
use super::workflow::QuizLoopService;

/// One-second countdown loop for a running quiz attempt.
///
/// Decrements the shared engine every second, auto-submits when the
/// counter reaches zero, and keeps retrying a failed submission on the
/// same cadence. The task is aborted on drop so an abandoned attempt
/// cannot submit itself later.
pub struct QuizTimer {
    handle: JoinHandle<()>,
    remaining: watch::Receiver<u32>,
    completed: watch::Receiver<Option<AttemptId>>,
}

impl QuizTimer {
    #[must_use]
    pub fn spawn(engine: Arc<Mutex<QuizEngine>>, service: QuizLoopService) -> Self {
        let (remaining_tx, remaining) = watch::channel(0);
        let (completed_tx, completed) = watch::channel(None);
        let handle = tokio::spawn(run(engine, service, remaining_tx, completed_tx));
        Self {
            handle,
            remaining,
            completed,
        }
    }

    /// Remaining seconds, updated once per tick.
    #[must_use]
    pub fn remaining(&self) -> watch::Receiver<u32> {
        self.remaining.clone()
    }

    /// Set to the stored attempt identifier once the attempt is submitted,
    /// whether by the timer or by the student.
    #[must_use]
    pub fn completed(&self) -> watch::Receiver<Option<AttemptId>> {
        self.completed.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for QuizTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run(
    engine: Arc<Mutex<QuizEngine>>,
    service: QuizLoopService,
    remaining_tx: watch::Sender<u32>,
    completed_tx: watch::Sender<Option<AttemptId>>,
) {
    {
        let engine = engine.lock().await;
        let _ = remaining_tx.send(engine.remaining_seconds());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The interval fires immediately; the first decrement comes a second in.
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let mut engine = engine.lock().await;
        match engine.state() {
            SubmissionState::InProgress => match engine.tick() {
                Tick::Running { remaining_seconds } => {
                    let _ = remaining_tx.send(remaining_seconds);
                }
                Tick::Expired => {
                    let _ = remaining_tx.send(0);
                    match service.submit(&mut engine, true).await {
                        Ok(id) => {
                            let _ = completed_tx.send(Some(id));
                            return;
                        }
                        Err(error) => {
                            warn!(%error, "auto-submit failed; retrying");
                        }
                    }
                }
                Tick::Idle => {}
            },
            // A failed insert left a graded attempt pending; keep retrying
            // on the tick cadence.
            SubmissionState::Submitting => match service.submit(&mut engine, true).await {
                Ok(id) => {
                    let _ = completed_tx.send(Some(id));
                    return;
                }
                Err(error) => {
                    warn!(%error, "quiz submission retry failed");
                }
            },
            // The student submitted from the confirm path.
            SubmissionState::Submitted => {
                let _ = completed_tx.send(engine.attempt_id().cloned());
                return;
            }
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use academy_core::model::{AttemptId, Question, QuizAttempt, QuizDefinition, QuizId};
    use academy_core::time::fixed_clock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use storage::repository::{AttemptRepository, InMemoryRepository, QuizRepository, StorageError};

    fn sample_quiz(time_limit_minutes: u32) -> QuizDefinition {
        let options = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        QuizDefinition::new(
            QuizId::new("q1"),
            "class-10",
            "maths",
            "Algebra",
            "",
            vec![
                Question::new("Q1", options.clone(), 1).unwrap(),
                Question::new("Q2", options, 3).unwrap(),
            ],
            time_limit_minutes,
        )
        .unwrap()
    }

    async fn running_attempt(
        repo: &InMemoryRepository,
    ) -> (Arc<Mutex<QuizEngine>>, QuizLoopService) {
        repo.upsert_quiz(&sample_quiz(1)).await.unwrap();
        let service = QuizLoopService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        );
        let engine = service.start_quiz(&QuizId::new("q1"), "Asha").await.unwrap();
        (Arc::new(Mutex::new(engine)), service)
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_and_auto_submits_at_zero() {
        let repo = InMemoryRepository::new();
        let (engine, service) = running_attempt(&repo).await;
        engine.lock().await.select_answer(1).unwrap();

        let timer = QuizTimer::spawn(Arc::clone(&engine), service.clone());
        let mut completed = timer.completed();

        completed.wait_for(Option::is_some).await.unwrap();
        let id = completed.borrow().clone().unwrap();

        assert_eq!(*timer.remaining().borrow(), 0);
        let stored = service.load_result(&id).await.unwrap();
        assert_eq!(stored.score(), 1);
        assert_eq!(stored.time_taken_secs(), 60);
        assert_eq!(engine.lock().await.state(), SubmissionState::Submitted);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_manual_submission() {
        let repo = InMemoryRepository::new();
        let (engine, service) = running_attempt(&repo).await;

        let timer = QuizTimer::spawn(Arc::clone(&engine), service.clone());
        let mut completed = timer.completed();

        tokio::time::sleep(Duration::from_secs(10)).await;
        let id = {
            let mut engine = engine.lock().await;
            service.submit(&mut engine, false).await.unwrap()
        };

        completed.wait_for(Option::is_some).await.unwrap();
        assert_eq!(completed.borrow().clone(), Some(id));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(timer.is_finished());
    }

    /// Attempt store that fails the first `failures` inserts.
    struct FlakyAttempts {
        inner: InMemoryRepository,
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl AttemptRepository for FlakyAttempts {
        async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<AttemptId, StorageError> {
            let left = self.remaining_failures.load(Ordering::SeqCst);
            if left > 0 {
                self.remaining_failures.store(left - 1, Ordering::SeqCst);
                return Err(StorageError::Unavailable("insert timed out".into()));
            }
            self.inner.insert_attempt(attempt).await
        }

        async fn get_attempt(&self, id: &AttemptId) -> Result<QuizAttempt, StorageError> {
            self.inner.get_attempt(id).await
        }

        async fn list_attempts_for_quiz(
            &self,
            quiz_id: &QuizId,
        ) -> Result<Vec<(AttemptId, QuizAttempt)>, StorageError> {
            self.inner.list_attempts_for_quiz(quiz_id).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_submission_until_store_recovers() {
        let repo = InMemoryRepository::new();
        repo.upsert_quiz(&sample_quiz(1)).await.unwrap();
        let service = QuizLoopService::new(
            fixed_clock(),
            Arc::new(repo.clone()),
            Arc::new(FlakyAttempts {
                inner: repo.clone(),
                remaining_failures: AtomicU32::new(2),
            }),
        );
        let engine = service.start_quiz(&QuizId::new("q1"), "Asha").await.unwrap();
        let engine = Arc::new(Mutex::new(engine));
        engine.lock().await.select_answer(1).unwrap();

        let timer = QuizTimer::spawn(Arc::clone(&engine), service.clone());
        let mut completed = timer.completed();

        completed.wait_for(Option::is_some).await.unwrap();
        let id = completed.borrow().clone().unwrap();
        assert_eq!(service.load_result(&id).await.unwrap().score(), 1);
    }
}
