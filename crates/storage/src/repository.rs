use academy_core::model::{
    AttemptId, Identity, QuizAttempt, QuizDefinition, QuizId, SessionRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Push notification delivered on any write to the sessions collection.
///
/// Carries the full current value; `record` is `None` after a delete.
#[derive(Debug, Clone)]
pub struct SessionChange {
    pub identity: Identity,
    pub record: Option<SessionRecord>,
}

/// Repository contract for the shared session records.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fetch the session record for an identity, if one exists.
    ///
    /// Absence is a normal state (nobody logged in, or logged out), not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unavailable` on transient backend failures.
    async fn get_session(&self, identity: &Identity)
    -> Result<Option<SessionRecord>, StorageError>;

    /// Create or overwrite the session record for an identity.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_session(
        &self,
        identity: &Identity,
        record: &SessionRecord,
    ) -> Result<(), StorageError>;

    /// Delete the session record for an identity. Deleting a missing record
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete cannot be performed.
    async fn delete_session(&self, identity: &Identity) -> Result<(), StorageError>;

    /// Subscribe to session writes, when the backend supports push.
    ///
    /// Returns `None` for poll-only backends; callers fall back to periodic
    /// revalidation.
    fn watch_sessions(&self) -> Option<broadcast::Receiver<SessionChange>> {
        None
    }
}

/// Repository contract for quiz definitions (read-mostly).
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or replace a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(&self, quiz: &QuizDefinition) -> Result<(), StorageError>;

    /// Fetch a quiz definition by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_quiz(&self, id: &QuizId) -> Result<QuizDefinition, StorageError>;

    /// List all quiz definitions.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_quizzes(&self) -> Result<Vec<QuizDefinition>, StorageError>;
}

/// Repository contract for immutable quiz attempts.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Append an attempt and return its store-assigned identifier.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<AttemptId, StorageError>;

    /// Fetch a stored attempt by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: &AttemptId) -> Result<QuizAttempt, StorageError>;

    /// List attempts for a quiz, most recent first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts_for_quiz(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Vec<(AttemptId, QuizAttempt)>, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

const SESSION_EVENT_CAPACITY: usize = 32;

/// In-memory repository with push notification for session writes.
///
/// Backs tests and the demo app; mirrors the hosted document store's
/// snapshot-on-write behavior.
#[derive(Clone)]
pub struct InMemoryRepository {
    sessions: Arc<Mutex<HashMap<Identity, SessionRecord>>>,
    quizzes: Arc<Mutex<HashMap<QuizId, QuizDefinition>>>,
    attempts: Arc<Mutex<Vec<(AttemptId, QuizAttempt)>>>,
    session_events: broadcast::Sender<SessionChange>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        let (session_events, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            quizzes: Arc::new(Mutex::new(HashMap::new())),
            attempts: Arc::new(Mutex::new(Vec::new())),
            session_events,
        }
    }

    fn publish(&self, change: SessionChange) {
        // No receivers is fine; nobody is watching yet.
        let _ = self.session_events.send(change);
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn get_session(
        &self,
        identity: &Identity,
    ) -> Result<Option<SessionRecord>, StorageError> {
        let guard = self.sessions.lock().map_err(lock_err)?;
        Ok(guard.get(identity).cloned())
    }

    async fn upsert_session(
        &self,
        identity: &Identity,
        record: &SessionRecord,
    ) -> Result<(), StorageError> {
        {
            let mut guard = self.sessions.lock().map_err(lock_err)?;
            guard.insert(identity.clone(), record.clone());
        }
        self.publish(SessionChange {
            identity: identity.clone(),
            record: Some(record.clone()),
        });
        Ok(())
    }

    async fn delete_session(&self, identity: &Identity) -> Result<(), StorageError> {
        let removed = {
            let mut guard = self.sessions.lock().map_err(lock_err)?;
            guard.remove(identity).is_some()
        };
        if removed {
            self.publish(SessionChange {
                identity: identity.clone(),
                record: None,
            });
        }
        Ok(())
    }

    fn watch_sessions(&self) -> Option<broadcast::Receiver<SessionChange>> {
        Some(self.session_events.subscribe())
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &QuizDefinition) -> Result<(), StorageError> {
        let mut guard = self.quizzes.lock().map_err(lock_err)?;
        guard.insert(quiz.id().clone(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: &QuizId) -> Result<QuizDefinition, StorageError> {
        let guard = self.quizzes.lock().map_err(lock_err)?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }

    async fn list_quizzes(&self) -> Result<Vec<QuizDefinition>, StorageError> {
        let guard = self.quizzes.lock().map_err(lock_err)?;
        Ok(guard.values().cloned().collect())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn insert_attempt(&self, attempt: &QuizAttempt) -> Result<AttemptId, StorageError> {
        let id = AttemptId::generate();
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        guard.push((id.clone(), attempt.clone()));
        Ok(id)
    }

    async fn get_attempt(&self, id: &AttemptId) -> Result<QuizAttempt, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        guard
            .iter()
            .find(|(stored, _)| stored == id)
            .map(|(_, attempt)| attempt.clone())
            .ok_or(StorageError::NotFound)
    }

    async fn list_attempts_for_quiz(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Vec<(AttemptId, QuizAttempt)>, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        let mut out: Vec<_> = guard
            .iter()
            .filter(|(_, attempt)| attempt.quiz_id() == quiz_id)
            .cloned()
            .collect();
        out.sort_by(|(_, a), (_, b)| b.timestamp().cmp(&a.timestamp()));
        Ok(out)
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates the three repositories behind trait objects for backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let sessions: Arc<dyn SessionRepository> = Arc::new(repo.clone());
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo);
        Self {
            sessions,
            quizzes,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_core::model::{Question, SessionToken};
    use academy_core::time::fixed_now;

    fn build_quiz(id: &str) -> QuizDefinition {
        let options = vec!["a".into(), "b".into(), "c".into(), "d".into()];
        QuizDefinition::new(
            QuizId::new(id),
            "class-10",
            "maths",
            "Algebra",
            "Chapter test",
            vec![
                Question::new("Q1", options.clone(), 1).unwrap(),
                Question::new("Q2", options, 3).unwrap(),
            ],
            1,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn session_round_trip_and_delete() {
        let repo = InMemoryRepository::new();
        let identity = Identity::new("student-1");
        let record = SessionRecord::new(SessionToken::generate(), fixed_now());

        repo.upsert_session(&identity, &record).await.unwrap();
        assert_eq!(repo.get_session(&identity).await.unwrap(), Some(record));

        repo.delete_session(&identity).await.unwrap();
        assert_eq!(repo.get_session(&identity).await.unwrap(), None);
    }

    #[tokio::test]
    async fn session_writes_are_pushed_to_watchers() {
        let repo = InMemoryRepository::new();
        let mut watcher = repo.watch_sessions().expect("in-memory backend pushes");

        let identity = Identity::new("student-1");
        let record = SessionRecord::new(SessionToken::generate(), fixed_now());
        repo.upsert_session(&identity, &record).await.unwrap();

        let change = watcher.recv().await.unwrap();
        assert_eq!(change.identity, identity);
        assert_eq!(change.record, Some(record));

        repo.delete_session(&identity).await.unwrap();
        let change = watcher.recv().await.unwrap();
        assert_eq!(change.record, None);
    }

    #[tokio::test]
    async fn deleting_missing_session_is_silent() {
        let repo = InMemoryRepository::new();
        let mut watcher = repo.watch_sessions().unwrap();

        repo.delete_session(&Identity::new("ghost")).await.unwrap();
        assert!(matches!(
            watcher.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn attempts_are_listed_most_recent_first() {
        let repo = InMemoryRepository::new();
        let quiz = build_quiz("q1");
        repo.upsert_quiz(&quiz).await.unwrap();

        let older =
            QuizAttempt::grade(&quiz, "Asha", vec![1, 3], 30, fixed_now()).unwrap();
        let newer = QuizAttempt::grade(
            &quiz,
            "Ravi",
            vec![-1, -1],
            60,
            fixed_now() + chrono::Duration::minutes(5),
        )
        .unwrap();

        repo.insert_attempt(&older).await.unwrap();
        let newer_id = repo.insert_attempt(&newer).await.unwrap();

        let listed = repo.list_attempts_for_quiz(quiz.id()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, newer_id);
        assert_eq!(listed[0].1.student_name(), "Ravi");
    }

    #[tokio::test]
    async fn missing_quiz_is_not_found() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            repo.get_quiz(&QuizId::new("nope")).await,
            Err(StorageError::NotFound)
        ));
    }
}
