//! Shared error types for the services crate.

use thiserror::Error;

use academy_core::model::AttemptError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

use crate::session_guard::GuardPhase;

/// Errors surfaced by the identity provider.
///
/// A token mismatch is deliberately absent here: session conflicts are a
/// normal guard phase (`GuardPhase::Expired`), not an error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("too many failed login attempts; reset your password or try again later")]
    TooManyRequests,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Errors emitted by `SessionGuard` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GuardError {
    #[error("operation not valid in phase {phase:?}")]
    InvalidPhase { phase: GuardPhase },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by the quiz state machine itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EngineError {
    #[error("cannot run a quiz with no questions")]
    Empty,

    #[error("option index {got} is out of range")]
    OptionOutOfRange { got: usize },

    #[error("answers are frozen once submission has begun")]
    Frozen,

    #[error("no submission is pending")]
    NotSubmitting,

    #[error(transparent)]
    Attempt(#[from] AttemptError),
}

/// Errors emitted by `QuizLoopService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
