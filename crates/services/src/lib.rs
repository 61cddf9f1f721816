#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod identity;
pub mod quiz;
pub mod session_guard;

pub use academy_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, AuthError, EngineError, GuardError, QuizServiceError};
pub use identity::{IdentityProvider, StaticIdentityProvider};
pub use quiz::{QuizEngine, QuizLoopService, QuizTimer, SubmissionState, Tick};
pub use session_guard::{
    DEFAULT_POLL_INTERVAL, GuardPhase, InMemoryTokenStore, SESSION_EXPIRED_NOTICE, SessionGuard,
    SessionWatcher, TokenStore,
};
