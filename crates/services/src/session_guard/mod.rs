mod guard;
mod token_store;
mod watcher;

// Public API of the session-guard subsystem.
pub use guard::{GuardPhase, SESSION_EXPIRED_NOTICE, SessionGuard};
pub use token_store::{InMemoryTokenStore, TokenStore};
pub use watcher::{DEFAULT_POLL_INTERVAL, SessionWatcher};
