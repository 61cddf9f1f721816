use std::sync::Arc;
use std::time::Duration;

use academy_core::Clock;
use academy_core::model::Identity;
use storage::repository::Storage;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{AppServicesError, GuardError};
use crate::identity::IdentityProvider;
use crate::quiz::QuizLoopService;
use crate::session_guard::{
    DEFAULT_POLL_INTERVAL, GuardPhase, SessionGuard, SessionWatcher, TokenStore,
};

/// Wires storage, the identity provider, and the clock into the service
/// layer; one instance per running app.
#[derive(Clone)]
pub struct AppServices {
    storage: Storage,
    provider: Arc<dyn IdentityProvider>,
    clock: Clock,
    poll_interval: Duration,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: Storage, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            storage,
            provider,
            clock: Clock::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn new_in_memory(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::new(Storage::in_memory(), provider)
    }

    /// Connect to a SQLite database, running migrations.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or migrated.
    pub async fn new_sqlite(
        url: &str,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(url).await?;
        info!(url, "connected to sqlite storage");
        Ok(Self::new(storage, provider))
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    #[must_use]
    pub fn quiz_service(&self) -> QuizLoopService {
        QuizLoopService::new(
            self.clock,
            Arc::clone(&self.storage.quizzes),
            Arc::clone(&self.storage.attempts),
        )
    }

    /// Authenticate and claim the single active session for this context.
    ///
    /// A fresh login always takes over: any session held by another context
    /// is superseded and self-expires on its next check. The returned
    /// watcher keeps revalidating this context in the background.
    ///
    /// # Errors
    ///
    /// Returns the provider's rejection, or a storage error if the session
    /// record could not be written.
    pub async fn sign_in(
        &self,
        username: &str,
        password: &str,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<(Arc<Mutex<SessionGuard>>, SessionWatcher), GuardError> {
        let identity = self.provider.sign_in(username, password).await?;
        info!(identity = %identity, "authenticated; claiming session");

        // A fresh login claims a new token rather than validating an old one.
        tokens.clear();
        let mut guard = SessionGuard::attach(
            identity,
            Arc::clone(&self.storage.sessions),
            tokens,
            self.clock,
        );
        guard.validate().await?;

        let changes = guard.watch_changes();
        let guard = Arc::new(Mutex::new(guard));
        let watcher = SessionWatcher::spawn(Arc::clone(&guard), self.poll_interval, changes);
        Ok((guard, watcher))
    }

    /// Revalidate a context that still holds a token from an earlier run.
    ///
    /// Unlike `sign_in` this never claims the session; a token superseded
    /// while the context was away lands in `GuardPhase::Expired` and gets
    /// no watcher.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the remote record could not be read; the
    /// held token is kept so the caller can retry.
    pub async fn resume(
        &self,
        identity: Identity,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<(Arc<Mutex<SessionGuard>>, Option<SessionWatcher>), GuardError> {
        let mut guard = SessionGuard::attach(
            identity,
            Arc::clone(&self.storage.sessions),
            tokens,
            self.clock,
        );
        let phase = guard.validate().await?;

        let changes = guard.watch_changes();
        let guard = Arc::new(Mutex::new(guard));
        let watcher = (phase == GuardPhase::Active)
            .then(|| SessionWatcher::spawn(Arc::clone(&guard), self.poll_interval, changes));
        Ok((guard, watcher))
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
