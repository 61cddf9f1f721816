use std::sync::Arc;

use academy_core::Clock;
use academy_core::model::{Identity, SessionRecord, SessionToken};
use storage::repository::{SessionChange, SessionRepository};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::GuardError;
use crate::identity::IdentityProvider;

use super::token_store::TokenStore;

/// Explanation shown with the blocking notice when a session is superseded.
pub const SESSION_EXPIRED_NOTICE: &str = "Your session has been terminated because this account \
     was logged into from another device. Please log in again to continue.";

/// Lifecycle phase of one browser context's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    /// Authenticated, local token not yet checked against the remote record.
    Validating,
    /// Fresh login claimed locally but the remote record write has not
    /// succeeded yet; retryable.
    Establishing,
    /// This context holds the authoritative token.
    Active,
    /// A newer login superseded this context; awaiting acknowledgment.
    Expired,
    /// Signed out.
    Unauthenticated,
}

/// Enforces at most one live session per identity.
///
/// The decision to invalidate is always made by comparing the local token to
/// the remote record, never by trusting which client asked first. If two
/// contexts log in within the same detection window, the later write wins and
/// the other context self-detects on its next check.
pub struct SessionGuard {
    identity: Identity,
    sessions: Arc<dyn SessionRepository>,
    tokens: Arc<dyn TokenStore>,
    clock: Clock,
    phase: GuardPhase,
}

impl SessionGuard {
    /// Attach a guard to a freshly authenticated identity.
    #[must_use]
    pub fn attach(
        identity: Identity,
        sessions: Arc<dyn SessionRepository>,
        tokens: Arc<dyn TokenStore>,
        clock: Clock,
    ) -> Self {
        Self {
            identity,
            sessions,
            tokens,
            clock,
            phase: GuardPhase::Validating,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    #[must_use]
    pub fn phase(&self) -> GuardPhase {
        self.phase
    }

    /// Push subscription for this guard's backend, when supported.
    #[must_use]
    pub fn watch_changes(&self) -> Option<broadcast::Receiver<SessionChange>> {
        self.sessions.watch_sessions()
    }

    /// Run the validation step after authentication.
    ///
    /// No local token means a fresh login: claim the session. A present
    /// token is compared against the remote record. Also resumes an
    /// establishment whose record write previously failed.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::Storage` on transient store failures; the phase
    /// is left unchanged so the caller can retry. A token mismatch is not an
    /// error and lands in `GuardPhase::Expired`.
    pub async fn validate(&mut self) -> Result<GuardPhase, GuardError> {
        match self.phase {
            GuardPhase::Validating => match self.tokens.get() {
                None => self.establish().await,
                Some(local) => self.compare(&local).await,
            },
            GuardPhase::Establishing => self.establish().await,
            GuardPhase::Active => self.revalidate().await,
            GuardPhase::Expired | GuardPhase::Unauthenticated => Ok(self.phase),
        }
    }

    /// Re-run the remote-vs-local comparison; a no-op outside `Active`.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::Storage` on transient store failures without
    /// terminating the session; only an explicit mismatch expires it.
    pub async fn revalidate(&mut self) -> Result<GuardPhase, GuardError> {
        if self.phase != GuardPhase::Active {
            return Ok(self.phase);
        }
        let Some(local) = self.tokens.get() else {
            // Local token vanished underneath us; nothing left to defend.
            self.phase = GuardPhase::Expired;
            return Ok(self.phase);
        };
        self.compare(&local).await
    }

    /// Acknowledge the expiry notice: clear local state and return to login.
    ///
    /// The local token is cleared unconditionally; a failed provider
    /// sign-out is logged, never allowed to wedge the context.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::InvalidPhase` unless the guard is `Expired`.
    pub async fn acknowledge_expired(
        &mut self,
        provider: &dyn IdentityProvider,
    ) -> Result<(), GuardError> {
        if self.phase != GuardPhase::Expired {
            return Err(GuardError::InvalidPhase { phase: self.phase });
        }

        self.tokens.clear();
        if let Err(error) = provider.sign_out().await {
            warn!(%error, "provider sign-out failed during expiry acknowledgment");
        }
        self.phase = GuardPhase::Unauthenticated;
        Ok(())
    }

    /// Explicit logout: release the remote session and clear local state.
    ///
    /// Local cleanup happens regardless of the remote delete or provider
    /// sign-out outcome; a failed delete is surfaced afterwards.
    ///
    /// # Errors
    ///
    /// Returns `GuardError::Storage` if the remote record could not be
    /// deleted. The guard is `Unauthenticated` either way.
    pub async fn logout(&mut self, provider: &dyn IdentityProvider) -> Result<(), GuardError> {
        let deleted = self.sessions.delete_session(&self.identity).await;

        self.tokens.clear();
        if let Err(error) = provider.sign_out().await {
            warn!(%error, "provider sign-out failed during logout");
        }
        self.phase = GuardPhase::Unauthenticated;

        deleted.map_err(GuardError::from)
    }

    /// Claim the session for this context: new token locally, then remotely.
    async fn establish(&mut self) -> Result<GuardPhase, GuardError> {
        self.phase = GuardPhase::Establishing;

        // Reuse the locally claimed token when resuming a failed write.
        let token = self.tokens.get().unwrap_or_else(SessionToken::generate);
        self.tokens.set(token.clone());

        let record = SessionRecord::new(token, self.clock.now());
        self.sessions
            .upsert_session(&self.identity, &record)
            .await?;

        debug!(identity = %self.identity, "session established");
        self.phase = GuardPhase::Active;
        Ok(self.phase)
    }

    async fn compare(&mut self, local: &SessionToken) -> Result<GuardPhase, GuardError> {
        // A transient store error propagates without changing phase: never
        // manufacture a conflict out of an outage.
        let record = self.sessions.get_session(&self.identity).await?;

        self.phase = match record {
            Some(record) if record.matches(local) => GuardPhase::Active,
            _ => {
                debug!(identity = %self.identity, "session superseded by a newer login");
                GuardPhase::Expired
            }
        };
        Ok(self.phase)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthError;
    use crate::identity::StaticIdentityProvider;
    use crate::session_guard::token_store::InMemoryTokenStore;
    use academy_core::time::fixed_clock;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::repository::{InMemoryRepository, StorageError};
    use tokio::sync::watch;

    /// Provider whose every call fails, as during a network outage.
    struct OfflineProvider;

    #[async_trait]
    impl IdentityProvider for OfflineProvider {
        async fn sign_in(&self, _: &str, _: &str) -> Result<Identity, AuthError> {
            Err(AuthError::Unavailable("offline".into()))
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("offline".into()))
        }

        async fn send_password_reset(&self, _: &str) -> Result<(), AuthError> {
            Err(AuthError::Unavailable("offline".into()))
        }

        fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
            watch::channel(None).1
        }
    }

    /// Session store that can be switched into a failing mode.
    struct FlakyStore {
        inner: InMemoryRepository,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: InMemoryRepository::new(),
                failing: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StorageError::Unavailable("simulated outage".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionRepository for FlakyStore {
        async fn get_session(
            &self,
            identity: &Identity,
        ) -> Result<Option<SessionRecord>, StorageError> {
            self.check()?;
            self.inner.get_session(identity).await
        }

        async fn upsert_session(
            &self,
            identity: &Identity,
            record: &SessionRecord,
        ) -> Result<(), StorageError> {
            self.check()?;
            self.inner.upsert_session(identity, record).await
        }

        async fn delete_session(&self, identity: &Identity) -> Result<(), StorageError> {
            self.check()?;
            self.inner.delete_session(identity).await
        }
    }

    fn guard_for(
        sessions: Arc<dyn SessionRepository>,
        tokens: Arc<dyn TokenStore>,
    ) -> SessionGuard {
        SessionGuard::attach(
            Identity::new("student-1"),
            sessions,
            tokens,
            fixed_clock(),
        )
    }

    #[tokio::test]
    async fn fresh_login_establishes_and_activates() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let mut guard = guard_for(repo.clone(), tokens.clone());

        assert_eq!(guard.validate().await.unwrap(), GuardPhase::Active);

        // Local token and remote record agree.
        let local = tokens.get().unwrap();
        let record = repo
            .get_session(&Identity::new("student-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.matches(&local));
    }

    #[tokio::test]
    async fn matching_token_is_sufficient_for_active() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());

        let mut guard = guard_for(repo.clone(), tokens.clone());
        guard.validate().await.unwrap();

        // A second validation pass on the same context stays Active.
        let mut again = guard_for(repo.clone(), tokens.clone());
        assert_eq!(again.validate().await.unwrap(), GuardPhase::Active);
    }

    #[tokio::test]
    async fn superseded_token_expires_on_revalidation() {
        let repo = Arc::new(InMemoryRepository::new());
        let first_tokens = Arc::new(InMemoryTokenStore::new());
        let mut first = guard_for(repo.clone(), first_tokens.clone());
        first.validate().await.unwrap();

        // A second context logs in and overwrites the remote record.
        let second_tokens = Arc::new(InMemoryTokenStore::new());
        let mut second = guard_for(repo.clone(), second_tokens);
        assert_eq!(second.validate().await.unwrap(), GuardPhase::Active);

        assert_eq!(first.revalidate().await.unwrap(), GuardPhase::Expired);
        assert_eq!(second.revalidate().await.unwrap(), GuardPhase::Active);
    }

    #[tokio::test]
    async fn absent_remote_record_expires_a_held_token() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        tokens.set(SessionToken::generate());

        let mut guard = guard_for(repo, tokens);
        assert_eq!(guard.validate().await.unwrap(), GuardPhase::Expired);
    }

    #[tokio::test]
    async fn transient_outage_never_expires_the_session() {
        let store = Arc::new(FlakyStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let mut guard = guard_for(store.clone(), tokens);
        guard.validate().await.unwrap();

        store.set_failing(true);
        assert!(guard.revalidate().await.is_err());
        assert_eq!(guard.phase(), GuardPhase::Active);

        store.set_failing(false);
        assert_eq!(guard.revalidate().await.unwrap(), GuardPhase::Active);
    }

    #[tokio::test]
    async fn failed_establishment_resumes_with_same_token() {
        let store = Arc::new(FlakyStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let mut guard = guard_for(store.clone(), tokens.clone());

        store.set_failing(true);
        assert!(guard.validate().await.is_err());
        assert_eq!(guard.phase(), GuardPhase::Establishing);
        let claimed = tokens.get().unwrap();

        store.set_failing(false);
        assert_eq!(guard.validate().await.unwrap(), GuardPhase::Active);
        assert_eq!(tokens.get().unwrap(), claimed);
    }

    #[tokio::test]
    async fn acknowledge_expired_clears_local_state() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        tokens.set(SessionToken::generate());

        let mut guard = guard_for(repo, tokens.clone());
        guard.validate().await.unwrap();
        assert_eq!(guard.phase(), GuardPhase::Expired);

        let provider = StaticIdentityProvider::new();
        guard.acknowledge_expired(&provider).await.unwrap();
        assert_eq!(guard.phase(), GuardPhase::Unauthenticated);
        assert_eq!(tokens.get(), None);
    }

    #[tokio::test]
    async fn acknowledge_clears_token_even_when_sign_out_fails() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        tokens.set(SessionToken::generate());

        let mut guard = guard_for(repo, tokens.clone());
        guard.validate().await.unwrap();
        assert_eq!(guard.phase(), GuardPhase::Expired);

        guard.acknowledge_expired(&OfflineProvider).await.unwrap();
        assert_eq!(guard.phase(), GuardPhase::Unauthenticated);
        assert_eq!(tokens.get(), None);
    }

    #[tokio::test]
    async fn acknowledge_requires_expired_phase() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let mut guard = guard_for(repo, tokens);
        guard.validate().await.unwrap();

        let provider = StaticIdentityProvider::new();
        let err = guard.acknowledge_expired(&provider).await.unwrap_err();
        assert!(matches!(
            err,
            GuardError::InvalidPhase {
                phase: GuardPhase::Active
            }
        ));
    }

    #[tokio::test]
    async fn logout_deletes_remote_record_and_clears_token() {
        let repo = Arc::new(InMemoryRepository::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let mut guard = guard_for(repo.clone(), tokens.clone());
        guard.validate().await.unwrap();

        let provider = StaticIdentityProvider::new();
        guard.logout(&provider).await.unwrap();

        assert_eq!(guard.phase(), GuardPhase::Unauthenticated);
        assert_eq!(tokens.get(), None);
        assert_eq!(
            repo.get_session(&Identity::new("student-1")).await.unwrap(),
            None
        );

        // The next login reaches Active directly, never passing Expired.
        let fresh_tokens = Arc::new(InMemoryTokenStore::new());
        let mut next = guard_for(repo, fresh_tokens);
        assert_eq!(next.validate().await.unwrap(), GuardPhase::Active);
    }

    #[tokio::test]
    async fn logout_clears_local_token_even_when_delete_fails() {
        let store = Arc::new(FlakyStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let mut guard = guard_for(store.clone(), tokens.clone());
        guard.validate().await.unwrap();

        store.set_failing(true);
        let provider = StaticIdentityProvider::new();
        assert!(guard.logout(&provider).await.is_err());
        assert_eq!(guard.phase(), GuardPhase::Unauthenticated);
        assert_eq!(tokens.get(), None);
    }

    #[tokio::test]
    async fn sequential_logins_leave_only_the_last_active() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut guards = Vec::new();

        for _ in 0..4 {
            let tokens = Arc::new(InMemoryTokenStore::new());
            let mut guard = guard_for(repo.clone(), tokens);
            guard.validate().await.unwrap();
            guards.push(guard);
        }

        // One detection cycle across every context.
        for guard in &mut guards {
            guard.revalidate().await.unwrap();
        }

        let active: Vec<_> = guards
            .iter()
            .filter(|g| g.phase() == GuardPhase::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(guards.last().unwrap().phase(), GuardPhase::Active);
        for guard in &guards[..3] {
            assert_eq!(guard.phase(), GuardPhase::Expired);
        }
    }
}
