use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use academy_core::model::Identity;
use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::AuthError;

/// External authentication authority.
///
/// Decides who *can* authenticate; the session guard decides which of their
/// logins is currently authoritative.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange credentials for an identity.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` for a bad username/password
    /// pair and `AuthError::TooManyRequests` when the account is rate-limited.
    async fn sign_in(&self, username: &str, password: &str) -> Result<Identity, AuthError>;

    /// End the provider-side session. Best-effort for callers: local state
    /// must be cleared even if this fails.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Unavailable` on transient provider failures.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Request a password reset for the given identifier.
    ///
    /// # Errors
    ///
    /// Returns `AuthError` if the request cannot be accepted.
    async fn send_password_reset(&self, identifier: &str) -> Result<(), AuthError>;

    /// Watch the current identity; `None` means signed out.
    fn identity_changes(&self) -> watch::Receiver<Option<Identity>>;
}

/// Failed sign-ins tolerated before an account is rate-limited.
const MAX_FAILED_ATTEMPTS: u32 = 5;

struct Account {
    password: String,
    identity: Identity,
}

#[derive(Default)]
struct ProviderState {
    failures: HashMap<String, u32>,
    reset_requests: Vec<String>,
}

/// Credential-table identity provider for tests and the demo app.
///
/// Mirrors the hosted provider's observable behavior: invalid-credential
/// rejection, lockout after repeated failures, and lockout release via a
/// password-reset request.
pub struct StaticIdentityProvider {
    accounts: HashMap<String, Account>,
    state: Mutex<ProviderState>,
    current: watch::Sender<Option<Identity>>,
}

impl StaticIdentityProvider {
    #[must_use]
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: HashMap::new(),
            state: Mutex::new(ProviderState::default()),
            current,
        }
    }

    /// Registers a credential pair resolving to the given identity.
    #[must_use]
    pub fn with_account(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
        identity: Identity,
    ) -> Self {
        self.accounts.insert(
            username.into(),
            Account {
                password: password.into(),
                identity,
            },
        );
        self
    }

    /// Identifiers that have requested a password reset, in request order.
    #[must_use]
    pub fn reset_requests(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reset_requests
            .clone()
    }
}

impl Default for StaticIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn sign_in(&self, username: &str, password: &str) -> Result<Identity, AuthError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let failures = state.failures.get(username).copied().unwrap_or(0);
        if failures >= MAX_FAILED_ATTEMPTS {
            return Err(AuthError::TooManyRequests);
        }

        match self.accounts.get(username) {
            Some(account) if account.password == password => {
                state.failures.remove(username);
                let _ = self.current.send(Some(account.identity.clone()));
                Ok(account.identity.clone())
            }
            _ => {
                state.failures.insert(username.to_owned(), failures + 1);
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let _ = self.current.send(None);
        Ok(())
    }

    async fn send_password_reset(&self, identifier: &str) -> Result<(), AuthError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reset_requests.push(identifier.to_owned());
        // A completed reset restores a locked-out account.
        state.failures.remove(identifier);
        Ok(())
    }

    fn identity_changes(&self) -> watch::Receiver<Option<Identity>> {
        self.current.subscribe()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
