use std::sync::{Mutex, PoisonError};

use academy_core::model::SessionToken;

/// Local token holder for one browser context.
///
/// Never shared across devices or tabs through the network; the remote
/// session record is the only cross-context coordination channel.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<SessionToken>;
    fn set(&self, token: SessionToken);
    fn clear(&self);
}

/// Process-local token store.
#[derive(Default)]
pub struct InMemoryTokenStore {
    token: Mutex<Option<SessionToken>>,
}

impl InMemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self) -> Option<SessionToken> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: SessionToken) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token);
    }

    fn clear(&self) {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_clear_round_trip() {
        let store = InMemoryTokenStore::new();
        assert_eq!(store.get(), None);

        let token = SessionToken::generate();
        store.set(token.clone());
        assert_eq!(store.get(), Some(token));

        store.clear();
        assert_eq!(store.get(), None);
    }
}
