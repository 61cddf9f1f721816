use chrono::{DateTime, Utc};

use crate::model::ids::SessionToken;

/// Shared remote record tracking which login is authoritative for an identity.
///
/// At most one exists per identity. It is overwritten by each fresh login and
/// deleted on explicit logout; a context whose local token no longer matches
/// `active_session_id` has been superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    active_session_id: SessionToken,
    last_login: DateTime<Utc>,
}

impl SessionRecord {
    /// Builds the record written when a fresh login claims the session.
    #[must_use]
    pub fn new(active_session_id: SessionToken, last_login: DateTime<Utc>) -> Self {
        Self {
            active_session_id,
            last_login,
        }
    }

    #[must_use]
    pub fn active_session_id(&self) -> &SessionToken {
        &self.active_session_id
    }

    #[must_use]
    pub fn last_login(&self) -> DateTime<Utc> {
        self.last_login
    }

    /// True iff the given local token is the currently authoritative one.
    #[must_use]
    pub fn matches(&self, token: &SessionToken) -> bool {
        self.active_session_id == *token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    #[test]
    fn matches_only_its_own_token() {
        let token = SessionToken::generate();
        let record = SessionRecord::new(token.clone(), fixed_now());

        assert!(record.matches(&token));
        assert!(!record.matches(&SessionToken::generate()));
    }

    #[test]
    fn newer_record_supersedes_older_token() {
        let old = SessionToken::generate();
        let new = SessionToken::generate();
        let record = SessionRecord::new(new.clone(), fixed_now());

        assert!(!record.matches(&old));
        assert!(record.matches(&new));
    }
}
