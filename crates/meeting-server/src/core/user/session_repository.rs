//! Session records and storage.

use std::collections::HashMap;

use common::{Result, Status};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A bearer session binding a token to a user until expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    /// Globally unique 32-char alphanumeric token.
    pub token: String,
    /// The user's numeric id.
    pub user_id: u64,
    /// The user's opaque id.
    pub user_uuid: String,
    /// Unix seconds; a positive value means expiry is in force.
    pub expires_at: i64,
}

/// Storage contract for sessions. Expiry is enforced by the session
/// manager; repositories return whatever they stored.
pub trait SessionRepository: Send + Sync {
    fn create_session(&self, record: &SessionRecord) -> Result<()>;

    fn find_session(&self, token: &str) -> Result<SessionRecord>;

    fn delete_session(&self, token: &str) -> Result<()>;
}

/// In-process session store.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(&record.token) {
            return Err(Status::already_exists("session token already exists"));
        }
        sessions.insert(record.token.clone(), record.clone());
        Ok(())
    }

    fn find_session(&self, token: &str) -> Result<SessionRecord> {
        self.sessions
            .read()
            .get(token)
            .cloned()
            .ok_or_else(|| Status::unauthenticated("invalid session token"))
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        match self.sessions.write().remove(token) {
            Some(_) => Ok(()),
            None => Err(Status::not_found("session token not found")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::StatusCode;

    fn record(token: &str) -> SessionRecord {
        SessionRecord {
            token: token.to_string(),
            user_id: 7,
            user_uuid: "user_7".to_string(),
            expires_at: 2_000_000_000,
        }
    }

    #[test]
    fn test_create_find_delete() {
        let repo = InMemorySessionRepository::new();
        repo.create_session(&record("tok")).unwrap();
        assert_eq!(repo.find_session("tok").unwrap().user_id, 7);
        repo.delete_session("tok").unwrap();
        assert_eq!(
            repo.find_session("tok").unwrap_err().code(),
            StatusCode::Unauthenticated
        );
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let repo = InMemorySessionRepository::new();
        repo.create_session(&record("tok")).unwrap();
        assert_eq!(
            repo.create_session(&record("tok")).unwrap_err().code(),
            StatusCode::AlreadyExists
        );
    }

    #[test]
    fn test_delete_unknown_token() {
        let repo = InMemorySessionRepository::new();
        assert_eq!(
            repo.delete_session("missing").unwrap_err().code(),
            StatusCode::NotFound
        );
    }
}
