//! Session issuance and validation.

use std::sync::Arc;
use std::time::Duration;

use common::{Result, Status};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::debug;

use super::{SessionRecord, SessionRepository};

const TOKEN_LENGTH: usize = 32;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime; `expires_at = now + ttl`.
    pub ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Issues, validates, and revokes bearer sessions.
pub struct SessionManager {
    repository: Arc<dyn SessionRepository>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(repository: Arc<dyn SessionRepository>, config: SessionConfig) -> Self {
        Self { repository, config }
    }

    /// Issue a session for a user.
    pub fn create_session(&self, user_id: u64, user_uuid: &str) -> Result<SessionRecord> {
        let now = chrono::Utc::now().timestamp();
        let record = SessionRecord {
            token: generate_token(),
            user_id,
            user_uuid: user_uuid.to_string(),
            expires_at: now + self.config.ttl.as_secs() as i64,
        };
        self.repository.create_session(&record)?;
        debug!(target: "meeting.session", user_id, "session created");
        Ok(record)
    }

    /// Resolve a token to its session.
    ///
    /// # Errors
    ///
    /// `Unauthenticated` for unknown or expired tokens; an expired record
    /// is deleted on the way out.
    pub fn validate_session(&self, token: &str) -> Result<SessionRecord> {
        let record = self.repository.find_session(token)?;
        if record.expires_at > 0 && record.expires_at < chrono::Utc::now().timestamp() {
            let _ = self.repository.delete_session(token);
            return Err(Status::unauthenticated("session expired"));
        }
        Ok(record)
    }

    /// Revoke a session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.repository.delete_session(token)
    }
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LENGTH)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::core::user::InMemorySessionRepository;
    use common::StatusCode;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(InMemorySessionRepository::new()),
            SessionConfig::default(),
        )
    }

    #[test]
    fn test_tokens_are_32_char_alphanumeric() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_create_then_validate() {
        let manager = manager();
        let session = manager.create_session(5, "user_5").unwrap();
        let validated = manager.validate_session(&session.token).unwrap();
        assert_eq!(validated.user_id, 5);
        assert_eq!(validated.user_uuid, "user_5");
        assert!(validated.expires_at > chrono::Utc::now().timestamp());
    }

    #[test]
    fn test_unknown_token_is_unauthenticated() {
        let manager = manager();
        let err = manager.validate_session("nope").unwrap_err();
        assert_eq!(err.code(), StatusCode::Unauthenticated);
    }

    #[test]
    fn test_expired_session_is_evicted() {
        let repo = Arc::new(InMemorySessionRepository::new());
        let manager = SessionManager::new(Arc::clone(&repo) as Arc<dyn SessionRepository>, SessionConfig::default());
        let expired = SessionRecord {
            token: "stale-token".to_string(),
            user_id: 1,
            user_uuid: "user_1".to_string(),
            expires_at: chrono::Utc::now().timestamp() - 60,
        };
        repo.create_session(&expired).unwrap();

        let err = manager.validate_session("stale-token").unwrap_err();
        assert_eq!(err.code(), StatusCode::Unauthenticated);
        // The expired record must be gone.
        assert!(repo.find_session("stale-token").is_err());
    }

    #[test]
    fn test_logout_deletes_session() {
        let manager = manager();
        let session = manager.create_session(5, "user_5").unwrap();
        manager.delete_session(&session.token).unwrap();
        assert!(manager.validate_session(&session.token).is_err());
    }
}
