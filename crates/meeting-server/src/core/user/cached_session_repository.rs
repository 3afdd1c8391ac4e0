//! Write-through / read-through cache around a session repository.
//!
//! Key: `meeting:session:<token>`. The TTL is derived from the record
//! itself (`expires_at - now`); a non-positive remainder skips caching.
//! A cache hit revalidates expiry and deletes a stale entry.

use std::sync::Arc;

use common::{Result, Status, StatusCode};
use tracing::warn;

use crate::cache::KvCache;

use super::{SessionRecord, SessionRepository};

const TOKEN_PREFIX: &str = "meeting:session:";

/// Caching decorator over a [`SessionRepository`].
pub struct CachedSessionRepository {
    primary: Arc<dyn SessionRepository>,
    cache: Arc<dyn KvCache>,
}

impl CachedSessionRepository {
    pub fn new(primary: Arc<dyn SessionRepository>, cache: Arc<dyn KvCache>) -> Self {
        Self { primary, cache }
    }

    fn key_for(token: &str) -> String {
        format!("{TOKEN_PREFIX}{token}")
    }

    fn cache_put(&self, record: &SessionRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let ttl = if record.expires_at > 0 {
            record.expires_at - now
        } else {
            0
        };
        if ttl <= 0 {
            // Already expired; nothing worth caching.
            return Ok(());
        }
        let payload = serde_json::to_string(record)
            .map_err(|e| Status::internal(format!("failed to encode session: {e}")))?;
        self.cache
            .set_ex(&Self::key_for(&record.token), &payload, ttl as u64)
    }

    fn cache_get(&self, token: &str) -> Result<SessionRecord> {
        let payload = self.cache.get(&Self::key_for(token))?;
        let record: SessionRecord = serde_json::from_str(&payload)
            .map_err(|_| Status::unavailable("invalid cache payload"))?;

        if record.expires_at != 0 && record.expires_at < chrono::Utc::now().timestamp() {
            self.cache_delete(token);
            return Err(Status::unauthenticated("session expired"));
        }
        Ok(record)
    }

    fn cache_delete(&self, token: &str) {
        if let Err(status) = self.cache.del(&Self::key_for(token)) {
            if status.code() != StatusCode::NotFound {
                warn!(target: "meeting.cache.session", error = %status, "delete failed");
            }
        }
    }
}

impl SessionRepository for CachedSessionRepository {
    fn create_session(&self, record: &SessionRecord) -> Result<()> {
        self.primary.create_session(record)?;
        if let Err(status) = self.cache_put(record) {
            warn!(target: "meeting.cache.session", error = %status, "cache put failed");
        }
        Ok(())
    }

    fn find_session(&self, token: &str) -> Result<SessionRecord> {
        match self.cache_get(token) {
            Ok(record) => return Ok(record),
            Err(status) if status.code() == StatusCode::Unauthenticated => {
                // Stale cache entry: fall through to the primary, which is
                // the source of truth for expiry.
            }
            Err(status) if status.code() != StatusCode::NotFound => {
                warn!(target: "meeting.cache.session", error = %status, "cache read failed");
            }
            Err(_) => {}
        }

        let record = self.primary.find_session(token)?;
        if let Err(status) = self.cache_put(&record) {
            warn!(target: "meeting.cache.session", error = %status, "cache backfill failed");
        }
        Ok(record)
    }

    fn delete_session(&self, token: &str) -> Result<()> {
        let status = self.primary.delete_session(token);
        self.cache_delete(token);
        status
    }
}
