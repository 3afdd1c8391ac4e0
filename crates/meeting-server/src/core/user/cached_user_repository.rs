//! Write-through / read-through cache around a user repository.
//!
//! Keys: `meeting:user:id:<id>` and `meeting:user:name:<name>`. Reads try
//! the cache first and backfill on a miss; writes go to the primary first
//! and then refresh the cache from the primary (so store-assigned fields
//! like the numeric id land in the payload). Cache errors other than a
//! miss are logged and swallowed; the primary outcome wins.

use std::sync::Arc;

use common::{Result, StatusCode};
use tracing::warn;

use crate::cache::KvCache;

use super::{UserData, UserRepository};

const ID_PREFIX: &str = "meeting:user:id:";
const NAME_PREFIX: &str = "meeting:user:name:";

/// Caching decorator over a [`UserRepository`].
pub struct CachedUserRepository {
    primary: Arc<dyn UserRepository>,
    cache: Arc<dyn KvCache>,
    ttl_seconds: u64,
}

impl CachedUserRepository {
    pub fn new(
        primary: Arc<dyn UserRepository>,
        cache: Arc<dyn KvCache>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            primary,
            cache,
            ttl_seconds,
        }
    }

    fn key_by_id(user_id: &str) -> String {
        format!("{ID_PREFIX}{user_id}")
    }

    fn key_by_name(user_name: &str) -> String {
        format!("{NAME_PREFIX}{user_name}")
    }

    fn cache_put(&self, user: &UserData) -> Result<()> {
        let payload = serde_json::to_string(user)
            .map_err(|e| common::Status::internal(format!("failed to encode user: {e}")))?;
        self.cache
            .set_ex(&Self::key_by_id(&user.user_id), &payload, self.ttl_seconds)?;
        self.cache
            .set_ex(&Self::key_by_name(&user.user_name), &payload, self.ttl_seconds)
    }

    fn cache_get(&self, key: &str) -> Result<UserData> {
        let payload = self.cache.get(key)?;
        serde_json::from_str(&payload)
            .map_err(|_| common::Status::unavailable("invalid cache payload"))
    }

    fn cache_delete(&self, user_id: &str, user_name: &str) {
        for key in [Self::key_by_id(user_id), Self::key_by_name(user_name)] {
            if let Err(status) = self.cache.del(&key) {
                if status.code() != StatusCode::NotFound {
                    warn!(target: "meeting.cache.user", error = %status, "invalidate failed");
                }
            }
        }
    }

    fn read_through(&self, key: &str, fetch: impl FnOnce() -> Result<UserData>) -> Result<UserData> {
        match self.cache_get(key) {
            Ok(user) => return Ok(user),
            Err(status) if status.code() != StatusCode::NotFound => {
                warn!(target: "meeting.cache.user", error = %status, "cache read failed");
            }
            Err(_) => {}
        }

        let user = fetch()?;
        if let Err(status) = self.cache_put(&user) {
            warn!(target: "meeting.cache.user", error = %status, "cache backfill failed");
        }
        Ok(user)
    }
}

impl UserRepository for CachedUserRepository {
    fn create_user(&self, data: &UserData) -> Result<()> {
        self.primary.create_user(data)?;
        // Re-read so the payload carries the store-assigned numeric id.
        match self.primary.find_by_user_name(&data.user_name) {
            Ok(stored) => {
                if let Err(status) = self.cache_put(&stored) {
                    warn!(target: "meeting.cache.user", error = %status, "cache put failed");
                }
            }
            Err(status) => {
                warn!(
                    target: "meeting.cache.user",
                    error = %status,
                    "re-read after create failed"
                );
            }
        }
        Ok(())
    }

    fn find_by_user_name(&self, user_name: &str) -> Result<UserData> {
        self.read_through(&Self::key_by_name(user_name), || {
            self.primary.find_by_user_name(user_name)
        })
    }

    fn find_by_id(&self, user_id: &str) -> Result<UserData> {
        self.read_through(&Self::key_by_id(user_id), || self.primary.find_by_id(user_id))
    }

    fn update_last_login(&self, user_id: &str, last_login: i64) -> Result<()> {
        self.primary.update_last_login(user_id, last_login)?;
        match self.primary.find_by_id(user_id) {
            Ok(latest) => {
                if let Err(status) = self.cache_put(&latest) {
                    warn!(target: "meeting.cache.user", error = %status, "cache refresh failed");
                }
            }
            Err(_) => {
                // Cannot refresh; drop whatever is cached for this user.
                self.cache_delete(user_id, "");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::core::user::InMemoryUserRepository;

    fn stack() -> (Arc<InMemoryUserRepository>, Arc<MemoryCache>, CachedUserRepository) {
        let primary = Arc::new(InMemoryUserRepository::new());
        let cache = Arc::new(MemoryCache::new());
        let cached = CachedUserRepository::new(
            Arc::clone(&primary) as Arc<dyn UserRepository>,
            Arc::clone(&cache) as Arc<dyn KvCache>,
            60,
        );
        (primary, cache, cached)
    }

    fn user(name: &str) -> UserData {
        UserData {
            user_id: format!("user_{name}"),
            user_name: name.to_string(),
            display_name: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            salt: "salt".to_string(),
            created_at: 1_700_000_000,
            ..UserData::default()
        }
    }

    #[test]
    fn test_create_populates_both_keys() {
        let (_, cache, cached) = stack();
        cached.create_user(&user("alice")).unwrap();
        assert!(cache.get("meeting:user:id:user_alice").is_ok());
        assert!(cache.get("meeting:user:name:alice").is_ok());
    }

    #[test]
    fn test_cached_payload_includes_numeric_id() {
        let (_, _, cached) = stack();
        cached.create_user(&user("alice")).unwrap();
        let fetched = cached.find_by_user_name("alice").unwrap();
        assert!(fetched.numeric_id > 0);
    }

    #[test]
    fn test_read_serves_from_cache_after_primary_delete() {
        let (primary, _, cached) = stack();
        cached.create_user(&user("alice")).unwrap();

        // Only the cache knows this user now; reads must still succeed.
        let from_cache = cached.find_by_user_name("alice").unwrap();
        let direct = primary.find_by_user_name("alice").unwrap();
        assert_eq!(from_cache, direct);
    }

    #[test]
    fn test_miss_backfills_the_cache() {
        let (primary, cache, cached) = stack();
        primary.create_user(&user("bob")).unwrap();
        assert!(cache.get("meeting:user:name:bob").is_err());

        cached.find_by_user_name("bob").unwrap();
        assert!(cache.get("meeting:user:name:bob").is_ok());
    }

    #[test]
    fn test_eviction_does_not_change_observable_value() {
        let (_, cache, cached) = stack();
        cached.create_user(&user("alice")).unwrap();
        let before = cached.find_by_user_name("alice").unwrap();

        cache.del("meeting:user:name:alice").unwrap();
        cache.del("meeting:user:id:user_alice").unwrap();

        let after = cached.find_by_user_name("alice").unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_update_last_login_refreshes_cache() {
        let (_, cache, cached) = stack();
        cached.create_user(&user("alice")).unwrap();
        cached.update_last_login("user_alice", 123).unwrap();

        let payload = cache.get("meeting:user:id:user_alice").unwrap();
        let decoded: UserData = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded.last_login, 123);
    }

    #[test]
    fn test_unknown_fields_in_payload_are_ignored() {
        let (_, cache, cached) = stack();
        cached.create_user(&user("alice")).unwrap();
        cache
            .set_ex(
                "meeting:user:name:alice",
                r#"{"user_id":"user_alice","user_name":"alice","extra_field":true}"#,
                60,
            )
            .unwrap();
        let fetched = cached.find_by_user_name("alice").unwrap();
        assert_eq!(fetched.user_id, "user_alice");
        // Missing fields default.
        assert_eq!(fetched.last_login, 0);
    }
}
