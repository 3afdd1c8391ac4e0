//! In-process cache honoring TTLs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use common::{Result, Status};
use parking_lot::Mutex;

use super::KvCache;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// HashMap-backed [`KvCache`] with lazy expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvCache for MemoryCache {
    fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.entries.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
            },
        );
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                Err(Status::not_found(format!("key not found: {key}")))
            }
            None => Err(Status::not_found(format!("key not found: {key}"))),
        }
    }

    fn del(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::StatusCode;

    #[test]
    fn test_set_get_del_round_trip() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 60).unwrap();
        assert_eq!(cache.get("k").unwrap(), "v");
        cache.del("k").unwrap();
        assert_eq!(cache.get("k").unwrap_err().code(), StatusCode::NotFound);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("nope").unwrap_err().code(), StatusCode::NotFound);
    }

    #[test]
    fn test_entries_expire() {
        let cache = MemoryCache::new();
        cache.set_ex("k", "v", 0).unwrap();
        assert!(cache.get("k").is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_del_is_idempotent() {
        let cache = MemoryCache::new();
        cache.del("never-there").unwrap();
    }
}
