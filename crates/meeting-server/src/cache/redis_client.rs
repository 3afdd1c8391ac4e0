//! Redis-backed cache client.
//!
//! Holds one lazily opened connection behind a mutex; a failed command
//! drops the connection so the next call reconnects. Every transport
//! failure maps to `Unavailable` so callers can fall through to the
//! primary store.

use common::config::RedisConfig;
use common::{Result, Status};
use parking_lot::Mutex;
use redis::Commands;
use tracing::{debug, warn};

use super::KvCache;

/// [`KvCache`] over a Redis server.
pub struct RedisCache {
    client: redis::Client,
    connection: Mutex<Option<redis::Connection>>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache").finish_non_exhaustive()
    }
}

fn connection_url(config: &RedisConfig) -> String {
    if config.password.is_empty() {
        format!("redis://{}:{}/{}", config.host, config.port, config.db)
    } else {
        format!(
            "redis://:{}@{}:{}/{}",
            config.password, config.host, config.port, config.db
        )
    }
}

impl RedisCache {
    /// Build a client from configuration. No connection is made yet; the
    /// first command connects.
    ///
    /// # Errors
    ///
    /// `Unavailable` when the cache is disabled or the address is invalid.
    pub fn new(config: &RedisConfig) -> Result<Self> {
        if !config.enabled {
            return Err(Status::unavailable("redis cache is disabled"));
        }
        let client = redis::Client::open(connection_url(config))
            .map_err(|e| Status::unavailable(format!("failed to open redis client: {e}")))?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
        })
    }

    // Run `op` on the cached connection, reconnecting when needed and
    // dropping the connection on failure.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut redis::Connection) -> redis::RedisResult<T>,
    ) -> Result<T> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            let connection = self.client.get_connection().map_err(|e| {
                warn!(target: "meeting.cache", error = %e, "redis connect failed");
                Status::unavailable(format!("failed to connect to redis: {e}"))
            })?;
            debug!(target: "meeting.cache", "redis connection established");
            *guard = Some(connection);
        }
        let connection = guard.as_mut().unwrap_or_else(|| unreachable!());
        op(connection).map_err(|e| {
            *guard = None;
            Status::unavailable(format!("redis command failed: {e}"))
        })
    }
}

impl KvCache for RedisCache {
    fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()> {
        self.with_connection(|conn| conn.set_ex(key, value, ttl_seconds))
    }

    fn get(&self, key: &str) -> Result<String> {
        let value: Option<String> = self.with_connection(|conn| conn.get(key))?;
        value.ok_or_else(|| Status::not_found(format!("key not found: {key}")))
    }

    fn del(&self, key: &str) -> Result<()> {
        let _removed: i64 = self.with_connection(|conn| conn.del(key))?;
        Ok(())
    }
}
