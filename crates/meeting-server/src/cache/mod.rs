//! Key/value cache abstraction.
//!
//! Values are strings (JSON payloads); every entry carries a TTL. The
//! production implementation is [`RedisCache`]; [`MemoryCache`] backs
//! hermetic tests and cache-less deployments.

mod memory;
mod redis_client;

use common::Result;

pub use memory::MemoryCache;
pub use redis_client::RedisCache;

/// String key/value store with per-key TTL.
///
/// `get` returns `NotFound` for a missing key; any transport failure maps
/// to `Unavailable`.
pub trait KvCache: Send + Sync {
    fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<()>;

    fn get(&self, key: &str) -> Result<String>;

    fn del(&self, key: &str) -> Result<()>;
}
