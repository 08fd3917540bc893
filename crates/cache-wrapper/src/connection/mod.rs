//! # Connection Layer
//!
//! One async method per store primitive, on raw text payloads. Keys arrive
//! fully formed; this layer never rewrites them.
//!
//! Implementations can be swapped for different backends:
//! - [`RedisConnection`] talks to a live server through a multiplexed
//!   `ConnectionManager`.
//! - [`MemoryConnection`] (feature `memory`) is an in-process emulator
//!   for tests and offline runs.

use async_trait::async_trait;
use redis::RedisResult;
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(any(test, feature = "memory"))]
pub mod glob;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod redis_conn;
#[cfg(test)]
pub(crate) mod recording;

#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryConnection;
pub use redis_conn::RedisConnection;

/// Handle shared by every caller of one adapter.
pub type SharedConnection = Arc<dyn Connection>;

/// Store primitives used by the adapter.
#[async_trait]
pub trait Connection: Send + Sync {
    // -------------------------------------------------------------------------
    // STRINGS
    // -------------------------------------------------------------------------

    /// `SET key value [EX seconds] [NX]`. Returns `false` when `nx` blocked the write.
    async fn set(&self, key: &str, value: &str, expire_secs: Option<u64>, nx: bool)
        -> RedisResult<bool>;

    async fn get(&self, key: &str) -> RedisResult<Option<String>>;

    async fn incr_by(&self, key: &str, delta: i64) -> RedisResult<i64>;

    async fn decr_by(&self, key: &str, delta: i64) -> RedisResult<i64>;

    async fn mset(&self, entries: &[(String, String)]) -> RedisResult<()>;

    /// One slot per requested key, `None` where absent.
    async fn mget(&self, keys: &[String]) -> RedisResult<Vec<Option<String>>>;

    /// Pipelined `SET` of every entry with the same optional TTL.
    async fn mset_with_expire(
        &self,
        entries: &[(String, String)],
        expire_secs: Option<u64>,
    ) -> RedisResult<()>;

    // -------------------------------------------------------------------------
    // HASHES
    // -------------------------------------------------------------------------

    /// Returns the number of fields newly created.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> RedisResult<i64>;

    async fn hget(&self, key: &str, field: &str) -> RedisResult<Option<String>>;

    async fn hdel(&self, key: &str, fields: &[String]) -> RedisResult<i64>;

    async fn hgetall(&self, key: &str) -> RedisResult<HashMap<String, String>>;

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> RedisResult<i64>;

    async fn hkeys(&self, key: &str) -> RedisResult<Vec<String>>;

    // -------------------------------------------------------------------------
    // LISTS
    // -------------------------------------------------------------------------

    /// Pushes each value onto the head in order; returns the new length.
    async fn lpush(&self, key: &str, values: &[String]) -> RedisResult<i64>;

    /// Pushes each value onto the tail in order; returns the new length.
    async fn rpush(&self, key: &str, values: &[String]) -> RedisResult<i64>;

    async fn lpop(&self, key: &str) -> RedisResult<Option<String>>;

    /// Blocking tail pop over several lists. `timeout_secs == 0.0` blocks forever.
    async fn brpop(&self, keys: &[String], timeout_secs: f64)
        -> RedisResult<Option<(String, String)>>;

    /// Inclusive slice; negative indices count from the tail.
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>>;

    // -------------------------------------------------------------------------
    // SETS
    // -------------------------------------------------------------------------

    async fn sadd(&self, key: &str, member: &str) -> RedisResult<i64>;

    async fn smembers(&self, key: &str) -> RedisResult<Vec<String>>;

    async fn sismember(&self, key: &str, member: &str) -> RedisResult<bool>;

    async fn spop(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<String>>;

    // -------------------------------------------------------------------------
    // SORTED SETS
    // -------------------------------------------------------------------------

    /// Adds or re-scores members; returns the number of new members.
    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> RedisResult<i64>;

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>>;

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> RedisResult<Vec<(String, f64)>>;

    /// Lowest-scored members first; `None` pops one.
    async fn zpopmin(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<(String, f64)>>;

    /// Highest-scored members first; `None` pops one.
    async fn zpopmax(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<(String, f64)>>;

    // -------------------------------------------------------------------------
    // KEYS & SCRIPTING
    // -------------------------------------------------------------------------

    /// Returns the number of keys removed.
    async fn del(&self, keys: &[String]) -> RedisResult<i64>;

    /// Glob-style listing (`*`, `?`, `[...]`, `\` escapes).
    async fn keys(&self, pattern: &str) -> RedisResult<Vec<String>>;

    /// `true` when the key existed and now carries the TTL.
    async fn expire(&self, key: &str, seconds: i64) -> RedisResult<bool>;

    /// Counts existing keys; duplicates count once per mention.
    async fn exists(&self, keys: &[String]) -> RedisResult<i64>;

    async fn eval(&self, script: &str, keys: &[String], args: &[String])
        -> RedisResult<redis::Value>;
}
