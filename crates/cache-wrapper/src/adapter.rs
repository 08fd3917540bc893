//! # Connection Adapter
//!
//! One method per store primitive over a single lazily-opened connection.
//! Keys pass through untouched except for the explicit `namespace`
//! argument a few methods accept.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::config::HostConfig;
use crate::connection::{RedisConnection, SharedConnection};
use crate::error::{CacheError, Result};

/// Adapter bound to one Redis endpoint.
///
/// The connection is created on first use and reused by every later call.
/// Concurrent first calls share one connection attempt; a failed attempt
/// leaves the adapter unconnected so the next call tries again.
pub struct RedisAdapter {
    host: String,
    port: u16,
    conn: OnceCell<SharedConnection>,
}

impl RedisAdapter {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            conn: OnceCell::new(),
        }
    }

    /// Adapter that uses an already-built connection instead of dialing.
    pub fn with_connection(host: impl Into<String>, port: u16, conn: SharedConnection) -> Self {
        Self {
            host: host.into(),
            port,
            conn: OnceCell::new_with(Some(conn)),
        }
    }

    pub fn from_config(config: &HostConfig, conn: Option<SharedConnection>) -> Self {
        match conn {
            Some(conn) => Self::with_connection(config.host.clone(), config.port, conn),
            None => Self::new(config.host.clone(), config.port),
        }
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.initialized()
    }

    /// Shared connection, opened on first use.
    pub async fn connection(&self) -> Result<SharedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::info!(host = %self.host, port = self.port, "Connecting to Redis");
                let conn = RedisConnection::connect(&self.url()).await?;
                tracing::info!(host = %self.host, port = self.port, "Redis connected");
                Ok::<SharedConnection, CacheError>(Arc::new(conn))
            })
            .await?;
        Ok(Arc::clone(conn))
    }

    fn namespaced<'a>(namespace: Option<&str>, key: &'a str) -> Cow<'a, str> {
        match namespace {
            Some(namespace) => Cow::Owned(format!("{namespace}:{key}")),
            None => Cow::Borrowed(key),
        }
    }

    // =========================================================================
    // STRING OPERATIONS
    // =========================================================================

    /// Store `value` at `key`. Returns `false` only when `nx` found the key present.
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        expire_secs: Option<u64>,
        namespace: Option<&str>,
        nx: bool,
    ) -> Result<bool> {
        let key = Self::namespaced(namespace, key);
        let conn = self.connection().await?;
        Ok(conn.set(&key, value, expire_secs, nx).await?)
    }

    pub async fn get(&self, key: &str, namespace: Option<&str>) -> Result<Option<String>> {
        let key = Self::namespaced(namespace, key);
        let conn = self.connection().await?;
        Ok(conn.get(&key).await?)
    }

    /// Atomically add `amount`; an absent key starts from 0.
    pub async fn incr(&self, key: &str, amount: i64) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.incr_by(key, amount).await?)
    }

    pub async fn increment_by_value(&self, key: &str, value: i64) -> Result<()> {
        self.incr(key, value).await.map(drop)
    }

    /// Atomically subtract `amount`; an absent key starts from 0.
    pub async fn decr(&self, key: &str, amount: i64) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.decr_by(key, amount).await?)
    }

    pub async fn decrement_by_value(&self, key: &str, value: i64) -> Result<()> {
        self.decr(key, value).await.map(drop)
    }

    pub async fn setnx(&self, key: &str, value: &str) -> Result<bool> {
        self.set(key, value, None, None, true).await
    }

    pub async fn mset(&self, entries: &[(String, String)]) -> Result<()> {
        let conn = self.connection().await?;
        Ok(conn.mset(entries).await?)
    }

    /// Values aligned with `keys`; `None` where a key is absent.
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let conn = self.connection().await?;
        Ok(conn.mget(keys).await?)
    }

    /// Set every entry with the same TTL in one pipelined round trip.
    ///
    /// Commands run in order but other clients may observe a partly
    /// applied batch.
    pub async fn mset_with_expire(
        &self,
        entries: &[(String, String)],
        expire_secs: Option<u64>,
    ) -> Result<()> {
        let conn = self.connection().await?;
        tracing::debug!(count = entries.len(), ?expire_secs, "Pipelined mset_with_expire");
        Ok(conn.mset_with_expire(entries, expire_secs).await?)
    }

    // =========================================================================
    // HASH OPERATIONS
    // =========================================================================

    pub async fn hset(&self, key: &str, fields: &[(String, String)]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.hset(key, fields).await?)
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let conn = self.connection().await?;
        Ok(conn.hget(key, field).await?)
    }

    pub async fn hdel(&self, key: &str, fields: &[String]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.hdel(key, fields).await?)
    }

    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let conn = self.connection().await?;
        Ok(conn.hgetall(key).await?)
    }

    pub async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.hincr_by(key, field, delta).await?)
    }

    pub async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        let conn = self.connection().await?;
        Ok(conn.hkeys(key).await?)
    }

    // =========================================================================
    // LIST OPERATIONS
    // =========================================================================

    /// Push onto the head in order, so the last value ends up first.
    pub async fn lpush(&self, key: &str, values: &[String]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.lpush(key, values).await?)
    }

    pub async fn rpush(&self, key: &str, values: &[String]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.rpush(key, values).await?)
    }

    pub async fn lpop(&self, key: &str) -> Result<Option<String>> {
        let conn = self.connection().await?;
        Ok(conn.lpop(key).await?)
    }

    /// Block until one of `keys` has a tail element or the timeout passes.
    pub async fn brpop(
        &self,
        keys: &[String],
        timeout_secs: f64,
    ) -> Result<Option<(String, String)>> {
        let conn = self.connection().await?;
        Ok(conn.brpop(keys, timeout_secs).await?)
    }

    pub async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let conn = self.connection().await?;
        Ok(conn.lrange(key, start, stop).await?)
    }

    // =========================================================================
    // SET OPERATIONS
    // =========================================================================

    pub async fn sadd(&self, key: &str, value: &str, namespace: Option<&str>) -> Result<i64> {
        let key = Self::namespaced(namespace, key);
        let conn = self.connection().await?;
        Ok(conn.sadd(&key, value).await?)
    }

    pub async fn smembers(&self, key: &str, namespace: Option<&str>) -> Result<Vec<String>> {
        let key = Self::namespaced(namespace, key);
        let conn = self.connection().await?;
        Ok(conn.smembers(&key).await?)
    }

    pub async fn sismember(
        &self,
        key: &str,
        value: &str,
        namespace: Option<&str>,
    ) -> Result<bool> {
        let key = Self::namespaced(namespace, key);
        let conn = self.connection().await?;
        Ok(conn.sismember(&key, value).await?)
    }

    pub async fn spop(&self, key: &str, count: Option<usize>) -> Result<Vec<String>> {
        let conn = self.connection().await?;
        Ok(conn.spop(key, count).await?)
    }

    // =========================================================================
    // SORTED SET OPERATIONS
    // =========================================================================

    pub async fn zadd(&self, key: &str, members: &[(String, f64)]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.zadd(key, members).await?)
    }

    pub async fn zrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let conn = self.connection().await?;
        Ok(conn.zrange(key, start, stop).await?)
    }

    pub async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(String, f64)>> {
        let conn = self.connection().await?;
        Ok(conn.zrange_withscores(key, start, stop).await?)
    }

    pub async fn zpopmin(&self, key: &str, count: Option<usize>) -> Result<Vec<(String, f64)>> {
        let conn = self.connection().await?;
        Ok(conn.zpopmin(key, count).await?)
    }

    pub async fn zpopmax(&self, key: &str, count: Option<usize>) -> Result<Vec<(String, f64)>> {
        let conn = self.connection().await?;
        Ok(conn.zpopmax(key, count).await?)
    }

    // =========================================================================
    // KEY MANAGEMENT
    // =========================================================================

    /// Delete `keys`; absent keys are ignored.
    pub async fn delete(&self, keys: &[String]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.del(keys).await?)
    }

    /// Keys matching a glob pattern. An empty pattern matches nothing.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        if pattern.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.connection().await?;
        Ok(conn.keys(pattern).await?)
    }

    /// `true` if the key existed and now expires in `seconds`.
    pub async fn expire(&self, key: &str, seconds: i64) -> Result<bool> {
        let conn = self.connection().await?;
        Ok(conn.expire(key, seconds).await?)
    }

    /// Number of `keys` that exist.
    pub async fn exists(&self, keys: &[String]) -> Result<i64> {
        let conn = self.connection().await?;
        Ok(conn.exists(keys).await?)
    }

    /// Delete every key starting with `prefix`. Returns the count deleted.
    pub async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        if prefix.is_empty() {
            return Ok(0);
        }
        self.delete_by_pattern(&format!("{prefix}*")).await
    }

    /// Delete every key under `namespace`.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        if namespace.is_empty() {
            return Ok(0);
        }
        self.delete_by_pattern(&format!("{namespace}*")).await
    }

    async fn delete_by_pattern(&self, pattern: &str) -> Result<usize> {
        let matched = self.keys(pattern).await?;
        if !matched.is_empty() {
            self.delete(&matched).await?;
        }
        tracing::debug!(pattern, deleted = matched.len(), "Deleted keys by pattern");
        Ok(matched.len())
    }

    // =========================================================================
    // SCRIPTING
    // =========================================================================

    /// Run a Lua script. The first `num_keys` items of `keys_and_args` are keys.
    pub async fn eval(
        &self,
        script: &str,
        num_keys: usize,
        keys_and_args: &[String],
    ) -> Result<redis::Value> {
        if num_keys > keys_and_args.len() {
            return Err(CacheError::InvalidArgument(format!(
                "num_keys {num_keys} exceeds the {} keys and args supplied",
                keys_and_args.len()
            )));
        }
        let (keys, args) = keys_and_args.split_at(num_keys);
        let conn = self.connection().await?;
        Ok(conn.eval(script, keys, args).await?)
    }
}

impl std::fmt::Debug for RedisAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisAdapter")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::recording::ScriptRecorder;
    use crate::connection::MemoryConnection;
    use tokio_test::{assert_err, assert_ok};

    fn adapter() -> RedisAdapter {
        RedisAdapter::with_connection("localhost", 6544, MemoryConnection::shared())
    }

    fn strings(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_lazy_adapter_starts_unconnected() {
        let lazy = RedisAdapter::new("localhost", 6379);
        assert!(!lazy.is_connected());
        assert_eq!(lazy.url(), "redis://localhost:6379");
        assert!(adapter().is_connected());
    }

    #[tokio::test]
    async fn test_connection_handle_is_reused() {
        let adapter = adapter();
        let first = adapter.connection().await.unwrap();
        let second = adapter.connection().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_explicit_namespace_prefixes_key() {
        let adapter = adapter();
        assert_ok!(adapter.set("k", "v", None, Some("ns"), false).await);
        assert_eq!(adapter.get("ns:k", None).await.unwrap().as_deref(), Some("v"));
        assert_eq!(adapter.get("k", Some("ns")).await.unwrap().as_deref(), Some("v"));
        assert_eq!(adapter.get("k", None).await.unwrap(), None);

        adapter.sadd("members", "a", Some("ns")).await.unwrap();
        assert!(adapter.sismember("ns:members", "a", None).await.unwrap());
        assert_eq!(adapter.smembers("members", Some("ns")).await.unwrap(), strings(&["a"]));
    }

    #[tokio::test]
    async fn test_setnx_and_counters() {
        let adapter = adapter();
        assert!(adapter.setnx("n", "1").await.unwrap());
        assert!(!adapter.setnx("n", "20").await.unwrap());
        assert_eq!(adapter.incr("n", 10).await.unwrap(), 11);
        assert_eq!(adapter.decr("n", 3).await.unwrap(), 8);
        adapter.increment_by_value("n", 2).await.unwrap();
        adapter.decrement_by_value("n", 1).await.unwrap();
        assert_eq!(adapter.get("n", None).await.unwrap().as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn test_mget_aligns_with_input() {
        let adapter = adapter();
        let entries = vec![
            ("k1".to_string(), "v1".to_string()),
            ("k2".to_string(), "v2".to_string()),
        ];
        adapter.mset(&entries).await.unwrap();
        let values = adapter.mget(&strings(&["k2", "k3", "k1"])).await.unwrap();
        assert_eq!(values, vec![Some("v2".to_string()), None, Some("v1".to_string())]);
    }

    #[tokio::test]
    async fn test_push_order() {
        let adapter = adapter();
        adapter.lpush("l", &strings(&["a", "b", "c"])).await.unwrap();
        adapter.rpush("r", &strings(&["a", "b", "c"])).await.unwrap();
        assert_eq!(adapter.lrange("l", 0, -1).await.unwrap(), strings(&["c", "b", "a"]));
        assert_eq!(adapter.lrange("r", 0, -1).await.unwrap(), strings(&["a", "b", "c"]));
        assert_eq!(adapter.lrange("r", -2, -1).await.unwrap(), strings(&["b", "c"]));
        assert_eq!(adapter.lpop("l").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_keys_empty_pattern_is_empty() {
        let adapter = adapter();
        adapter.set("k", "v", None, None, false).await.unwrap();
        assert!(adapter.keys("").await.unwrap().is_empty());
        assert_eq!(adapter.keys("k*").await.unwrap(), strings(&["k"]));
    }

    #[tokio::test]
    async fn test_delete_by_prefix() {
        let adapter = adapter();
        for key in ["p1", "p2", "other"] {
            adapter.set(key, "x", None, None, false).await.unwrap();
        }
        assert_eq!(adapter.delete_by_prefix("").await.unwrap(), 0);
        assert_eq!(adapter.delete_by_prefix("p").await.unwrap(), 2);
        assert_eq!(adapter.keys("*").await.unwrap(), strings(&["other"]));
        assert_eq!(adapter.clear_namespace("oth").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_ignores_missing() {
        let adapter = adapter();
        adapter.set("a", "1", None, None, false).await.unwrap();
        assert_eq!(adapter.delete(&strings(&["a", "missing"])).await.unwrap(), 1);
        assert_eq!(adapter.exists(&strings(&["a", "missing"])).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_eval_rejects_bad_num_keys() {
        let adapter = adapter();
        let err = assert_err!(adapter.eval("return 1", 2, &strings(&["k"])).await);
        assert!(matches!(err, CacheError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_eval_splits_keys_from_args() {
        let recorder = ScriptRecorder::new(redis::Value::Int(3));
        let adapter = RedisAdapter::with_connection("localhost", 6544, recorder.shared());

        let reply = adapter
            .eval("return #KEYS + #ARGV", 2, &strings(&["k1", "k2", "a1"]))
            .await
            .unwrap();
        assert_eq!(reply, redis::Value::Int(3));

        adapter.eval("return 0", 0, &strings(&["a1"])).await.unwrap();
        assert_eq!(
            recorder.calls(),
            vec![
                (
                    "return #KEYS + #ARGV".to_string(),
                    strings(&["k1", "k2"]),
                    strings(&["a1"]),
                ),
                ("return 0".to_string(), Vec::new(), strings(&["a1"])),
            ]
        );
    }

    #[tokio::test]
    async fn test_backend_errors_pass_through() {
        let adapter = adapter();
        adapter.set("text", "abc", None, None, false).await.unwrap();
        let err = assert_err!(adapter.incr("text", 1).await);
        match err {
            CacheError::Redis(inner) => assert_eq!(inner.kind(), redis::ErrorKind::ResponseError),
            other => panic!("unexpected error: {other}"),
        }
    }
}
