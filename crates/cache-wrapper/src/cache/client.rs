//! # Prefixed Cache Facade
//!
//! Typed front door over a registered [`RedisAdapter`]: every key is
//! prefixed with the namespace, every value travels as JSON, and every
//! call leaves one debug record behind.

use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

use super::call_log::logged;
use crate::adapter::RedisAdapter;
use crate::codec;
use crate::config::CacheNamespace;
use crate::error::{CacheError, Result};
use crate::registry::SharedRegistry;

/// Per-write options for [`RedisCache::set_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// TTL in seconds; falls back to the namespace default
    pub expire: Option<u64>,
    /// Extra `namespace:` segment the adapter puts in front of the full key
    pub namespace: Option<String>,
    /// Only write when the key is absent
    pub nx: bool,
}

impl SetOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn expire(mut self, seconds: u64) -> Self {
        self.expire = Some(seconds);
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub const fn nx(mut self) -> Self {
        self.nx = true;
        self
    }
}

/// Namespaced cache client.
///
/// Cheap to clone; clones share the registry.
#[derive(Debug, Clone)]
pub struct RedisCache {
    registry: SharedRegistry,
    namespace: CacheNamespace,
}

impl RedisCache {
    pub const fn new(registry: SharedRegistry, namespace: CacheNamespace) -> Self {
        Self {
            registry,
            namespace,
        }
    }

    #[must_use]
    pub const fn namespace(&self) -> &CacheNamespace {
        &self.namespace
    }

    /// Physical key for `key` under this namespace.
    #[must_use]
    pub fn prefixed_key(&self, key: &str) -> String {
        self.namespace.prefixed_key(key)
    }

    fn adapter(&self) -> Result<&Arc<RedisAdapter>> {
        self.registry.adapter(&self.namespace.host)
    }

    fn prefixed_keys<K: AsRef<str>>(&self, keys: &[K]) -> Vec<String> {
        keys.iter().map(|key| self.prefixed_key(key.as_ref())).collect()
    }

    fn encode_entries<K: AsRef<str>, V: Serialize>(
        &self,
        entries: &[(K, V)],
    ) -> Result<Vec<(String, String)>> {
        entries
            .iter()
            .map(|(key, value)| Ok((self.prefixed_key(key.as_ref()), codec::encode(value)?)))
            .collect()
    }

    /// A TTL of zero means "none" at both the call and the namespace level.
    fn effective_expire(&self, expire: Option<u64>) -> Option<u64> {
        expire
            .filter(|seconds| *seconds > 0)
            .or_else(|| self.namespace.expire_in_sec.filter(|seconds| *seconds > 0))
    }

    // =========================================================================
    // STRING OPERATIONS
    // =========================================================================

    /// Store `value` under `key` with the namespace's default TTL.
    pub async fn set<T: Serialize + Debug + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_result(key, value, SetOptions::default())
            .await
            .map(drop)
    }

    pub async fn set_with<T: Serialize + Debug + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<()> {
        self.set_with_result(key, value, options).await.map(drop)
    }

    /// Like [`set_with`](Self::set_with), reporting whether the write happened.
    pub async fn set_with_result<T: Serialize + Debug + ?Sized>(
        &self,
        key: &str,
        value: &T,
        options: SetOptions,
    ) -> Result<bool> {
        logged("set", (key, value, &options), async {
            let raw = codec::encode(value)?;
            let expire = self.effective_expire(options.expire);
            self.adapter()?
                .set(
                    &self.prefixed_key(key),
                    &raw,
                    expire,
                    options.namespace.as_deref(),
                    options.nx,
                )
                .await
        })
        .await
    }

    /// Value at `key`, or `None` when absent or expired.
    pub async fn get<T: DeserializeOwned + Debug>(&self, key: &str) -> Result<Option<T>> {
        logged("get", (key,), async {
            let raw = self.adapter()?.get(&self.prefixed_key(key), None).await?;
            codec::decode_opt(raw)
        })
        .await
    }

    /// Add `amount`; an absent key is initialised to `amount`.
    pub async fn incr(&self, key: &str, amount: i64) -> Result<i64> {
        logged("incr", (key, amount), async {
            self.adapter()?.incr(&self.prefixed_key(key), amount).await
        })
        .await
    }

    /// Subtract `amount`; an absent key is initialised to `-amount`.
    pub async fn decr(&self, key: &str, amount: i64) -> Result<i64> {
        logged("decr", (key, amount), async {
            self.adapter()?.decr(&self.prefixed_key(key), amount).await
        })
        .await
    }

    /// Write only if `key` is absent.
    pub async fn setnx<T: Serialize + Debug + ?Sized>(&self, key: &str, value: &T) -> Result<bool> {
        logged("setnx", (key, value), async {
            let raw = codec::encode(value)?;
            self.adapter()?.setnx(&self.prefixed_key(key), &raw).await
        })
        .await
    }

    pub async fn mset<K, V>(&self, entries: &[(K, V)]) -> Result<()>
    where
        K: AsRef<str> + Debug,
        V: Serialize + Debug,
    {
        logged("mset", (entries,), async {
            let encoded = self.encode_entries(entries)?;
            self.adapter()?.mset(&encoded).await
        })
        .await
    }

    /// Values aligned with `keys`; missing keys yield `None`.
    pub async fn mget<K, T>(&self, keys: &[K]) -> Result<Vec<Option<T>>>
    where
        K: AsRef<str> + Debug,
        T: DeserializeOwned + Debug,
    {
        logged("mget", (keys,), async {
            let raw = self.adapter()?.mget(&self.prefixed_keys(keys)).await?;
            raw.into_iter().map(codec::decode_opt::<T>).collect()
        })
        .await
    }

    /// Set every entry with one TTL in a single pipelined batch.
    ///
    /// Batches larger than the namespace limit are refused before anything
    /// is sent; split them and call again.
    pub async fn mset_with_expire<K, V>(&self, entries: &[(K, V)], expire: Option<u64>) -> Result<()>
    where
        K: AsRef<str> + Debug,
        V: Serialize + Debug,
    {
        logged("mset_with_expire", (entries, expire), async {
            let limit = self.namespace.mset_with_expire_max_keys;
            if entries.len() > limit {
                return Err(CacheError::BatchTooLarge {
                    count: entries.len(),
                    limit,
                });
            }
            let encoded = self.encode_entries(entries)?;
            self.adapter()?
                .mset_with_expire(&encoded, self.effective_expire(expire))
                .await
        })
        .await
    }

    // =========================================================================
    // HASH OPERATIONS
    // =========================================================================

    /// Set hash fields; returns how many fields were new.
    pub async fn hset<F, V>(&self, key: &str, fields: &[(F, V)]) -> Result<i64>
    where
        F: AsRef<str> + Debug,
        V: Serialize + Debug,
    {
        logged("hset", (key, fields), async {
            let encoded = fields
                .iter()
                .map(|(field, value)| Ok((field.as_ref().to_string(), codec::encode(value)?)))
                .collect::<Result<Vec<_>>>()?;
            self.adapter()?.hset(&self.prefixed_key(key), &encoded).await
        })
        .await
    }

    pub async fn hget<T: DeserializeOwned + Debug>(&self, key: &str, field: &str) -> Result<Option<T>> {
        logged("hget", (key, field), async {
            let raw = self.adapter()?.hget(&self.prefixed_key(key), field).await?;
            codec::decode_opt(raw)
        })
        .await
    }

    pub async fn hdel<F: AsRef<str> + Debug>(&self, key: &str, fields: &[F]) -> Result<i64> {
        logged("hdel", (key, fields), async {
            let fields: Vec<String> = fields.iter().map(|f| f.as_ref().to_string()).collect();
            self.adapter()?.hdel(&self.prefixed_key(key), &fields).await
        })
        .await
    }

    /// Every field of the hash, decoded. Empty when the key is absent.
    pub async fn hgetall<T: DeserializeOwned + Debug>(&self, key: &str) -> Result<HashMap<String, T>> {
        logged("hgetall", (key,), async {
            let raw = self.adapter()?.hgetall(&self.prefixed_key(key)).await?;
            raw.into_iter()
                .map(|(field, value)| Ok((field, codec::decode(&value)?)))
                .collect()
        })
        .await
    }

    pub async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        logged("hincrby", (key, field, delta), async {
            self.adapter()?
                .hincrby(&self.prefixed_key(key), field, delta)
                .await
        })
        .await
    }

    pub async fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        logged("hkeys", (key,), async {
            self.adapter()?.hkeys(&self.prefixed_key(key)).await
        })
        .await
    }

    // =========================================================================
    // LIST OPERATIONS
    // =========================================================================

    /// Push onto the head in order; `[a, b, c]` reads back as `[c, b, a]`.
    pub async fn lpush<T: Serialize + Debug>(&self, key: &str, values: &[T]) -> Result<i64> {
        logged("lpush", (key, values), async {
            let encoded = codec::encode_all(values)?;
            self.adapter()?.lpush(&self.prefixed_key(key), &encoded).await
        })
        .await
    }

    /// Push onto the tail in order.
    pub async fn rpush<T: Serialize + Debug>(&self, key: &str, values: &[T]) -> Result<i64> {
        logged("rpush", (key, values), async {
            let encoded = codec::encode_all(values)?;
            self.adapter()?.rpush(&self.prefixed_key(key), &encoded).await
        })
        .await
    }

    pub async fn lpop<T: DeserializeOwned + Debug>(&self, key: &str) -> Result<Option<T>> {
        logged("lpop", (key,), async {
            let raw = self.adapter()?.lpop(&self.prefixed_key(key)).await?;
            codec::decode_opt(raw)
        })
        .await
    }

    /// Blocking tail pop across lists. Returns the caller-facing key with the value.
    pub async fn brpop<K, T>(&self, keys: &[K], timeout_secs: f64) -> Result<Option<(String, T)>>
    where
        K: AsRef<str> + Debug,
        T: DeserializeOwned + Debug,
    {
        logged("brpop", (keys, timeout_secs), async {
            let popped = self
                .adapter()?
                .brpop(&self.prefixed_keys(keys), timeout_secs)
                .await?;
            let base = self.prefixed_key("");
            popped
                .map(|(key, raw)| -> Result<(String, T)> {
                    let user_key = key.strip_prefix(base.as_str()).unwrap_or(&key).to_string();
                    Ok((user_key, codec::decode(&raw)?))
                })
                .transpose()
        })
        .await
    }

    /// Inclusive slice; negative indices count from the tail.
    pub async fn lrange<T: DeserializeOwned + Debug>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<T>> {
        logged("lrange", (key, start, stop), async {
            let raw = self.adapter()?.lrange(&self.prefixed_key(key), start, stop).await?;
            codec::decode_all(raw)
        })
        .await
    }

    // =========================================================================
    // SET OPERATIONS
    // =========================================================================

    /// Add members one command at a time; returns how many were new.
    pub async fn sadd<T: Serialize + Debug>(&self, key: &str, values: &[T]) -> Result<i64> {
        logged("sadd", (key, values), async {
            let adapter = self.adapter()?;
            let key = self.prefixed_key(key);
            let mut added = 0;
            for value in values {
                added += adapter.sadd(&key, &codec::encode(value)?, None).await?;
            }
            Ok(added)
        })
        .await
    }

    pub async fn members_in_set<T: DeserializeOwned + Debug>(
        &self,
        key: &str,
        namespace: Option<&str>,
    ) -> Result<Vec<T>> {
        logged("members_in_set", (key, namespace), async {
            let raw = self
                .adapter()?
                .smembers(&self.prefixed_key(key), namespace)
                .await?;
            codec::decode_all(raw)
        })
        .await
    }

    pub async fn is_value_in_set<T: Serialize + Debug + ?Sized>(
        &self,
        key: &str,
        value: &T,
        namespace: Option<&str>,
    ) -> Result<bool> {
        logged("is_value_in_set", (key, value, namespace), async {
            let raw = codec::encode(value)?;
            self.adapter()?
                .sismember(&self.prefixed_key(key), &raw, namespace)
                .await
        })
        .await
    }

    /// Remove and return up to `count` random members (one when `None`).
    pub async fn spop<T: DeserializeOwned + Debug>(&self, key: &str, count: Option<usize>) -> Result<Vec<T>> {
        logged("spop", (key, count), async {
            let raw = self.adapter()?.spop(&self.prefixed_key(key), count).await?;
            codec::decode_all(raw)
        })
        .await
    }

    // =========================================================================
    // SORTED SET OPERATIONS
    // =========================================================================

    /// Add members or update their scores; returns how many were new.
    pub async fn zadd<M: Serialize + Debug>(&self, key: &str, members: &[(M, f64)]) -> Result<i64> {
        logged("zadd", (key, members), async {
            let encoded = members
                .iter()
                .map(|(member, score)| Ok((codec::encode(member)?, *score)))
                .collect::<Result<Vec<_>>>()?;
            self.adapter()?.zadd(&self.prefixed_key(key), &encoded).await
        })
        .await
    }

    /// Members between ranks `start` and `stop`, ascending by score.
    pub async fn zrange<M: DeserializeOwned + Debug>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<M>> {
        logged("zrange", (key, start, stop), async {
            let raw = self.adapter()?.zrange(&self.prefixed_key(key), start, stop).await?;
            codec::decode_all(raw)
        })
        .await
    }

    pub async fn zrange_with_scores<M: DeserializeOwned + Debug>(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<(M, f64)>> {
        logged("zrange_with_scores", (key, start, stop), async {
            let raw = self
                .adapter()?
                .zrange_withscores(&self.prefixed_key(key), start, stop)
                .await?;
            decode_scored(raw)
        })
        .await
    }

    /// Pop up to `count` (default one) lowest-scored members.
    pub async fn zpopmin<M: DeserializeOwned + Debug>(
        &self,
        key: &str,
        count: Option<usize>,
    ) -> Result<Vec<(M, f64)>> {
        logged("zpopmin", (key, count), async {
            let raw = self.adapter()?.zpopmin(&self.prefixed_key(key), count).await?;
            decode_scored(raw)
        })
        .await
    }

    /// Pop up to `count` (default one) highest-scored members.
    pub async fn zpopmax<M: DeserializeOwned + Debug>(
        &self,
        key: &str,
        count: Option<usize>,
    ) -> Result<Vec<(M, f64)>> {
        logged("zpopmax", (key, count), async {
            let raw = self.adapter()?.zpopmax(&self.prefixed_key(key), count).await?;
            decode_scored(raw)
        })
        .await
    }

    // =========================================================================
    // KEY MANAGEMENT
    // =========================================================================

    /// Delete keys; absent ones are skipped. Returns how many were removed.
    pub async fn delete<K: AsRef<str> + Debug>(&self, keys: &[K]) -> Result<i64> {
        logged("delete", (keys,), async {
            self.adapter()?.delete(&self.prefixed_keys(keys)).await
        })
        .await
    }

    /// Physical keys starting with `pattern` inside this namespace.
    ///
    /// `keys("*")` lists the whole namespace.
    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        logged("keys", (pattern,), async {
            let glob = format!("{}*", self.prefixed_key(pattern));
            self.adapter()?.keys(&glob).await
        })
        .await
    }

    /// Delete every key of this namespace starting with `prefix`.
    pub async fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        logged("delete_by_prefix", (prefix,), async {
            self.adapter()?
                .delete_by_prefix(&self.prefixed_key(prefix))
                .await
        })
        .await
    }

    /// Delete every key of this namespace.
    pub async fn clear_namespace(&self) -> Result<usize> {
        logged("clear_namespace", (), async {
            self.adapter()?
                .clear_namespace(&self.prefixed_key(""))
                .await
        })
        .await
    }

    /// `true` when the key existed and now expires in `seconds`.
    pub async fn expire(&self, key: &str, seconds: i64) -> Result<bool> {
        logged("expire", (key, seconds), async {
            self.adapter()?.expire(&self.prefixed_key(key), seconds).await
        })
        .await
    }

    /// How many of `keys` exist.
    pub async fn exists<K: AsRef<str> + Debug>(&self, keys: &[K]) -> Result<i64> {
        logged("exists", (keys,), async {
            self.adapter()?.exists(&self.prefixed_keys(keys)).await
        })
        .await
    }

    pub async fn is_key_exist(&self, key: &str) -> Result<bool> {
        logged("is_key_exist", (key,), async {
            let found = self.adapter()?.exists(&[self.prefixed_key(key)]).await?;
            Ok(found > 0)
        })
        .await
    }

    // =========================================================================
    // SCRIPTING
    // =========================================================================

    /// Run a Lua script verbatim; keys and arguments are not prefixed.
    pub async fn eval(
        &self,
        script: &str,
        num_keys: usize,
        keys_and_args: &[String],
    ) -> Result<redis::Value> {
        logged("eval", (script, num_keys, keys_and_args), async {
            self.adapter()?.eval(script, num_keys, keys_and_args).await
        })
        .await
    }
}

fn decode_scored<M: DeserializeOwned>(raw: Vec<(String, f64)>) -> Result<Vec<(M, f64)>> {
    raw.into_iter()
        .map(|(member, score)| Ok((codec::decode(&member)?, score)))
        .collect()
}
