//! # In-Memory Connection
//!
//! Process-local emulation of the Redis commands behind [`Connection`].
//! Replies and failures mirror a real server closely enough for the cache
//! facade to be exercised without one: WRONGTYPE surfaces as
//! `ErrorKind::TypeError`, bad counters as `ErrorKind::ResponseError`.
//!
//! Expiry runs on `tokio::time::Instant`, so paused-clock tests can
//! advance past a TTL without sleeping. Scripting is not emulated.

use async_trait::async_trait;
use redis::{ErrorKind, RedisError, RedisResult};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::{glob, Connection, SharedConnection};

const BRPOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
    Set(HashSet<String>),
    ZSet(HashMap<String, f64>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Self::Str(_) => false,
            Self::Hash(h) => h.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::ZSet(z) => z.is_empty(),
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    const fn persistent(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type() -> RedisError {
    RedisError::from((
        ErrorKind::TypeError,
        "WRONGTYPE Operation against a key holding the wrong kind of value",
    ))
}

fn not_integer() -> RedisError {
    RedisError::from((ErrorKind::ResponseError, "ERR value is not an integer or out of range"))
}

fn overflow() -> RedisError {
    RedisError::from((ErrorKind::ResponseError, "ERR increment or decrement would overflow"))
}

fn checked_expiry(expire_secs: Option<u64>, now: Instant) -> RedisResult<Option<Instant>> {
    match expire_secs {
        Some(0) => Err(RedisError::from((
            ErrorKind::ResponseError,
            "ERR invalid expire time in 'set' command",
        ))),
        Some(seconds) => Ok(Some(now + Duration::from_secs(seconds))),
        None => Ok(None),
    }
}

/// Resolve Redis-style inclusive `start..=stop` over `len` items.
fn slice_bounds(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).unwrap_or(isize::MAX);
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

fn by_score(members: &HashMap<String, f64>) -> Vec<(String, f64)> {
    let mut sorted: Vec<(String, f64)> =
        members.iter().map(|(m, s)| (m.clone(), *s)).collect();
    sorted.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    sorted
}

macro_rules! typed_read {
    ($read:ident, $variant:ident, $ty:ty) => {
        fn $read(&mut self, key: &str) -> RedisResult<Option<&mut $ty>> {
            match self.live(key) {
                None => Ok(None),
                Some(Entry {
                    value: Value::$variant(inner),
                    ..
                }) => Ok(Some(inner)),
                Some(_) => Err(wrong_type()),
            }
        }
    };
}

/// Writer that creates an empty container when the key is absent.
macro_rules! typed_write {
    ($write:ident, $variant:ident, $ty:ty) => {
        fn $write(&mut self, key: &str) -> RedisResult<&mut $ty> {
            self.live(key);
            let entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::persistent(Value::$variant(<$ty>::default())));
            match &mut entry.value {
                Value::$variant(inner) => Ok(inner),
                _ => Err(wrong_type()),
            }
        }
    };
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<String, Entry>,
}

impl Store {
    /// Entry for `key`, evicting it first if its TTL has passed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));
    }

    fn drop_if_empty(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    typed_read!(string, Str, String);
    typed_read!(hash, Hash, HashMap<String, String>);
    typed_read!(list, List, VecDeque<String>);
    typed_read!(set, Set, HashSet<String>);
    typed_read!(zset, ZSet, HashMap<String, f64>);

    typed_write!(hash_mut, Hash, HashMap<String, String>);
    typed_write!(list_mut, List, VecDeque<String>);
    typed_write!(set_mut, Set, HashSet<String>);
    typed_write!(zset_mut, ZSet, HashMap<String, f64>);

    fn put_string(&mut self, key: &str, value: &str, expires_at: Option<Instant>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at,
            },
        );
    }

    fn incr_by(&mut self, key: &str, delta: i64) -> RedisResult<i64> {
        match self.live(key) {
            None => {
                self.put_string(key, &delta.to_string(), None);
                Ok(delta)
            }
            Some(Entry {
                value: Value::Str(raw),
                ..
            }) => {
                let current: i64 = raw.parse().map_err(|_| not_integer())?;
                let next = current.checked_add(delta).ok_or_else(overflow)?;
                *raw = next.to_string();
                Ok(next)
            }
            Some(_) => Err(wrong_type()),
        }
    }

    fn zpop(&mut self, key: &str, count: Option<usize>, highest: bool) -> RedisResult<Vec<(String, f64)>> {
        let Some(zset) = self.zset(key)? else {
            return Ok(Vec::new());
        };
        let mut ordered = by_score(zset);
        if highest {
            ordered.reverse();
        }
        ordered.truncate(count.unwrap_or(1));
        for (member, _) in &ordered {
            zset.remove(member);
        }
        self.drop_if_empty(key);
        Ok(ordered)
    }
}

/// In-process stand-in for a Redis server.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    store: Mutex<Store>,
}

impl MemoryConnection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh emulator behind a shareable handle.
    #[must_use]
    pub fn shared() -> SharedConnection {
        Arc::new(Self::new())
    }

    /// Number of live keys.
    pub async fn dbsize(&self) -> usize {
        let mut store = self.store.lock().await;
        store.purge_expired();
        store.entries.len()
    }

    /// Remaining TTL of `key`; `None` when absent or persistent.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let mut store = self.store.lock().await;
        let expires_at = store.live(key)?.expires_at?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }
}

#[async_trait]
impl Connection for MemoryConnection {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expire_secs: Option<u64>,
        nx: bool,
    ) -> RedisResult<bool> {
        let mut store = self.store.lock().await;
        let expires_at = checked_expiry(expire_secs, Instant::now())?;
        if nx && store.live(key).is_some() {
            return Ok(false);
        }
        store.put_string(key, value, expires_at);
        Ok(true)
    }

    async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut store = self.store.lock().await;
        Ok(store.string(key)?.cloned())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> RedisResult<i64> {
        self.store.lock().await.incr_by(key, delta)
    }

    async fn decr_by(&self, key: &str, delta: i64) -> RedisResult<i64> {
        let delta = delta.checked_neg().ok_or_else(overflow)?;
        self.store.lock().await.incr_by(key, delta)
    }

    async fn mset(&self, entries: &[(String, String)]) -> RedisResult<()> {
        let mut store = self.store.lock().await;
        for (key, value) in entries {
            store.put_string(key, value, None);
        }
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> RedisResult<Vec<Option<String>>> {
        let mut store = self.store.lock().await;
        Ok(keys
            .iter()
            .map(|key| match store.live(key) {
                Some(Entry {
                    value: Value::Str(value),
                    ..
                }) => Some(value.clone()),
                _ => None,
            })
            .collect())
    }

    async fn mset_with_expire(
        &self,
        entries: &[(String, String)],
        expire_secs: Option<u64>,
    ) -> RedisResult<()> {
        let mut store = self.store.lock().await;
        let expires_at = checked_expiry(expire_secs, Instant::now())?;
        for (key, value) in entries {
            store.put_string(key, value, expires_at);
        }
        Ok(())
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> RedisResult<i64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut store = self.store.lock().await;
        let hash = store.hash_mut(key)?;
        let added = fields
            .iter()
            .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
            .count();
        Ok(i64::try_from(added).unwrap_or(i64::MAX))
    }

    async fn hget(&self, key: &str, field: &str) -> RedisResult<Option<String>> {
        let mut store = self.store.lock().await;
        Ok(store.hash(key)?.and_then(|hash| hash.get(field).cloned()))
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        let Some(hash) = store.hash(key)? else {
            return Ok(0);
        };
        let removed = fields.iter().filter(|field| hash.remove(*field).is_some()).count();
        store.drop_if_empty(key);
        Ok(i64::try_from(removed).unwrap_or(i64::MAX))
    }

    async fn hgetall(&self, key: &str) -> RedisResult<HashMap<String, String>> {
        let mut store = self.store.lock().await;
        Ok(store.hash(key)?.map(|hash| hash.clone()).unwrap_or_default())
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        let hash = store.hash_mut(key)?;
        let current = match hash.get(field) {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                RedisError::from((ErrorKind::ResponseError, "ERR hash value is not an integer"))
            })?,
            None => 0,
        };
        let next = current.checked_add(delta).ok_or_else(overflow)?;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    async fn hkeys(&self, key: &str) -> RedisResult<Vec<String>> {
        let mut store = self.store.lock().await;
        Ok(store
            .hash(key)?
            .map(|hash| hash.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn lpush(&self, key: &str, values: &[String]) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        if values.is_empty() {
            let len = store.list(key)?.map_or(0, |list| list.len());
            return Ok(i64::try_from(len).unwrap_or(i64::MAX));
        }
        let list = store.list_mut(key)?;
        for value in values {
            list.push_front(value.clone());
        }
        Ok(i64::try_from(list.len()).unwrap_or(i64::MAX))
    }

    async fn rpush(&self, key: &str, values: &[String]) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        if values.is_empty() {
            let len = store.list(key)?.map_or(0, |list| list.len());
            return Ok(i64::try_from(len).unwrap_or(i64::MAX));
        }
        let list = store.list_mut(key)?;
        list.extend(values.iter().cloned());
        Ok(i64::try_from(list.len()).unwrap_or(i64::MAX))
    }

    async fn lpop(&self, key: &str) -> RedisResult<Option<String>> {
        let mut store = self.store.lock().await;
        let popped = store.list(key)?.and_then(VecDeque::pop_front);
        store.drop_if_empty(key);
        Ok(popped)
    }

    async fn brpop(
        &self,
        keys: &[String],
        timeout_secs: f64,
    ) -> RedisResult<Option<(String, String)>> {
        if !timeout_secs.is_finite() || timeout_secs < 0.0 {
            return Err(RedisError::from((
                ErrorKind::ResponseError,
                "ERR timeout is negative",
            )));
        }
        let deadline =
            (timeout_secs > 0.0).then(|| Instant::now() + Duration::from_secs_f64(timeout_secs));

        loop {
            {
                let mut store = self.store.lock().await;
                for key in keys {
                    let popped = store.list(key)?.and_then(VecDeque::pop_back);
                    if let Some(value) = popped {
                        store.drop_if_empty(key);
                        return Ok(Some((key.clone(), value)));
                    }
                }
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                return Ok(None);
            }
            tokio::time::sleep(BRPOP_POLL_INTERVAL).await;
        }
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        let mut store = self.store.lock().await;
        let Some(list) = store.list(key)? else {
            return Ok(Vec::new());
        };
        Ok(slice_bounds(list.len(), start, stop)
            .map(|(from, to)| list.range(from..=to).cloned().collect())
            .unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        Ok(i64::from(store.set_mut(key)?.insert(member.to_string())))
    }

    async fn smembers(&self, key: &str) -> RedisResult<Vec<String>> {
        let mut store = self.store.lock().await;
        Ok(store
            .set(key)?
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn sismember(&self, key: &str, member: &str) -> RedisResult<bool> {
        let mut store = self.store.lock().await;
        Ok(store.set(key)?.is_some_and(|set| set.contains(member)))
    }

    async fn spop(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<String>> {
        let mut store = self.store.lock().await;
        let Some(set) = store.set(key)? else {
            return Ok(Vec::new());
        };
        let picked: Vec<String> = set.iter().take(count.unwrap_or(1)).cloned().collect();
        for member in &picked {
            set.remove(member);
        }
        store.drop_if_empty(key);
        Ok(picked)
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> RedisResult<i64> {
        if members.is_empty() {
            return Ok(0);
        }
        if members.iter().any(|(_, score)| score.is_nan()) {
            return Err(RedisError::from((
                ErrorKind::ResponseError,
                "ERR value is not a valid float",
            )));
        }
        let mut store = self.store.lock().await;
        let zset = store.zset_mut(key)?;
        let added = members
            .iter()
            .filter(|(member, score)| zset.insert(member.clone(), *score).is_none())
            .count();
        Ok(i64::try_from(added).unwrap_or(i64::MAX))
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        Ok(self
            .zrange_withscores(key, start, stop)
            .await?
            .into_iter()
            .map(|(member, _)| member)
            .collect())
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> RedisResult<Vec<(String, f64)>> {
        let mut store = self.store.lock().await;
        let Some(zset) = store.zset(key)? else {
            return Ok(Vec::new());
        };
        let ordered = by_score(zset);
        Ok(slice_bounds(ordered.len(), start, stop)
            .map(|(from, to)| ordered[from..=to].to_vec())
            .unwrap_or_default())
    }

    async fn zpopmin(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<(String, f64)>> {
        self.store.lock().await.zpop(key, count, false)
    }

    async fn zpopmax(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<(String, f64)>> {
        self.store.lock().await.zpop(key, count, true)
    }

    async fn del(&self, keys: &[String]) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        let mut removed = 0;
        for key in keys {
            if store.live(key).is_some() {
                store.entries.remove(key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> RedisResult<Vec<String>> {
        let mut store = self.store.lock().await;
        store.purge_expired();
        let mut found: Vec<String> = store
            .entries
            .keys()
            .filter(|key| glob::matches(pattern, key))
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }

    async fn expire(&self, key: &str, seconds: i64) -> RedisResult<bool> {
        let mut store = self.store.lock().await;
        let Some(entry) = store.live(key) else {
            return Ok(false);
        };
        match u64::try_from(seconds) {
            Ok(secs) if secs > 0 => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(secs));
            }
            // Non-positive TTL deletes immediately.
            _ => {
                store.entries.remove(key);
            }
        }
        Ok(true)
    }

    async fn exists(&self, keys: &[String]) -> RedisResult<i64> {
        let mut store = self.store.lock().await;
        let mut found = 0;
        for key in keys {
            if store.live(key).is_some() {
                found += 1;
            }
        }
        Ok(found)
    }

    async fn eval(
        &self,
        _script: &str,
        _keys: &[String],
        _args: &[String],
    ) -> RedisResult<redis::Value> {
        Err(RedisError::from((
            ErrorKind::ClientError,
            "EVAL is not supported by the in-memory connection",
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_slice_bounds() {
        assert_eq!(slice_bounds(3, 0, -1), Some((0, 2)));
        assert_eq!(slice_bounds(3, -2, -1), Some((1, 2)));
        assert_eq!(slice_bounds(3, 1, 100), Some((1, 2)));
        assert_eq!(slice_bounds(3, -100, 0), Some((0, 0)));
        assert_eq!(slice_bounds(3, 2, 1), None);
        assert_eq!(slice_bounds(3, 5, 10), None);
        assert_eq!(slice_bounds(0, 0, -1), None);
    }

    #[tokio::test]
    async fn test_set_nx_respects_existing_key() {
        let conn = MemoryConnection::new();
        assert!(conn.set("k", "1", None, false).await.unwrap());
        assert!(!conn.set("k", "2", None, true).await.unwrap());
        assert_eq!(conn.get("k").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_incr_on_missing_and_non_integer() {
        let conn = MemoryConnection::new();
        assert_eq!(conn.incr_by("counter", 5).await.unwrap(), 5);
        assert_eq!(conn.decr_by("other", 3).await.unwrap(), -3);

        conn.set("text", "\"abc\"", None, false).await.unwrap();
        let err = conn.incr_by("text", 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseError);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let conn = MemoryConnection::new();
        conn.sadd("members", "a").await.unwrap();
        let err = conn.lpush("members", &keys(&["x"])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeError);
        // A failed write must not clobber the existing set.
        assert!(conn.sismember("members", "a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_follows_tokio_clock() {
        let conn = MemoryConnection::new();
        conn.set("session", "x", Some(2), false).await.unwrap();
        assert!(conn.ttl("session").await.is_some());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(conn.get("session").await.unwrap(), None);
        assert_eq!(conn.dbsize().await, 0);
    }

    #[tokio::test]
    async fn test_set_rejects_zero_ttl() {
        let conn = MemoryConnection::new();
        assert!(conn.set("k", "v", Some(0), false).await.is_err());
        assert_eq!(conn.dbsize().await, 0);
    }

    #[tokio::test]
    async fn test_list_keys_removed_when_drained() {
        let conn = MemoryConnection::new();
        conn.rpush("queue", &keys(&["a"])).await.unwrap();
        assert_eq!(conn.lpop("queue").await.unwrap().as_deref(), Some("a"));
        assert_eq!(conn.exists(&keys(&["queue"])).await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_brpop_times_out_and_pops_tail() {
        let conn = MemoryConnection::new();
        let none = conn.brpop(&keys(&["q1", "q2"]), 1.0).await.unwrap();
        assert!(none.is_none());

        conn.rpush("q2", &keys(&["first", "last"])).await.unwrap();
        let popped = conn.brpop(&keys(&["q1", "q2"]), 1.0).await.unwrap();
        assert_eq!(popped, Some(("q2".to_string(), "last".to_string())));
    }

    #[tokio::test]
    async fn test_zpop_orders_ties_by_member() {
        let conn = MemoryConnection::new();
        let members = vec![("b".to_string(), 1.0), ("a".to_string(), 1.0), ("c".to_string(), 2.0)];
        assert_eq!(conn.zadd("z", &members).await.unwrap(), 3);

        let max = conn.zpopmax("z", Some(2)).await.unwrap();
        assert_eq!(max, vec![("c".to_string(), 2.0), ("b".to_string(), 1.0)]);
        let min = conn.zpopmin("z", None).await.unwrap();
        assert_eq!(min, vec![("a".to_string(), 1.0)]);
        assert_eq!(conn.dbsize().await, 0);
    }

    #[tokio::test]
    async fn test_expire_non_positive_deletes() {
        let conn = MemoryConnection::new();
        conn.set("k", "v", None, false).await.unwrap();
        assert!(conn.expire("k", 0).await.unwrap());
        assert!(!conn.expire("k", 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_eval_is_client_error() {
        let conn = MemoryConnection::new();
        let err = conn.eval("return 1", &[], &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientError);
    }
}
