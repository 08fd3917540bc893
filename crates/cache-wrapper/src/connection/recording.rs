//! Connection that records `EVAL` calls and answers with a canned reply.
//! Every other command fails with a client error.

use async_trait::async_trait;
use redis::{ErrorKind, RedisError, RedisResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{Connection, SharedConnection};

/// `(script, keys, args)` as received.
pub type ScriptCall = (String, Vec<String>, Vec<String>);

#[derive(Debug)]
pub struct ScriptRecorder {
    reply: redis::Value,
    calls: Mutex<Vec<ScriptCall>>,
}

impl ScriptRecorder {
    pub fn new(reply: redis::Value) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn shared(self: &Arc<Self>) -> SharedConnection {
        self.clone()
    }

    pub fn calls(&self) -> Vec<ScriptCall> {
        self.calls.lock().unwrap().clone()
    }
}

fn unsupported<T>() -> RedisResult<T> {
    Err(RedisError::from((ErrorKind::ClientError, "only EVAL is recorded")))
}

#[async_trait]
impl Connection for ScriptRecorder {
    async fn set(&self, _: &str, _: &str, _: Option<u64>, _: bool) -> RedisResult<bool> {
        unsupported()
    }

    async fn get(&self, _: &str) -> RedisResult<Option<String>> {
        unsupported()
    }

    async fn incr_by(&self, _: &str, _: i64) -> RedisResult<i64> {
        unsupported()
    }

    async fn decr_by(&self, _: &str, _: i64) -> RedisResult<i64> {
        unsupported()
    }

    async fn mset(&self, _: &[(String, String)]) -> RedisResult<()> {
        unsupported()
    }

    async fn mget(&self, _: &[String]) -> RedisResult<Vec<Option<String>>> {
        unsupported()
    }

    async fn mset_with_expire(&self, _: &[(String, String)], _: Option<u64>) -> RedisResult<()> {
        unsupported()
    }

    async fn hset(&self, _: &str, _: &[(String, String)]) -> RedisResult<i64> {
        unsupported()
    }

    async fn hget(&self, _: &str, _: &str) -> RedisResult<Option<String>> {
        unsupported()
    }

    async fn hdel(&self, _: &str, _: &[String]) -> RedisResult<i64> {
        unsupported()
    }

    async fn hgetall(&self, _: &str) -> RedisResult<HashMap<String, String>> {
        unsupported()
    }

    async fn hincr_by(&self, _: &str, _: &str, _: i64) -> RedisResult<i64> {
        unsupported()
    }

    async fn hkeys(&self, _: &str) -> RedisResult<Vec<String>> {
        unsupported()
    }

    async fn lpush(&self, _: &str, _: &[String]) -> RedisResult<i64> {
        unsupported()
    }

    async fn rpush(&self, _: &str, _: &[String]) -> RedisResult<i64> {
        unsupported()
    }

    async fn lpop(&self, _: &str) -> RedisResult<Option<String>> {
        unsupported()
    }

    async fn brpop(&self, _: &[String], _: f64) -> RedisResult<Option<(String, String)>> {
        unsupported()
    }

    async fn lrange(&self, _: &str, _: isize, _: isize) -> RedisResult<Vec<String>> {
        unsupported()
    }

    async fn sadd(&self, _: &str, _: &str) -> RedisResult<i64> {
        unsupported()
    }

    async fn smembers(&self, _: &str) -> RedisResult<Vec<String>> {
        unsupported()
    }

    async fn sismember(&self, _: &str, _: &str) -> RedisResult<bool> {
        unsupported()
    }

    async fn spop(&self, _: &str, _: Option<usize>) -> RedisResult<Vec<String>> {
        unsupported()
    }

    async fn zadd(&self, _: &str, _: &[(String, f64)]) -> RedisResult<i64> {
        unsupported()
    }

    async fn zrange(&self, _: &str, _: isize, _: isize) -> RedisResult<Vec<String>> {
        unsupported()
    }

    async fn zrange_withscores(
        &self,
        _: &str,
        _: isize,
        _: isize,
    ) -> RedisResult<Vec<(String, f64)>> {
        unsupported()
    }

    async fn zpopmin(&self, _: &str, _: Option<usize>) -> RedisResult<Vec<(String, f64)>> {
        unsupported()
    }

    async fn zpopmax(&self, _: &str, _: Option<usize>) -> RedisResult<Vec<(String, f64)>> {
        unsupported()
    }

    async fn del(&self, _: &[String]) -> RedisResult<i64> {
        unsupported()
    }

    async fn keys(&self, _: &str) -> RedisResult<Vec<String>> {
        unsupported()
    }

    async fn expire(&self, _: &str, _: i64) -> RedisResult<bool> {
        unsupported()
    }

    async fn exists(&self, _: &[String]) -> RedisResult<i64> {
        unsupported()
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<redis::Value> {
        self.calls
            .lock()
            .unwrap()
            .push((script.to_string(), keys.to_vec(), args.to_vec()));
        Ok(self.reply.clone())
    }
}
