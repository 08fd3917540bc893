//! Live Redis connection over a multiplexed `ConnectionManager`.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisResult};
use std::collections::HashMap;

use super::Connection;

/// Redis connection shared by all in-flight calls of one adapter.
///
/// The manager multiplexes requests over one socket and reconnects on its
/// own; each call clones the cheap handle.
#[derive(Clone)]
pub struct RedisConnection {
    conn: ConnectionManager,
}

impl RedisConnection {
    /// Open a connection to `url` (`redis://host:port`).
    pub async fn connect(url: &str) -> RedisResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

}

#[async_trait]
impl Connection for RedisConnection {
    async fn set(
        &self,
        key: &str,
        value: &str,
        expire_secs: Option<u64>,
        nx: bool,
    ) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(seconds) = expire_secs {
            cmd.arg("EX").arg(seconds);
        }
        if nx {
            cmd.arg("NX");
        }
        // Nil reply means NX blocked the write.
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        conn.incr(key, delta).await
    }

    async fn decr_by(&self, key: &str, delta: i64) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        conn.decr(key, delta).await
    }

    async fn mset(&self, entries: &[(String, String)]) -> RedisResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("MSET");
        for (key, value) in entries {
            cmd.arg(key).arg(value);
        }
        cmd.query_async(&mut conn).await
    }

    async fn mget(&self, keys: &[String]) -> RedisResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("MGET");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut conn).await
    }

    async fn mset_with_expire(
        &self,
        entries: &[(String, String)],
        expire_secs: Option<u64>,
    ) -> RedisResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            let set = pipe.cmd("SET").arg(key).arg(value);
            if let Some(seconds) = expire_secs {
                set.arg("EX").arg(seconds);
            }
            set.ignore();
        }
        pipe.query_async(&mut conn).await
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> RedisResult<i64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(field).arg(value);
        }
        cmd.query_async(&mut conn).await
    }

    async fn hget(&self, key: &str, field: &str) -> RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        conn.hget(key, field).await
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> RedisResult<i64> {
        if fields.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(key);
        for field in fields {
            cmd.arg(field);
        }
        cmd.query_async(&mut conn).await
    }

    async fn hgetall(&self, key: &str) -> RedisResult<HashMap<String, String>> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await
    }

    async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        conn.hincr(key, field, delta).await
    }

    async fn hkeys(&self, key: &str) -> RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.hkeys(key).await
    }

    async fn lpush(&self, key: &str, values: &[String]) -> RedisResult<i64> {
        push(self.conn.clone(), "LPUSH", key, values).await
    }

    async fn rpush(&self, key: &str, values: &[String]) -> RedisResult<i64> {
        push(self.conn.clone(), "RPUSH", key, values).await
    }

    async fn lpop(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.conn.clone();
        let popped: Option<String> = redis::cmd("LPOP").arg(key).query_async(&mut conn).await?;
        Ok(popped)
    }

    async fn brpop(
        &self,
        keys: &[String],
        timeout_secs: f64,
    ) -> RedisResult<Option<(String, String)>> {
        if keys.is_empty() {
            return Ok(None);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("BRPOP");
        for key in keys {
            cmd.arg(key);
        }
        cmd.arg(timeout_secs);
        cmd.query_async(&mut conn).await
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.lrange(key, start, stop).await
    }

    async fn sadd(&self, key: &str, member: &str) -> RedisResult<i64> {
        let mut conn = self.conn.clone();
        conn.sadd(key, member).await
    }

    async fn smembers(&self, key: &str) -> RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await
    }

    async fn sismember(&self, key: &str, member: &str) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        conn.sismember(key, member).await
    }

    async fn spop(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        match count {
            Some(count) => {
                let popped: Vec<String> = redis::cmd("SPOP")
                    .arg(key)
                    .arg(count)
                    .query_async(&mut conn)
                    .await?;
                Ok(popped)
            }
            None => {
                let popped: Option<String> =
                    redis::cmd("SPOP").arg(key).query_async(&mut conn).await?;
                Ok(popped.into_iter().collect())
            }
        }
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> RedisResult<i64> {
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("ZADD");
        cmd.arg(key);
        for (member, score) in members {
            cmd.arg(*score).arg(member);
        }
        cmd.query_async(&mut conn).await
    }

    async fn zrange(&self, key: &str, start: isize, stop: isize) -> RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.zrange(key, start, stop).await
    }

    async fn zrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> RedisResult<Vec<(String, f64)>> {
        let mut conn = self.conn.clone();
        conn.zrange_withscores(key, start, stop).await
    }

    async fn zpopmin(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<(String, f64)>> {
        zpop(self.conn.clone(), "ZPOPMIN", key, count).await
    }

    async fn zpopmax(&self, key: &str, count: Option<usize>) -> RedisResult<Vec<(String, f64)>> {
        zpop(self.conn.clone(), "ZPOPMAX", key, count).await
    }

    async fn del(&self, keys: &[String]) -> RedisResult<i64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        conn.del(keys).await
    }

    async fn keys(&self, pattern: &str) -> RedisResult<Vec<String>> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await
    }

    async fn expire(&self, key: &str, seconds: i64) -> RedisResult<bool> {
        let mut conn = self.conn.clone();
        conn.expire(key, seconds).await
    }

    async fn exists(&self, keys: &[String]) -> RedisResult<i64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("EXISTS");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async(&mut conn).await
    }

    async fn eval(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> RedisResult<redis::Value> {
        let mut conn = self.conn.clone();
        eval_cmd(script, keys, args).query_async(&mut conn).await
    }
}

async fn push(
    mut conn: ConnectionManager,
    command: &str,
    key: &str,
    values: &[String],
) -> RedisResult<i64> {
    if values.is_empty() {
        // Length is unchanged; LLEN answers without mutating.
        let len: i64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        return Ok(len);
    }
    let mut cmd = redis::cmd(command);
    cmd.arg(key);
    for value in values {
        cmd.arg(value);
    }
    cmd.query_async(&mut conn).await
}

async fn zpop(
    mut conn: ConnectionManager,
    command: &str,
    key: &str,
    count: Option<usize>,
) -> RedisResult<Vec<(String, f64)>> {
    let mut cmd = redis::cmd(command);
    cmd.arg(key);
    if let Some(count) = count {
        cmd.arg(count);
    }
    cmd.query_async(&mut conn).await
}

/// `EVAL script numkeys key.. arg..`
fn eval_cmd(script: &str, keys: &[String], args: &[String]) -> redis::Cmd {
    let mut cmd = redis::cmd("EVAL");
    cmd.arg(script).arg(keys.len());
    for key in keys {
        cmd.arg(key);
    }
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_frames_keys_before_args() {
        let keys = vec!["k1".to_string(), "k2".to_string()];
        let args = vec!["a".to_string()];
        let packed = eval_cmd("return KEYS[1]", &keys, &args).get_packed_command();
        assert_eq!(
            String::from_utf8(packed).unwrap(),
            "*6\r\n$4\r\nEVAL\r\n$14\r\nreturn KEYS[1]\r\n$1\r\n2\r\n\
             $2\r\nk1\r\n$2\r\nk2\r\n$1\r\na\r\n"
        );
    }

    #[test]
    fn test_eval_without_keys_sends_zero() {
        let args = vec!["x".to_string()];
        let packed = eval_cmd("return ARGV[1]", &[], &args).get_packed_command();
        assert_eq!(
            String::from_utf8(packed).unwrap(),
            "*4\r\n$4\r\nEVAL\r\n$14\r\nreturn ARGV[1]\r\n$1\r\n0\r\n$1\r\nx\r\n"
        );
    }
}
