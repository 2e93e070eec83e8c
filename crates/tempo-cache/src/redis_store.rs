//! Redis implementation of [`KeyValueStore`].

use crate::connection::{RedisConnection, with_timeout};
use async_trait::async_trait;
use redis::{FromRedisValue, Script};
use std::sync::Arc;
use tempo_core::ports::KeyValueStore;
use tempo_core::{Error, Result};

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Key/value store over the shared Redis connection.
///
/// Every command runs under the connection's command timeout so a stalled
/// server fails the caller instead of hanging it.
#[derive(Clone)]
pub struct RedisStore {
    connection: Arc<RedisConnection>,
    compare_and_delete: Script,
}

impl RedisStore {
    pub fn new(connection: Arc<RedisConnection>) -> Self {
        Self {
            connection,
            compare_and_delete: Script::new(COMPARE_AND_DELETE),
        }
    }

    pub fn connection(&self) -> &Arc<RedisConnection> {
        &self.connection
    }

    async fn query<T: FromRedisValue>(&self, operation: &str, cmd: redis::Cmd) -> Result<T> {
        let mut conn = self.connection.connect().await?;
        with_timeout(
            operation,
            self.connection.command_timeout(),
            cmd.query_async::<T>(&mut conn),
        )
        .await
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.query("GET", redis::cmd("GET").arg(key).clone()).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<()> {
        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .clone();
        self.query("SET", cmd).await
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: u64) -> Result<bool> {
        let cmd = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .clone();
        let reply: Option<String> = self.query("SET NX", cmd).await?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: i64 = self.query("DEL", redis::cmd("DEL").arg(key).clone()).await?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.connection.connect().await?;
        let mut invocation = self.compare_and_delete.prepare_invoke();
        invocation.key(key).arg(expected);
        let removed: i64 = with_timeout(
            "compare-and-delete",
            self.connection.command_timeout(),
            invocation.invoke_async(&mut conn),
        )
        .await?;
        Ok(removed > 0)
    }

    async fn increment(&self, key: &str) -> Result<i64> {
        self.query("INCR", redis::cmd("INCR").arg(key).clone()).await
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool> {
        let applied: i64 = self
            .query("EXPIRE", redis::cmd("EXPIRE").arg(key).arg(ttl_secs).clone())
            .await?;
        Ok(applied == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>> {
        // -2: missing, -1: no expiry.
        let remaining: i64 = self.query("TTL", redis::cmd("TTL").arg(key).clone()).await?;
        Ok(u64::try_from(remaining).ok())
    }

    async fn ping(&self) -> Result<()> {
        let reply: String = self.query("PING", redis::cmd("PING")).await?;
        if reply.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(Error::Store(format!("unexpected PING reply: {reply}")))
        }
    }
}
