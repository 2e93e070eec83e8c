//! Redis-backed durable job queue.
//!
//! Layout per queue `q`:
//!
//! - `tq:{q}:job:{id}` hash with name, payload, state, priority, attempts
//! - `tq:{q}:wait:{priority}` list per priority lane (LPUSH in, RPOP out)
//! - `tq:{q}:delayed` sorted set of retries scored by ready time (ms)
//! - `tq:{q}:active` sorted set of leased jobs scored by lease deadline (ms)
//!
//! Every state transition is a single Lua script so concurrent producers and
//! consumers never observe a half-applied transition.

use crate::config::QueueConfig;
use crate::metrics::QueueMetrics;
use async_trait::async_trait;
use redis::Script;
use std::sync::Arc;
use std::time::Duration;
use tempo_cache::RedisConnection;
use tempo_cache::connection::with_timeout;
use tempo_core::ids::JobId;
use tempo_core::job::{EnqueueRequest, FailOutcome, JobDelivery, JobHandle, JobState, Priority};
use tempo_core::ports::JobQueue;
use tempo_core::{Error, Result};
use tracing::debug;

const ENQUEUE: &str = r#"
local state = redis.call('HGET', KEYS[1], 'state')
if state == 'waiting' or state == 'delayed' or state == 'active' then
    return 0
end
redis.call('DEL', KEYS[1])
redis.call('HSET', KEYS[1],
    'name', ARGV[2], 'payload', ARGV[3], 'state', 'waiting',
    'priority', ARGV[4], 'attempts', 0, 'max_attempts', ARGV[5],
    'enqueued_at', ARGV[6])
redis.call('LPUSH', KEYS[2], ARGV[1])
return 1
"#;

// KEYS: delayed, active, then wait lanes highest priority first.
// ARGV: now_ms, lease_deadline_ms, job key prefix, wait key prefix, failed retention secs
const FETCH: &str = r#"
local now = tonumber(ARGV[1])

for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', now)) do
    redis.call('ZREM', KEYS[1], id)
    local jk = ARGV[3] .. id
    if redis.call('EXISTS', jk) == 1 then
        local prio = redis.call('HGET', jk, 'priority') or 'normal'
        redis.call('HSET', jk, 'state', 'waiting')
        redis.call('LPUSH', ARGV[4] .. prio, id)
    end
end

for _, id in ipairs(redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now)) do
    redis.call('ZREM', KEYS[2], id)
    local jk = ARGV[3] .. id
    if redis.call('EXISTS', jk) == 1 then
        local attempts = tonumber(redis.call('HGET', jk, 'attempts') or '0')
        local max = tonumber(redis.call('HGET', jk, 'max_attempts') or '1')
        if attempts >= max then
            redis.call('HSET', jk, 'state', 'failed', 'last_error', 'lease expired', 'finished_at', ARGV[1])
            redis.call('EXPIRE', jk, ARGV[5])
        else
            local prio = redis.call('HGET', jk, 'priority') or 'normal'
            redis.call('HSET', jk, 'state', 'waiting')
            redis.call('LPUSH', ARGV[4] .. prio, id)
        end
    end
end

for i = 3, #KEYS do
    while true do
        local id = redis.call('RPOP', KEYS[i])
        if not id then
            break
        end
        local jk = ARGV[3] .. id
        if redis.call('HGET', jk, 'state') == 'waiting' then
            local attempts = redis.call('HINCRBY', jk, 'attempts', 1)
            redis.call('HSET', jk, 'state', 'active')
            redis.call('ZADD', KEYS[2], ARGV[2], id)
            local f = redis.call('HMGET', jk, 'name', 'payload', 'max_attempts')
            return {id, f[1], f[2], attempts, tonumber(f[3])}
        end
    end
end
return false
"#;

// KEYS: active, job hash. ARGV: id, retention secs, now_ms
const COMPLETE: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
if redis.call('EXISTS', KEYS[2]) == 0 then
    return 0
end
redis.call('HSET', KEYS[2], 'state', 'completed', 'finished_at', ARGV[3])
redis.call('EXPIRE', KEYS[2], ARGV[2])
return 1
"#;

// KEYS: active, job hash, delayed. ARGV: id, reason, now_ms, backoff base ms, failed retention secs
// Returns -2 when the job is unknown, -1 when attempts are exhausted, else the retry delay in ms.
const FAIL: &str = r#"
redis.call('ZREM', KEYS[1], ARGV[1])
if redis.call('EXISTS', KEYS[2]) == 0 then
    return -2
end
local attempts = tonumber(redis.call('HGET', KEYS[2], 'attempts') or '0')
local max = tonumber(redis.call('HGET', KEYS[2], 'max_attempts') or '1')
redis.call('HSET', KEYS[2], 'last_error', ARGV[2])
if attempts >= max then
    redis.call('HSET', KEYS[2], 'state', 'failed', 'finished_at', ARGV[3])
    redis.call('EXPIRE', KEYS[2], ARGV[5])
    return -1
end
local exp = math.max(attempts - 1, 0)
if exp > 16 then
    exp = 16
end
local delay = math.floor(tonumber(ARGV[4]) * (2 ^ exp))
redis.call('HSET', KEYS[2], 'state', 'delayed')
redis.call('ZADD', KEYS[3], tonumber(ARGV[3]) + delay, ARGV[1])
return delay
"#;

/// Keys of one named queue.
struct QueueKeys {
    prefix: String,
}

impl QueueKeys {
    fn new(queue: &str) -> Self {
        Self {
            prefix: format!("tq:{}", tempo_cache::sanitize_key(queue)),
        }
    }

    fn job_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job(&self, id: &JobId) -> String {
        format!("{}{}", self.job_prefix(), id)
    }

    fn wait_prefix(&self) -> String {
        format!("{}:wait:", self.prefix)
    }

    fn wait(&self, priority: Priority) -> String {
        format!("{}{}", self.wait_prefix(), priority.as_str())
    }

    fn delayed(&self) -> String {
        format!("{}:delayed", self.prefix)
    }

    fn active(&self) -> String {
        format!("{}:active", self.prefix)
    }
}

type FetchedRow = (String, String, String, u32, u32);

/// Durable job queue over the shared Redis connection.
pub struct RedisJobQueue {
    connection: Arc<RedisConnection>,
    config: QueueConfig,
    metrics: Arc<QueueMetrics>,
    enqueue_script: Script,
    fetch_script: Script,
    complete_script: Script,
    fail_script: Script,
}

impl RedisJobQueue {
    pub fn new(connection: Arc<RedisConnection>, config: QueueConfig) -> Self {
        Self {
            connection,
            config,
            metrics: QueueMetrics::new(),
            enqueue_script: Script::new(ENQUEUE),
            fetch_script: Script::new(FETCH),
            complete_script: Script::new(COMPLETE),
            fail_script: Script::new(FAIL),
        }
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    async fn run<T: redis::FromRedisValue>(
        &self,
        operation: &str,
        invocation: &redis::ScriptInvocation<'_>,
    ) -> Result<T> {
        let mut conn = self.connection.connect().await?;
        with_timeout(
            operation,
            self.connection.command_timeout(),
            invocation.invoke_async(&mut conn),
        )
        .await
        .map_err(|e| match e {
            Error::Store(msg) => Error::Queue(msg),
            other => other,
        })
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, queue: &str, request: EnqueueRequest) -> Result<JobHandle> {
        let keys = QueueKeys::new(queue);
        let payload = serde_json::to_string(&request.payload)?;
        let max_attempts = request.max_attempts.unwrap_or(self.config.max_attempts).max(1);

        let mut invocation = self.enqueue_script.prepare_invoke();
        invocation
            .key(keys.job(&request.job_id))
            .key(keys.wait(request.priority))
            .arg(request.job_id.as_str())
            .arg(&request.name)
            .arg(payload)
            .arg(request.priority.as_str())
            .arg(max_attempts)
            .arg(now_ms());
        let created: i64 = self.run("enqueue", &invocation).await?;

        let duplicate = created == 0;
        self.metrics.record_enqueue(duplicate);
        debug!(queue, job_id = %request.job_id, duplicate, "Enqueued job");
        Ok(JobHandle {
            id: request.job_id,
            duplicate,
        })
    }

    async fn fetch(&self, queue: &str, lease: Duration) -> Result<Option<JobDelivery>> {
        let keys = QueueKeys::new(queue);
        let now = now_ms();
        let deadline = now + lease.as_millis() as i64;

        let mut invocation = self.fetch_script.prepare_invoke();
        invocation.key(keys.delayed()).key(keys.active());
        for priority in Priority::DESCENDING {
            invocation.key(keys.wait(priority));
        }
        invocation
            .arg(now)
            .arg(deadline)
            .arg(keys.job_prefix())
            .arg(keys.wait_prefix())
            .arg(self.config.failed_retention.as_secs());

        let row: Option<FetchedRow> = self.run("fetch", &invocation).await?;
        let Some((id, name, payload, attempt, max_attempts)) = row else {
            return Ok(None);
        };

        self.metrics.record_delivery();
        Ok(Some(JobDelivery {
            id: JobId::new(id),
            name,
            payload: serde_json::from_str(&payload)?,
            attempt,
            max_attempts,
        }))
    }

    async fn complete(&self, queue: &str, id: &JobId) -> Result<()> {
        let keys = QueueKeys::new(queue);
        let mut invocation = self.complete_script.prepare_invoke();
        invocation
            .key(keys.active())
            .key(keys.job(id))
            .arg(id.as_str())
            .arg(self.config.completed_retention.as_secs().max(1))
            .arg(now_ms());
        let found: i64 = self.run("complete", &invocation).await?;
        if found == 0 {
            return Err(Error::Queue(format!("job {id} not found")));
        }
        self.metrics.record_complete();
        Ok(())
    }

    async fn fail(&self, queue: &str, id: &JobId, reason: &str) -> Result<FailOutcome> {
        let keys = QueueKeys::new(queue);
        let mut invocation = self.fail_script.prepare_invoke();
        invocation
            .key(keys.active())
            .key(keys.job(id))
            .key(keys.delayed())
            .arg(id.as_str())
            .arg(reason)
            .arg(now_ms())
            .arg(self.config.backoff_base.as_millis() as u64)
            .arg(self.config.failed_retention.as_secs().max(1));
        let reply: i64 = self.run("fail", &invocation).await?;

        match reply {
            -2 => Err(Error::Queue(format!("job {id} not found"))),
            -1 => {
                self.metrics.record_failure();
                Ok(FailOutcome::Failed)
            }
            delay_ms => {
                self.metrics.record_retry();
                Ok(FailOutcome::Retrying {
                    delay: Duration::from_millis(delay_ms.max(0) as u64),
                })
            }
        }
    }

    async fn state(&self, queue: &str, id: &JobId) -> Result<Option<JobState>> {
        let keys = QueueKeys::new(queue);
        let mut conn = self.connection.connect().await?;
        let raw: Option<String> = with_timeout(
            "HGET",
            self.connection.command_timeout(),
            redis::cmd("HGET")
                .arg(keys.job(id))
                .arg("state")
                .query_async(&mut conn),
        )
        .await?;
        raw.map(|s| s.parse()).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_keys() {
        let keys = QueueKeys::new("insight-generation");
        let id = JobId::new("insight_a_2026-01-01_2026-01-31");
        assert_eq!(
            keys.job(&id),
            "tq:insight-generation:job:insight_a_2026-01-01_2026-01-31"
        );
        assert_eq!(keys.wait(Priority::High), "tq:insight-generation:wait:high");
        assert_eq!(keys.delayed(), "tq:insight-generation:delayed");
        assert_eq!(keys.active(), "tq:insight-generation:active");
    }

    #[test]
    fn test_queue_name_is_sanitized() {
        let keys = QueueKeys::new("a:b");
        assert_eq!(keys.active(), "tq:a_b:active");
    }
}
