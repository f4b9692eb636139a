//! Distributed sliding-window limiter backed by Redis.
//!
//! The whole check-and-record step runs as one Lua script inside Redis, so any
//! number of processes sharing the same store and key prefix enforce a single
//! exact window per identifier without client-side coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, info, trace};

use super::backend::Limiter;
use super::clock::{Clock, SystemClock};
use super::limit::{LimitConfig, Outcome};
use crate::error::{Result, ShieldError};

/// Prefix applied to every identifier to form its Redis key.
pub const DEFAULT_KEY_PREFIX: &str = "shield:";

/// Prune, count, and conditionally record one event, atomically.
///
/// KEYS[1] = window key; ARGV = now (ms), window (ms), limit, nonce.
/// Members are `<now>-<nonce>` so admissions in the same millisecond stay distinct.
/// Returns `{allowed, remaining}` with `allowed` in {0, 1}.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local nonce = ARGV[4]

redis.call("ZREMRANGEBYSCORE", key, 0, now - window)

local count = redis.call("ZCARD", key)

if count < limit then
    redis.call("ZADD", key, now, ARGV[1] .. "-" .. nonce)
    redis.call("PEXPIRE", key, window)
    return {1, limit - count - 1}
end

return {0, 0}
"#;

/// Prune expired members and count what is left.
///
/// KEYS[1] = window key; ARGV = now (ms), window (ms).
const INSPECT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])

redis.call("ZREMRANGEBYSCORE", key, 0, now - window)

return redis.call("ZCARD", key)
"#;

/// A limiter whose state lives in a shared Redis sorted set per identifier.
///
/// Keys are `<prefix><identifier>`; each member is scored by its admission time
/// in milliseconds and the key expires one window after its last admission.
/// Member names carry a per-limiter id and sequence number, so concurrent
/// admissions from any number of processes never collapse into one member.
pub struct RedisLimiter {
    connection: ConnectionManager,
    config: LimitConfig,
    prefix: String,
    script: Script,
    inspect_script: Script,
    clock: Box<dyn Clock>,
    instance: String,
    sequence: AtomicU64,
}

impl RedisLimiter {
    /// Create a limiter on an existing connection manager.
    pub fn new(connection: ConnectionManager, config: LimitConfig) -> Result<Self> {
        config.validate()?;

        info!(
            limit = config.limit,
            window = ?config.window,
            prefix = DEFAULT_KEY_PREFIX,
            "Redis limiter initialized"
        );

        Ok(Self {
            connection,
            config,
            prefix: DEFAULT_KEY_PREFIX.to_string(),
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            inspect_script: Script::new(INSPECT_SCRIPT),
            clock: Box::new(SystemClock),
            instance: uuid::Uuid::new_v4().simple().to_string(),
            sequence: AtomicU64::new(0),
        })
    }

    /// Connect to `url` and create a limiter on the resulting connection.
    pub async fn connect(url: &str, config: LimitConfig) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_connection_manager().await?;
        Self::new(connection, config)
    }

    /// Use a different key prefix, so several logical limiters can share a store.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// The key prefix in use.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The Redis key holding `identifier`'s window.
    pub fn key_for(&self, identifier: &str) -> String {
        window_key(&self.prefix, identifier)
    }

    /// Number of events currently inside `identifier`'s window.
    ///
    /// Expired members are pruned in the same atomic step.
    pub async fn inspect(&self, identifier: &str) -> Result<u64> {
        let mut connection = self.connection.clone();

        let count: u64 = self
            .inspect_script
            .key(self.key_for(identifier))
            .arg(self.clock.now_millis())
            .arg(self.config.window_millis())
            .invoke_async(&mut connection)
            .await?;
        Ok(count)
    }

    fn next_nonce(&self) -> String {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.instance, sequence)
    }

    /// Drop all recorded events for `identifier`.
    ///
    /// Returns whether any state existed.
    pub async fn reset(&self, identifier: &str) -> Result<bool> {
        let key = self.key_for(identifier);
        let mut connection = self.connection.clone();

        let removed: u64 = connection.del(&key).await?;
        debug!(key = %key, existed = removed > 0, "Window reset");
        Ok(removed > 0)
    }
}

#[async_trait]
impl Limiter for RedisLimiter {
    async fn allow(&self, identifier: &str) -> Result<Outcome> {
        let key = self.key_for(identifier);
        let now = self.clock.now_millis();
        let mut connection = self.connection.clone();

        let (allowed, remaining): (i64, i64) = self
            .script
            .key(&key)
            .arg(now)
            .arg(self.config.window_millis())
            .arg(self.config.limit)
            .arg(self.next_nonce())
            .invoke_async(&mut connection)
            .await?;

        let outcome = parse_reply(allowed, remaining)?;

        if outcome.allowed {
            trace!(key = %key, remaining = outcome.remaining, "Distributed admission allowed");
        } else {
            debug!(key = %key, limit = self.config.limit, "Distributed rate limit exceeded");
        }
        Ok(outcome)
    }

    async fn close(&self, _deadline: Duration) -> Result<()> {
        // Connection managers are shared handles; nothing runs in the background.
        Ok(())
    }

    fn config(&self) -> &LimitConfig {
        &self.config
    }
}

fn window_key(prefix: &str, identifier: &str) -> String {
    format!("{prefix}{identifier}")
}

fn parse_reply(allowed: i64, remaining: i64) -> Result<Outcome> {
    match allowed {
        1 => u64::try_from(remaining)
            .map(Outcome::allowed)
            .map_err(|_| ShieldError::UnexpectedReply(format!("negative remaining {remaining}"))),
        0 => Ok(Outcome::blocked()),
        other => Err(ShieldError::UnexpectedReply(format!(
            "admission flag {other}"
        ))),
    }
}
