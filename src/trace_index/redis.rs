//! Redis trace index.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tracing::{debug, info};

use super::{Result, TraceIndex, TraceIndexError};
use crate::config::RedisIndexConfig;

/// Redis-backed trace index shared by every process pointed at the same store.
///
/// Each session is a hash at `{prefix}{session_id}` holding `trace_id` and the
/// write timestamp `ts` (unix seconds). Every write resets the key's expiry,
/// so Redis itself drops sessions idle for longer than the TTL.
pub struct RedisTraceIndex {
    conn: ConnectionManager,
    key_prefix: String,
    ttl: Duration,
    timeout: Duration,
}

impl RedisTraceIndex {
    /// Connect using the given configuration.
    ///
    /// Fails if no connection is established within the configured timeout.
    pub async fn connect(config: &RedisIndexConfig) -> Result<Self> {
        Self::new(
            &config.url,
            Some(&config.key_prefix),
            config.ttl(),
            config.timeout(),
        )
        .await
    }

    /// Create a new Redis trace index.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379/0)
    /// * `key_prefix` - Prefix for all keys (default: "mcp:trace_index:")
    /// * `ttl` - Expiry applied on every write
    /// * `timeout` - Bound on connect and on each command
    pub async fn new(
        url: &str,
        key_prefix: Option<&str>,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| TraceIndexError::Timeout(timeout))??;

        info!(url = %redacted_url(url), "Connected to Redis for trace index");

        Ok(Self {
            conn,
            key_prefix: key_prefix
                .unwrap_or(crate::config::DEFAULT_KEY_PREFIX)
                .to_string(),
            ttl,
            timeout,
        })
    }

    /// Build the key for a session.
    fn session_key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(TraceIndexError::Timeout(self.timeout)),
        }
    }
}

/// EXPIRE argument for a TTL. Redis rejects 0, so sub-second TTLs round up.
fn expire_secs(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX)
}

/// `url` with its credentials masked, for logging.
fn redacted_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{scheme}://***@{}", &rest[at + 1..]),
        None => url.to_string(),
    }
}

/// Current wall clock as fractional unix seconds.
fn unix_timestamp() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    format!("{}.{:03}", millis / 1000, millis % 1000)
}

#[async_trait]
impl TraceIndex for RedisTraceIndex {
    async fn set(&self, session_id: &str, trace_id: &str) -> Result<()> {
        let key = self.session_key(session_id);
        let mut conn = self.conn.clone();
        let ttl_secs = expire_secs(self.ttl);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset_multiple(
                &key,
                &[("trace_id", trace_id.to_string()), ("ts", unix_timestamp())],
            )
            .ignore()
            .expire(&key, ttl_secs)
            .ignore();

        let _: () = self.bounded(pipe.query_async(&mut conn)).await?;

        debug!(session_id = %session_id, trace_id = %trace_id, "Stored trace index entry in Redis");
        Ok(())
    }

    async fn get(&self, session_id: Option<&str>) -> Result<Option<String>> {
        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        let key = self.session_key(session_id);
        let mut conn = self.conn.clone();

        let trace_id: Option<String> = self.bounded(conn.hget(&key, "trace_id")).await?;
        Ok(trace_id)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
