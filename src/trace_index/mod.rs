//! Session-to-trace index.
//!
//! Maps an externally supplied session id to the trace id of the most recent
//! request observed for that session, so that later requests (possibly served
//! by another process) can be correlated into the same trace.
//!
//! Correlation is best-effort. Backends report failures through [`Result`],
//! and [`publish`] / [`lookup`] turn those failures into a logged no-op or an
//! absent trace for callers on the request path.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{TraceIndexBackend, TraceIndexConfig};

mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::InMemoryTraceIndex;
#[cfg(feature = "redis")]
pub use self::redis::RedisTraceIndex;

/// Result type for trace index operations.
pub type Result<T> = std::result::Result<T, TraceIndexError>;

/// Errors from trace index backends.
#[derive(Debug, thiserror::Error)]
pub enum TraceIndexError {
    #[cfg(feature = "redis")]
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("trace index operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("trace index unavailable: {0}")]
    Unavailable(String),
}

/// Pluggable session -> trace store.
///
/// Writes are last-write-wins per session. Reads return `None` for absent,
/// empty, unknown, or expired session ids.
#[async_trait]
pub trait TraceIndex: Send + Sync + 'static {
    /// Associate `trace_id` with `session_id`, replacing any previous value.
    async fn set(&self, session_id: &str, trace_id: &str) -> Result<()>;

    /// Trace id most recently set for `session_id`.
    async fn get(&self, session_id: Option<&str>) -> Result<Option<String>>;

    /// Backend label for logs.
    fn backend_name(&self) -> &'static str;
}

/// Write a mapping, logging and discarding any backend failure.
///
/// Returns whether the write succeeded.
pub async fn publish(index: &dyn TraceIndex, session_id: &str, trace_id: &str) -> bool {
    match index.set(session_id, trace_id).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                backend = index.backend_name(),
                session_id = %session_id,
                trace_id = %trace_id,
                error = %e,
                "Failed to publish trace index entry"
            );
            false
        }
    }
}

/// Read a mapping, treating any backend failure as "no existing trace".
pub async fn lookup(index: &dyn TraceIndex, session_id: Option<&str>) -> Option<String> {
    match index.get(session_id).await {
        Ok(trace_id) => trace_id,
        Err(e) => {
            warn!(
                backend = index.backend_name(),
                session_id = session_id.unwrap_or(""),
                error = %e,
                "Trace index lookup failed"
            );
            None
        }
    }
}

/// Initialize the trace index selected by configuration.
///
/// A Redis backend that cannot be reached (or was not compiled in) falls back
/// to the in-memory index. Losing cross-process correlation is acceptable,
/// refusing to start is not.
pub async fn init_trace_index(config: &TraceIndexConfig) -> Arc<dyn TraceIndex> {
    match config.backend {
        TraceIndexBackend::Memory => {
            info!(backend = "memory", "Trace index initialized");
            Arc::new(InMemoryTraceIndex::from_config(&config.memory))
        }
        #[cfg(feature = "redis")]
        TraceIndexBackend::Redis => match RedisTraceIndex::connect(&config.redis).await {
            Ok(index) => {
                info!(
                    backend = "redis",
                    key_prefix = %config.redis.key_prefix,
                    ttl_secs = config.redis.ttl_secs,
                    "Trace index initialized"
                );
                Arc::new(index)
            }
            Err(e) => {
                warn!(
                    error = %e,
                    "Redis trace index unavailable, falling back to in-memory index"
                );
                Arc::new(InMemoryTraceIndex::from_config(&config.memory))
            }
        },
        #[cfg(not(feature = "redis"))]
        TraceIndexBackend::Redis => {
            warn!("Redis trace index requested but 'redis' feature is not enabled, falling back to in-memory index");
            Arc::new(InMemoryTraceIndex::from_config(&config.memory))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockTraceIndex;
    use super::*;

    #[tokio::test]
    async fn test_init_memory_backend() {
        let index = init_trace_index(&TraceIndexConfig::default()).await;
        assert_eq!(index.backend_name(), "memory");

        index.set("sess-1", "tr-1").await.unwrap();
        assert_eq!(index.get(Some("sess-1")).await.unwrap().as_deref(), Some("tr-1"));
    }

    #[tokio::test]
    async fn test_init_unreachable_redis_falls_back_to_memory() {
        let mut config = TraceIndexConfig {
            backend: TraceIndexBackend::Redis,
            ..Default::default()
        };
        // Nothing listens on port 1.
        config.redis.url = "redis://127.0.0.1:1/0".to_string();
        config.redis.timeout_ms = 200;

        let index = init_trace_index(&config).await;
        assert_eq!(index.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_publish_swallows_backend_failure() {
        let index = MockTraceIndex::new();
        index.set_fail_on_set(true).await;

        assert!(!publish(&index, "sess-1", "tr-1").await);
        assert_eq!(index.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_lookup_degrades_to_none_on_failure() {
        let index = MockTraceIndex::new();
        index.set("sess-1", "tr-1").await.unwrap();
        index.set_fail_on_get(true).await;

        assert_eq!(lookup(&index, Some("sess-1")).await, None);
    }

    #[tokio::test]
    async fn test_publish_then_lookup() {
        let index = InMemoryTraceIndex::new();

        assert!(publish(&index, "sess-42", "tr-001").await);
        assert_eq!(lookup(&index, Some("sess-42")).await.as_deref(), Some("tr-001"));
        assert_eq!(lookup(&index, None).await, None);
    }
}
