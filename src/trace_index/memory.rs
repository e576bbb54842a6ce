//! In-process trace index.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::{Result, TraceIndex};
use crate::config::MemoryIndexConfig;

struct Entry {
    trace_id: String,
    written_at: Instant,
}

/// Trace index held in process memory.
///
/// Safe for concurrent use from many request tasks. Entries are lost on
/// restart and are not visible to other processes. With no limits configured
/// the map grows for the lifetime of the process.
#[derive(Default)]
pub struct InMemoryTraceIndex {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Option<Duration>,
    max_entries: Option<usize>,
}

impl InMemoryTraceIndex {
    /// Unbounded index with no expiry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MemoryIndexConfig) -> Self {
        Self {
            entries: RwLock::default(),
            ttl: config.ttl(),
            max_entries: config.max_entries.filter(|n| *n > 0),
        }
    }

    /// Entries older than `ttl` read as absent.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Keep at most `max_entries` sessions, evicting the oldest write.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries).filter(|n| *n > 0);
        self
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        self.ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.written_at) >= ttl)
    }
}

#[async_trait]
impl TraceIndex for InMemoryTraceIndex {
    async fn set(&self, session_id: &str, trace_id: &str) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if let Some(max) = self.max_entries {
            if !entries.contains_key(session_id) && entries.len() >= max {
                entries.retain(|_, entry| !self.is_expired(entry, now));
                if entries.len() >= max {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.written_at)
                        .map(|(session, _)| session.clone());
                    if let Some(session) = oldest {
                        entries.remove(&session);
                        debug!(session_id = %session, "Evicted oldest trace index entry");
                    }
                }
            }
        }

        entries.insert(
            session_id.to_string(),
            Entry {
                trace_id: trace_id.to_string(),
                written_at: now,
            },
        );
        Ok(())
    }

    async fn get(&self, session_id: Option<&str>) -> Result<Option<String>> {
        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };

        let entries = self.entries.read().await;
        Ok(entries
            .get(session_id)
            .filter(|entry| !self.is_expired(entry, Instant::now()))
            .map(|entry| entry.trace_id.clone()))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
