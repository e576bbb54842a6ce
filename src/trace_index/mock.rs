//! Mock trace index for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Result, TraceIndex, TraceIndexError};

/// Mock trace index that stores mappings in memory and can be told to fail.
#[derive(Default)]
pub struct MockTraceIndex {
    entries: RwLock<HashMap<String, String>>,
    writes: RwLock<Vec<(String, String)>>,
    fail_on_set: RwLock<bool>,
    fail_on_get: RwLock<bool>,
}

impl MockTraceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index whose `set` and `get` always fail.
    pub async fn failing() -> Self {
        let index = Self::new();
        index.set_fail_on_set(true).await;
        index.set_fail_on_get(true).await;
        index
    }

    pub async fn set_fail_on_set(&self, fail: bool) {
        *self.fail_on_set.write().await = fail;
    }

    pub async fn set_fail_on_get(&self, fail: bool) {
        *self.fail_on_get.write().await = fail;
    }

    /// Successful writes, in order.
    pub async fn writes(&self) -> Vec<(String, String)> {
        self.writes.read().await.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.writes.read().await.len()
    }
}

#[async_trait]
impl TraceIndex for MockTraceIndex {
    async fn set(&self, session_id: &str, trace_id: &str) -> Result<()> {
        if *self.fail_on_set.read().await {
            return Err(TraceIndexError::Unavailable("mock set failure".to_string()));
        }
        self.entries
            .write()
            .await
            .insert(session_id.to_string(), trace_id.to_string());
        self.writes
            .write()
            .await
            .push((session_id.to_string(), trace_id.to_string()));
        Ok(())
    }

    async fn get(&self, session_id: Option<&str>) -> Result<Option<String>> {
        if *self.fail_on_get.read().await {
            return Err(TraceIndexError::Unavailable("mock get failure".to_string()));
        }
        let Some(session_id) = session_id.filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        Ok(self.entries.read().await.get(session_id).cloned())
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
