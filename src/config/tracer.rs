//! Tracing client configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Default Langfuse host.
pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Default bound on queued Langfuse events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;

/// Tracing client discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracerType {
    /// Spans go to the process's `tracing` subscriber.
    #[default]
    Local,
    /// Spans and scores are shipped to the Langfuse ingestion API.
    Langfuse,
}

/// Tracing client configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Tracer discriminator.
    #[serde(rename = "type")]
    pub tracer_type: TracerType,
    /// Langfuse-specific configuration.
    pub langfuse: LangfuseConfig,
}

/// Langfuse-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LangfuseConfig {
    /// Base URL of the Langfuse deployment.
    pub host: String,
    /// Project public key (basic auth user).
    pub public_key: String,
    /// Project secret key (basic auth password).
    pub secret_key: String,
    /// How often buffered events are flushed, in milliseconds.
    pub flush_interval_ms: u64,
    /// Flush early once this many events are buffered.
    pub batch_size: usize,
    /// Bound on each ingestion request, in milliseconds.
    pub timeout_ms: u64,
    /// Events buffered ahead of the flusher before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for LangfuseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_LANGFUSE_HOST.to_string(),
            public_key: String::new(),
            secret_key: String::new(),
            flush_interval_ms: 1000,
            batch_size: 50,
            timeout_ms: 5000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl LangfuseConfig {
    /// Flush period. Never zero.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Whether both API keys are set.
    pub fn has_credentials(&self) -> bool {
        !self.public_key.is_empty() && !self.secret_key.is_empty()
    }

    /// Ingestion endpoint URL.
    pub fn ingestion_url(&self) -> String {
        format!("{}/api/public/ingestion", self.host.trim_end_matches('/'))
    }
}
