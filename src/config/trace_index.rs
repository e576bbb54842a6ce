//! Trace index configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Default Redis connection URL.
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";
/// Default namespace for trace index keys in a shared Redis.
pub const DEFAULT_KEY_PREFIX: &str = "mcp:trace_index:";
/// Default entry lifetime in the remote store (24 hours).
pub const DEFAULT_TTL_SECS: u64 = 60 * 60 * 24;
/// Default client-side bound on a single remote round-trip.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Trace index backend discriminator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceIndexBackend {
    /// Per-process map. Lost on restart.
    #[default]
    Memory,
    /// Shared Redis store with native TTL.
    Redis,
}

impl TraceIndexBackend {
    /// Parse a backend name the way the `TRACE_INDEX_BACKEND` variable is
    /// written: trimmed, case-insensitive.
    ///
    /// Returns `None` for unrecognised names.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "redis" => Some(Self::Redis),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
        }
    }
}

impl std::fmt::Display for TraceIndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trace index configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TraceIndexConfig {
    /// Backend discriminator.
    pub backend: TraceIndexBackend,
    /// Redis-specific configuration.
    pub redis: RedisIndexConfig,
    /// In-memory-specific configuration.
    pub memory: MemoryIndexConfig,
}

/// Redis-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisIndexConfig {
    /// Redis connection URL.
    pub url: String,
    /// Prefix for all keys.
    pub key_prefix: String,
    /// Expiry applied on every write, in seconds.
    pub ttl_secs: u64,
    /// Bound on connect and on each command round-trip, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for RedisIndexConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REDIS_URL.to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl RedisIndexConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// In-memory-specific configuration.
///
/// Both limits are off by default: entries live for the process lifetime.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MemoryIndexConfig {
    /// Treat entries older than this as expired on read.
    pub ttl_secs: Option<u64>,
    /// Upper bound on stored sessions. The oldest-written entry is evicted.
    pub max_entries: Option<usize>,
}

impl MemoryIndexConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}
