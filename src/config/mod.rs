//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod trace_index;
mod tracer;

pub use trace_index::{
    MemoryIndexConfig, RedisIndexConfig, TraceIndexBackend, TraceIndexConfig, DEFAULT_KEY_PREFIX,
    DEFAULT_REDIS_URL, DEFAULT_TIMEOUT_MS, DEFAULT_TTL_SECS,
};
pub use tracer::{LangfuseConfig, TracerConfig, TracerType, DEFAULT_LANGFUSE_HOST};

use serde::Deserialize;
use tracing::warn;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "MCP_TRACE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "MCP_TRACE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "MCP_TRACE_LOG";

/// Environment variable selecting the trace index backend (memory/redis).
pub const TRACE_INDEX_BACKEND_ENV_VAR: &str = "TRACE_INDEX_BACKEND";
/// Environment variable for the Redis connection URL.
pub const REDIS_URL_ENV_VAR: &str = "REDIS_URL";
/// Environment variable for the Langfuse host.
pub const LANGFUSE_HOST_ENV_VAR: &str = "LANGFUSE_HOST";
/// Environment variable for the Langfuse public key.
pub const LANGFUSE_PUBLIC_KEY_ENV_VAR: &str = "LANGFUSE_PUBLIC_KEY";
/// Environment variable for the Langfuse secret key.
pub const LANGFUSE_SECRET_KEY_ENV_VAR: &str = "LANGFUSE_SECRET_KEY";
/// Environment variable for server port.
pub const PORT_ENV_VAR: &str = "PORT";

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3003,
        }
    }
}

impl ServerConfig {
    /// Get the socket address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Trace index configuration.
    pub trace_index: TraceIndexConfig,
    /// Tracing client configuration.
    pub tracer: TracerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Unprefixed variables shared with the other MCP servers
    ///    (`TRACE_INDEX_BACKEND`, `REDIS_URL`, `LANGFUSE_*`, `PORT`)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let backend = env_non_empty(TRACE_INDEX_BACKEND_ENV_VAR).map(|raw| {
            TraceIndexBackend::parse(&raw).unwrap_or_else(|| {
                warn!(value = %raw, "Unknown trace index backend, using memory");
                TraceIndexBackend::Memory
            })
        });
        let port = env_non_empty(PORT_ENV_VAR).and_then(|raw| match raw.parse::<u16>() {
            Ok(port) => Some(i64::from(port)),
            Err(_) => {
                warn!(value = %raw, "Ignoring invalid PORT");
                None
            }
        });

        let config = builder
            .set_override_option("trace_index.backend", backend.map(|b| b.as_str()))?
            .set_override_option("trace_index.redis.url", env_non_empty(REDIS_URL_ENV_VAR))?
            .set_override_option("tracer.langfuse.host", env_non_empty(LANGFUSE_HOST_ENV_VAR))?
            .set_override_option(
                "tracer.langfuse.public_key",
                env_non_empty(LANGFUSE_PUBLIC_KEY_ENV_VAR),
            )?
            .set_override_option(
                "tracer.langfuse.secret_key",
                env_non_empty(LANGFUSE_SECRET_KEY_ENV_VAR),
            )?
            .set_override_option("server.port", port)?
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        Self::default()
    }
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
