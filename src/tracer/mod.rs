//! Tracing client capability.
//!
//! The middleware and feedback service only need a handful of operations from
//! the tracing backend: open a span, tag its trace with session/user metadata,
//! read back the trace id, and attach scores to a trace. [`Tracer`] is that
//! seam. Two implementations exist:
//! - [`LocalTracer`]: spans on the process's `tracing` subscriber
//! - [`LangfuseTracer`]: events shipped to the Langfuse ingestion API

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{TracerConfig, TracerType};

mod langfuse;
mod local;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use langfuse::LangfuseTracer;
pub use local::LocalTracer;

/// Errors from tracing clients.
#[derive(Debug, thiserror::Error)]
pub enum TracerError {
    #[error("tracer is shut down")]
    Closed,

    #[error("event queue is full")]
    QueueFull,

    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Trace-level metadata attached by the middleware.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceAttributes {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub tags: Vec<String>,
}

/// Value of a score.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreValue {
    Numeric(f64),
    Text(String),
}

/// A score attached to a trace (e.g. a user rating).
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub name: String,
    pub value: ScoreValue,
    pub trace_id: String,
    pub comment: Option<String>,
}

/// W3C `traceparent` context carried by an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceParent {
    /// 32 lowercase hex digits.
    pub trace_id: String,
    /// 16 lowercase hex digits.
    pub parent_id: String,
    pub sampled: bool,
}

impl TraceParent {
    /// Parse a `traceparent` header value (`00-<trace>-<parent>-<flags>`).
    ///
    /// Returns `None` for malformed values and for the all-zero ids the
    /// W3C format reserves as invalid.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || !is_hex(version) || version == "ff" {
            return None;
        }
        // Version 00 has exactly four fields; later versions may append more.
        if version == "00" && parts.next().is_some() {
            return None;
        }
        if trace_id.len() != 32 || !is_hex(trace_id) || is_zero(trace_id) {
            return None;
        }
        if parent_id.len() != 16 || !is_hex(parent_id) || is_zero(parent_id) {
            return None;
        }
        if flags.len() != 2 || !is_hex(flags) {
            return None;
        }
        let flags = u8::from_str_radix(flags, 16).ok()?;

        Some(Self {
            trace_id: trace_id.to_ascii_lowercase(),
            parent_id: parent_id.to_ascii_lowercase(),
            sampled: flags & 0x01 == 0x01,
        })
    }
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_zero(s: &str) -> bool {
    s.bytes().all(|b| b == b'0')
}

/// Mint a new W3C-compatible trace id.
pub(crate) fn new_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A span scoped to one unit of work. Ends when dropped.
pub trait TraceSpan: Send {
    /// Attach trace-level metadata.
    fn update_trace(&mut self, attributes: TraceAttributes);

    /// Id of the trace this span belongs to.
    fn trace_id(&self) -> Option<String>;

    /// `tracing` span to instrument the wrapped work with.
    fn tracing_span(&self) -> tracing::Span {
        tracing::Span::none()
    }
}

/// Client of the external tracing system.
#[async_trait]
pub trait Tracer: Send + Sync + 'static {
    /// Open a span. With a `parent`, the span joins that trace.
    fn start_span(&self, name: &str, parent: Option<&TraceParent>) -> Box<dyn TraceSpan>;

    /// Record a score against a trace.
    fn create_score(&self, score: Score) -> Result<(), TracerError>;

    /// Deliver anything still buffered. Called once before the process exits.
    async fn shutdown(&self) {}
}

/// Build the tracer selected by configuration.
///
/// Langfuse without credentials falls back to the local tracer.
/// Must be called from within a tokio runtime.
pub fn init_tracer(config: &TracerConfig) -> Arc<dyn Tracer> {
    match config.tracer_type {
        TracerType::Local => {
            info!(tracer = "local", "Tracer initialized");
            Arc::new(LocalTracer::new())
        }
        TracerType::Langfuse => match LangfuseTracer::new(&config.langfuse) {
            Ok(tracer) => {
                info!(tracer = "langfuse", host = %config.langfuse.host, "Tracer initialized");
                Arc::new(tracer)
            }
            Err(e) => {
                warn!(error = %e, "Langfuse tracer unavailable, falling back to local tracer");
                Arc::new(LocalTracer::new())
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_traceparent_parse_valid() {
        let tp = TraceParent::parse("00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01")
            .unwrap();
        assert_eq!(tp.trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(tp.parent_id, "00f067aa0ba902b7");
        assert!(tp.sampled);
    }

    #[test]
    fn test_traceparent_parse_unsampled() {
        let tp = TraceParent::parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-00")
            .unwrap();
        assert!(!tp.sampled);
    }

    #[test]
    fn test_traceparent_parse_future_version_with_extra_fields() {
        let tp =
            TraceParent::parse("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra");
        assert!(tp.is_some());
    }

    #[test]
    fn test_traceparent_parse_rejects_malformed() {
        for value in [
            "",
            "garbage",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e473-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
            "00-zzf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
        ] {
            assert!(TraceParent::parse(value).is_none(), "accepted {value:?}");
        }
    }

    #[test]
    fn test_new_trace_id_is_w3c_shaped() {
        let id = new_trace_id();
        assert_eq!(id.len(), 32);
        assert!(is_hex(&id));
        assert_ne!(id, new_trace_id());
    }

    #[tokio::test]
    async fn test_init_langfuse_without_credentials_falls_back() {
        let config = TracerConfig {
            tracer_type: TracerType::Langfuse,
            ..Default::default()
        };
        let tracer = init_tracer(&config);
        let span = tracer.start_span("mcp:/health", None);
        assert!(span.trace_id().is_some());
    }
}
