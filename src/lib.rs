//! mcp-trace - session-to-trace correlation for MCP servers
//!
//! Stateless MCP tool servers see each HTTP request in isolation, often on
//! different processes. This crate ties requests that share a client session
//! id into one trace:
//!
//! - [`trace_index`]: session id -> trace id, in memory or in Redis with TTL
//! - [`middleware`]: tower layer that opens a span per request and publishes
//!   the session's trace id into the index
//! - [`tracer`]: the tracing client seam (local `tracing` or Langfuse)
//! - [`feedback`]: attaches user ratings to the trace of a session

pub mod config;
pub mod feedback;
pub mod middleware;
pub mod trace_index;
pub mod tracer;
pub mod utils;

pub use middleware::{ObservabilityLayer, ObservabilityService};
pub use trace_index::{init_trace_index, TraceIndex, TraceIndexError};
pub use tracer::{init_tracer, Tracer};
