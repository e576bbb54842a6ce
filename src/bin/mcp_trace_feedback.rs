//! mcp-trace-feedback: feedback server
//!
//! Accepts user ratings for MCP sessions and records them as scores on the
//! trace the session was last correlated with. Run it against the same trace
//! index backend as the MCP servers whose traces it scores.
//!
//! ## Configuration
//! - MCP_TRACE_CONFIG: YAML configuration file (optional)
//! - TRACE_INDEX_BACKEND: `memory` (default) or `redis`
//! - REDIS_URL: Redis connection URL (default: redis://localhost:6379/0)
//! - LANGFUSE_HOST / LANGFUSE_PUBLIC_KEY / LANGFUSE_SECRET_KEY: report to
//!   Langfuse when `tracer.type` is `langfuse`
//! - PORT: HTTP port (default: 3003)
//! - MCP_TRACE_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::info;

use mcp_trace::config::Config;
use mcp_trace::feedback::{rest, FeedbackService};
use mcp_trace::utils::bootstrap::{init_tracing, shutdown_signal};
use mcp_trace::{init_trace_index, init_tracer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::load(None)?;

    let index = init_trace_index(&config.trace_index).await;
    let tracer = init_tracer(&config.tracer);
    let service = Arc::new(FeedbackService::new(index.clone(), tracer.clone()));

    let addr = config.server.addr();
    info!(
        address = %addr,
        trace_index = index.backend_name(),
        "mcp-trace-feedback started"
    );

    let result = rest::serve(service, &addr, shutdown_signal()).await;

    // Buffered spans and scores go out before the runtime is torn down.
    tracer.shutdown().await;
    info!("mcp-trace-feedback stopped");

    result
}
