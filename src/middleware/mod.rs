//! Observability middleware.
//!
//! A tower layer that, for every inbound HTTP request, opens a span named
//! `mcp:{path}`, tags its trace with the caller's session and user ids, and
//! publishes `session -> trace` into the [`TraceIndex`] so that requests
//! handled elsewhere can find the same trace.
//!
//! The wrapped service sees the request unchanged and its response or error
//! is returned unchanged. Correlation failures are logged and never reach the
//! caller.

use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use http::Request;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::trace_index::{self, TraceIndex};
use crate::tracer::{TraceAttributes, Tracer};

mod headers;

pub use headers::{
    pick_session_id, pick_trace_parent, pick_user_id, RequestIdentity, SESSION_HEADERS,
    TRACEPARENT_HEADER, USER_HEADERS,
};

/// Tag attached to every trace opened by the middleware, so traces from all
/// MCP servers can be filtered together.
pub const MCP_TAG: &str = "mcp";

/// Layer that wraps services in [`ObservabilityService`].
#[derive(Clone)]
pub struct ObservabilityLayer {
    index: Arc<dyn TraceIndex>,
    tracer: Arc<dyn Tracer>,
    tags: Arc<[String]>,
}

impl ObservabilityLayer {
    pub fn new(index: Arc<dyn TraceIndex>, tracer: Arc<dyn Tracer>) -> Self {
        Self {
            index,
            tracer,
            tags: Arc::from(vec![MCP_TAG.to_string()]),
        }
    }

    /// Replace the default `["mcp"]` trace tags.
    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

impl<S> Layer<S> for ObservabilityLayer {
    type Service = ObservabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservabilityService {
            inner,
            index: Arc::clone(&self.index),
            tracer: Arc::clone(&self.tracer),
            tags: Arc::clone(&self.tags),
        }
    }
}

/// Service produced by [`ObservabilityLayer`].
#[derive(Clone)]
pub struct ObservabilityService<S> {
    inner: S,
    index: Arc<dyn TraceIndex>,
    tracer: Arc<dyn Tracer>,
    tags: Arc<[String]>,
}

impl<S, B> Service<Request<B>> for ObservabilityService<S>
where
    S: Service<Request<B>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // The clone may not be ready; drive the instance poll_ready was called on.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let index = Arc::clone(&self.index);
        let tracer = Arc::clone(&self.tracer);
        let tags = Arc::clone(&self.tags);

        Box::pin(async move {
            let identity = RequestIdentity::from_headers(req.headers());
            let parent = pick_trace_parent(req.headers());

            let mut span = tracer.start_span(&format!("mcp:{}", req.uri().path()), parent.as_ref());

            if identity.is_present() {
                span.update_trace(TraceAttributes {
                    session_id: identity.session_id.clone(),
                    user_id: identity.user_id.clone(),
                    tags: tags.to_vec(),
                });
            }

            if let (Some(session_id), Some(trace_id)) = (&identity.session_id, span.trace_id()) {
                trace_index::publish(index.as_ref(), session_id, &trace_id).await;
            }

            let result = inner.call(req).instrument(span.tracing_span()).await;
            drop(span);
            result
        })
    }
}

#[cfg(test)]
mod tests;
