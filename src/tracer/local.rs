//! Tracer backed by the process's `tracing` subscriber.

use std::time::Instant;

use tracing::field::Empty;
use tracing::{debug, info};

use super::{new_trace_id, Score, ScoreValue, TraceAttributes, TraceParent, TraceSpan, Tracer, TracerError};

/// Tracer that records spans and scores through `tracing`.
///
/// Trace ids come from, in order: the inbound `traceparent`, the
/// OpenTelemetry span context (with the `otel` feature and an OTel layer
/// installed), or a freshly minted id.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTracer;

impl LocalTracer {
    pub fn new() -> Self {
        Self
    }
}

impl Tracer for LocalTracer {
    fn start_span(&self, name: &str, parent: Option<&TraceParent>) -> Box<dyn TraceSpan> {
        let span = tracing::info_span!(
            "mcp",
            otel.name = %name,
            trace_id = Empty,
            session_id = Empty,
            user_id = Empty,
            tags = Empty,
        );

        #[cfg(feature = "otel")]
        {
            if let Some(parent) = parent {
                otel::set_remote_parent(&span, parent);
            }
        }

        let trace_id = parent
            .map(|p| p.trace_id.clone())
            .or_else(|| otel_trace_id(&span))
            .unwrap_or_else(new_trace_id);
        span.record("trace_id", trace_id.as_str());

        Box::new(LocalSpan {
            span,
            trace_id,
            started: Instant::now(),
        })
    }

    fn create_score(&self, score: Score) -> Result<(), TracerError> {
        let comment = score.comment.as_deref().unwrap_or("");
        match &score.value {
            ScoreValue::Numeric(value) => info!(
                trace_id = %score.trace_id,
                name = %score.name,
                value = *value,
                comment,
                "Score recorded"
            ),
            ScoreValue::Text(value) => info!(
                trace_id = %score.trace_id,
                name = %score.name,
                value = %value,
                comment,
                "Score recorded"
            ),
        }
        Ok(())
    }
}

#[cfg(feature = "otel")]
fn otel_trace_id(span: &tracing::Span) -> Option<String> {
    otel::trace_id(span)
}

#[cfg(not(feature = "otel"))]
fn otel_trace_id(_span: &tracing::Span) -> Option<String> {
    None
}

struct LocalSpan {
    span: tracing::Span,
    trace_id: String,
    started: Instant,
}

impl TraceSpan for LocalSpan {
    fn update_trace(&mut self, attributes: TraceAttributes) {
        if let Some(session_id) = &attributes.session_id {
            self.span.record("session_id", session_id.as_str());
        }
        if let Some(user_id) = &attributes.user_id {
            self.span.record("user_id", user_id.as_str());
        }
        if !attributes.tags.is_empty() {
            self.span.record("tags", attributes.tags.join(",").as_str());
        }
    }

    fn trace_id(&self) -> Option<String> {
        Some(self.trace_id.clone())
    }

    fn tracing_span(&self) -> tracing::Span {
        self.span.clone()
    }
}

impl Drop for LocalSpan {
    fn drop(&mut self) {
        let _entered = self.span.enter();
        debug!(
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Span closed"
        );
    }
}

#[cfg(feature = "otel")]
mod otel {
    use opentelemetry::trace::{
        SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
    };
    use opentelemetry::Context;
    use tracing_opentelemetry::OpenTelemetrySpanExt;

    use super::TraceParent;

    /// Make `span` a child of the remote context described by `parent`.
    pub(super) fn set_remote_parent(span: &tracing::Span, parent: &TraceParent) {
        let (Ok(trace_id), Ok(span_id)) = (
            TraceId::from_hex(&parent.trace_id),
            SpanId::from_hex(&parent.parent_id),
        ) else {
            return;
        };
        let flags = if parent.sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        let remote = SpanContext::new(trace_id, span_id, flags, true, TraceState::default());
        span.set_parent(Context::new().with_remote_span_context(remote));
    }

    /// Trace id from the OTel context, if an OTel layer is recording `span`.
    pub(super) fn trace_id(span: &tracing::Span) -> Option<String> {
        let trace_id = span.context().span().span_context().trace_id();
        (trace_id != TraceId::INVALID).then(|| trace_id.to_string())
    }
}
