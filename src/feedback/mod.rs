//! User feedback correlated to traces.
//!
//! Feedback often arrives on a separate request (a REST call from a chat UI,
//! or a tool call on another server) after the work being rated has finished.
//! The session id ties the two together: the trace index maps it to the trace
//! of the rated work, and the rating is recorded as scores on that trace.

use std::sync::Arc;

use http::HeaderMap;
use serde::Deserialize;
use tracing::info;

use crate::middleware::{pick_session_id, pick_user_id, MCP_TAG};
use crate::trace_index::{self, TraceIndex};
use crate::tracer::{Score, ScoreValue, TraceAttributes, Tracer, TracerError};

pub mod rest;

/// Score name for the numeric rating.
pub const RATING_SCORE: &str = "user_rating";
/// Score name for the free-text comment.
pub const COMMENT_SCORE: &str = "user_feedback_text";
/// Lowest accepted rating.
pub const MIN_RATING: f64 = 1.0;
/// Highest accepted rating.
pub const MAX_RATING: f64 = 5.0;

/// Errors from feedback submission.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(f64),

    #[error("no trace available to attach feedback to")]
    NoTrace,

    #[error("failed to record score: {0}")]
    Tracer(#[from] TracerError),
}

/// Feedback payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackRequest {
    pub rating: f64,
    #[serde(default)]
    pub comment: Option<String>,
    /// Overrides the session id taken from request headers.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Skips trace resolution entirely.
    #[serde(default)]
    pub trace_id: Option<String>,
}

/// Where a piece of feedback ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackReceipt {
    pub trace_id: String,
    pub session_id: Option<String>,
}

/// Resolves traces for sessions and records feedback scores on them.
pub struct FeedbackService {
    index: Arc<dyn TraceIndex>,
    tracer: Arc<dyn Tracer>,
}

impl FeedbackService {
    pub fn new(index: Arc<dyn TraceIndex>, tracer: Arc<dyn Tracer>) -> Self {
        Self { index, tracer }
    }

    /// Trace currently associated with a session, if any.
    pub async fn lookup_trace(&self, session_id: &str) -> Option<String> {
        trace_index::lookup(self.index.as_ref(), Some(session_id)).await
    }

    /// Record a rating (and optional comment) against the right trace.
    ///
    /// The trace is, in order: `request.trace_id`, the trace indexed for the
    /// session, or the trace of this submission's own span. The session is
    /// then (re)pointed at that trace.
    pub async fn submit(
        &self,
        request: FeedbackRequest,
        headers: &HeaderMap,
    ) -> Result<FeedbackReceipt, FeedbackError> {
        if !request.rating.is_finite()
            || request.rating < MIN_RATING
            || request.rating > MAX_RATING
        {
            return Err(FeedbackError::InvalidRating(request.rating));
        }

        let session_id = non_empty(request.session_id).or_else(|| pick_session_id(headers));
        let user_id = pick_user_id(headers);

        let mut span = self.tracer.start_span("mcp:/api/feedback", None);
        if session_id.is_some() || user_id.is_some() {
            span.update_trace(TraceAttributes {
                session_id: session_id.clone(),
                user_id,
                tags: vec![MCP_TAG.to_string()],
            });
        }

        let trace_id = match non_empty(request.trace_id) {
            Some(trace_id) => trace_id,
            None => match trace_index::lookup(self.index.as_ref(), session_id.as_deref()).await {
                Some(trace_id) => trace_id,
                None => span.trace_id().ok_or(FeedbackError::NoTrace)?,
            },
        };

        if let Some(session_id) = &session_id {
            trace_index::publish(self.index.as_ref(), session_id, &trace_id).await;
        }

        let comment = request
            .comment
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        self.tracer.create_score(Score {
            name: RATING_SCORE.to_string(),
            value: ScoreValue::Numeric(request.rating),
            trace_id: trace_id.clone(),
            comment: comment.clone(),
        })?;
        if let Some(comment) = comment {
            self.tracer.create_score(Score {
                name: COMMENT_SCORE.to_string(),
                value: ScoreValue::Text(comment),
                trace_id: trace_id.clone(),
                comment: None,
            })?;
        }

        info!(
            trace_id = %trace_id,
            session_id = session_id.as_deref().unwrap_or(""),
            rating = request.rating,
            "Feedback recorded"
        );

        Ok(FeedbackReceipt {
            trace_id,
            session_id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
