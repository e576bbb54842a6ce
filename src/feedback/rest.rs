//! REST API for feedback submission and trace lookup.
//!
//! Endpoints:
//! - `GET /health` — health check
//! - `GET /api/traces/{session_id}` — trace currently indexed for a session
//! - `POST /api/feedback` — record a rating against the session's trace

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{FeedbackError, FeedbackRequest, FeedbackService};

/// Shared state for axum handlers.
type AppState = Arc<FeedbackService>;

/// Start the REST server on the given address.
///
/// When the port is 0, the OS assigns an ephemeral port. The actual bound
/// port is always logged so it can be discovered. Returns once `shutdown`
/// resolves and in-flight requests have completed.
pub async fn serve<F>(
    service: Arc<FeedbackService>,
    addr: &str,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve_listener(service, listener, shutdown).await
}

/// Serve on an already bound listener.
pub async fn serve_listener<F>(
    service: Arc<FeedbackService>,
    listener: tokio::net::TcpListener,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener.local_addr()?;
    info!(address = %local, "feedback REST API listening");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("feedback REST API stopped");
    Ok(())
}

/// Build the axum router (separated for testing).
pub fn router(service: Arc<FeedbackService>) -> Router {
    // Chat UIs call this cross-origin.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/traces/:session_id", get(trace_lookup))
        .route("/api/feedback", post(submit_feedback))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn trace_lookup(
    State(service): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    match service.lookup_trace(&session_id).await {
        Some(trace_id) => Json(json!({
            "session_id": session_id,
            "trace_id": trace_id,
        }))
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "session_id": session_id,
                "error": "no trace indexed for session",
            })),
        )
            .into_response(),
    }
}

async fn submit_feedback(
    State(service): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected malformed feedback body");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": rejection.body_text() })),
            )
                .into_response();
        }
    };

    match service.submit(request, &headers).await {
        Ok(receipt) => Json(json!({
            "ok": true,
            "trace_id": receipt.trace_id,
        }))
        .into_response(),
        Err(e) => {
            let status = match &e {
                FeedbackError::InvalidRating(_) => StatusCode::BAD_REQUEST,
                FeedbackError::NoTrace | FeedbackError::Tracer(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            warn!(error = %e, "Feedback submission failed");
            (status, Json(json!({ "ok": false, "error": e.to_string() }))).into_response()
        }
    }
}
