use std::convert::Infallible;

use http::{Response, StatusCode};
use tower::{service_fn, ServiceBuilder, ServiceExt};

use super::*;
use crate::trace_index::mock::MockTraceIndex;
use crate::trace_index::InMemoryTraceIndex;
use crate::tracer::mock::MockTracer;

const BODY: &str = r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#;

async fn fixed_handler(_req: Request<String>) -> Result<Response<String>, Infallible> {
    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .header("x-handler", "fixed")
        .body(BODY.to_string())
        .unwrap())
}

fn request(path: &str, headers: &[(&'static str, &'static str)]) -> Request<String> {
    let mut builder = Request::builder().method("POST").uri(path);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body("{}".to_string()).unwrap()
}

fn layer(index: Arc<dyn TraceIndex>, tracer: Arc<MockTracer>) -> ObservabilityLayer {
    ObservabilityLayer::new(index, tracer)
}

#[tokio::test]
async fn test_response_is_transparent() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index, tracer))
        .service(service_fn(fixed_handler));

    let plain = svc.clone().oneshot(request("/mcp", &[])).await.unwrap();
    let tagged = svc
        .oneshot(request(
            "/mcp",
            &[("mcp-session-id", "sess-1"), ("x-user-id", "u-1")],
        ))
        .await
        .unwrap();

    assert_eq!(plain.status(), StatusCode::ACCEPTED);
    assert_eq!(tagged.status(), plain.status());
    assert_eq!(tagged.headers(), plain.headers());
    assert_eq!(tagged.body().as_bytes(), plain.body().as_bytes());
    assert_eq!(tagged.body(), BODY);
}

#[tokio::test]
async fn test_request_reaches_handler_unmodified() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index, tracer))
        .service(service_fn(|req: Request<String>| async move {
            let session = req
                .headers()
                .get("mcp-session-id")
                .map(|v| v.to_str().unwrap().to_string());
            let header_count = req.headers().len();
            let path = req.uri().path().to_string();
            Ok::<_, Infallible>(Response::new(format!(
                "{}|{}|{}|{}",
                path,
                session.unwrap_or_default(),
                header_count,
                req.into_body()
            )))
        }));

    let resp = svc
        .oneshot(request("/tools/call", &[("mcp-session-id", "sess-1")]))
        .await
        .unwrap();

    assert_eq!(resp.body(), "/tools/call|sess-1|1|{}");
}

#[tokio::test]
async fn test_session_header_priority() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.oneshot(request(
        "/mcp",
        &[("x-session-id", "B"), ("mcp-session-id", "A")],
    ))
    .await
    .unwrap();

    assert_eq!(index.get(Some("A")).await.unwrap().as_deref(), Some("tr-001"));
    assert_eq!(index.get(Some("B")).await.unwrap(), None);
    let attributes = tracer.spans()[0].attributes.clone().unwrap();
    assert_eq!(attributes.session_id.as_deref(), Some("A"));
}

#[tokio::test]
async fn test_span_named_after_path_and_closed() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index, tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.oneshot(request("/mcp/messages?x=1", &[])).await.unwrap();

    let spans = tracer.spans();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "mcp:/mcp/messages");
    assert!(spans[0].closed);
}

#[tokio::test]
async fn test_trace_tagged_with_identity() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index, tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.oneshot(request(
        "/mcp",
        &[("x-session-id", "sess-7"), ("x-github-user", "octocat")],
    ))
    .await
    .unwrap();

    let attributes = tracer.spans()[0].attributes.clone().unwrap();
    assert_eq!(
        attributes,
        TraceAttributes {
            session_id: Some("sess-7".to_string()),
            user_id: Some("octocat".to_string()),
            tags: vec!["mcp".to_string()],
        }
    );
}

#[tokio::test]
async fn test_user_only_tags_trace_without_index_write() {
    let index = Arc::new(MockTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.oneshot(request("/mcp", &[("x-microsoft-user", "ms-user")]))
        .await
        .unwrap();

    let attributes = tracer.spans()[0].attributes.clone().unwrap();
    assert_eq!(attributes.session_id, None);
    assert_eq!(attributes.user_id.as_deref(), Some("ms-user"));
    assert_eq!(index.write_count().await, 0);
}

#[tokio::test]
async fn test_anonymous_request_not_tagged() {
    let index = Arc::new(MockTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.oneshot(request("/mcp", &[])).await.unwrap();

    assert!(tracer.spans()[0].attributes.is_none());
    assert_eq!(index.write_count().await, 0);
}

#[tokio::test]
async fn test_custom_tags() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index, tracer.clone()).with_tags(["mcp", "feedback"]))
        .service(service_fn(fixed_handler));

    svc.oneshot(request("/mcp", &[("session-id", "s")]))
        .await
        .unwrap();

    let attributes = tracer.spans()[0].attributes.clone().unwrap();
    assert_eq!(attributes.tags, vec!["mcp", "feedback"]);
}

#[tokio::test]
async fn test_failing_index_does_not_affect_response() {
    let index = Arc::new(MockTraceIndex::failing().await);
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index, tracer.clone()))
        .service(service_fn(fixed_handler));

    let resp = svc
        .oneshot(request("/mcp", &[("mcp-session-id", "sess-1")]))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(resp.body(), BODY);
    assert!(tracer.spans()[0].closed);
}

#[tokio::test]
async fn test_handler_error_propagates_unchanged() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(|_req: Request<String>| async {
            Err::<Response<String>, _>("handler exploded")
        }));

    let err = svc
        .oneshot(request("/mcp", &[("mcp-session-id", "sess-err")]))
        .await
        .unwrap_err();

    assert_eq!(err, "handler exploded");
    // Correlation happened before the handler ran.
    assert_eq!(
        index.get(Some("sess-err")).await.unwrap().as_deref(),
        Some("tr-001")
    );
    assert!(tracer.spans()[0].closed);
}

#[tokio::test]
async fn test_traceparent_continues_trace() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.oneshot(request(
        "/mcp",
        &[
            ("mcp-session-id", "sess-tp"),
            (
                "traceparent",
                "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            ),
        ],
    ))
    .await
    .unwrap();

    assert_eq!(
        index.get(Some("sess-tp")).await.unwrap().as_deref(),
        Some("4bf92f3577b34da6a3ce929d0e0e4736")
    );
    assert!(tracer.spans()[0].parent.is_some());
}

#[tokio::test]
async fn test_session_correlated_across_requests() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(fixed_handler));

    svc.clone()
        .oneshot(request("/mcp", &[("mcp-session-id", "sess-42")]))
        .await
        .unwrap();
    // A later request without a session header leaves the mapping alone.
    svc.oneshot(request("/mcp", &[])).await.unwrap();

    let index: Arc<dyn TraceIndex> = index;
    assert_eq!(
        trace_index::lookup(index.as_ref(), Some("sess-42")).await.as_deref(),
        Some("tr-001")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_requests_same_session() {
    let index = Arc::new(InMemoryTraceIndex::new());
    let tracer = Arc::new(MockTracer::new());
    let svc = ServiceBuilder::new()
        .layer(layer(index.clone(), tracer.clone()))
        .service(service_fn(fixed_handler));

    let a = tokio::spawn(
        svc.clone()
            .oneshot(request("/mcp", &[("mcp-session-id", "sess-99")])),
    );
    let b = tokio::spawn(svc.oneshot(request("/mcp", &[("mcp-session-id", "sess-99")])));
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let winner = index.get(Some("sess-99")).await.unwrap().unwrap();
    assert!(winner == "tr-001" || winner == "tr-002", "got {winner}");
    assert_eq!(tracer.spans().len(), 2);
}
