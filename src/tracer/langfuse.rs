//! Langfuse ingestion client.
//!
//! Spans and scores are turned into Langfuse ingestion events and queued on a
//! bounded channel. A background task batches them and POSTs each batch to
//! `/api/public/ingestion` with basic auth. Delivery is best-effort: failed
//! batches are logged and dropped, and so are events that arrive while the
//! queue is full. [`LangfuseTracer::shutdown`] drains the queue before exit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{new_trace_id, Score, ScoreValue, TraceAttributes, TraceParent, TraceSpan, Tracer, TracerError};
use crate::config::LangfuseConfig;

/// Tracer that reports to Langfuse.
#[derive(Clone)]
pub struct LangfuseTracer {
    events: mpsc::Sender<Value>,
    stop: Arc<Notify>,
    flusher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl LangfuseTracer {
    /// Create the tracer and spawn its flush task on the current runtime.
    pub fn new(config: &LangfuseConfig) -> Result<Self, TracerError> {
        if !config.has_credentials() {
            return Err(TracerError::MissingCredentials(
                "LANGFUSE_PUBLIC_KEY and LANGFUSE_SECRET_KEY",
            ));
        }

        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;
        let client = IngestionClient {
            http,
            url: config.ingestion_url(),
            public_key: config.public_key.clone(),
            secret_key: config.secret_key.clone(),
        };

        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(run_flusher(
            rx,
            client,
            config.batch_size.max(1),
            config.flush_interval(),
            stop.clone(),
        ));

        Ok(Self {
            events: tx,
            stop,
            flusher: Arc::new(Mutex::new(Some(handle))),
        })
    }

    fn enqueue(&self, event: Value) -> Result<(), TracerError> {
        enqueue(&self.events, event)
    }

    /// Flush every queued event and stop the background task.
    ///
    /// Spans and scores created afterwards fail with [`TracerError::Closed`].
    pub async fn shutdown(&self) {
        let Some(handle) = self.flusher.lock().await.take() else {
            return;
        };
        self.stop.notify_one();
        if let Err(e) = handle.await {
            warn!(error = %e, "Langfuse flusher task failed");
        }
    }
}

fn enqueue(events: &mpsc::Sender<Value>, event: Value) -> Result<(), TracerError> {
    events.try_send(event).map_err(|e| match e {
        TrySendError::Full(_) => TracerError::QueueFull,
        TrySendError::Closed(_) => TracerError::Closed,
    })
}

#[async_trait]
impl Tracer for LangfuseTracer {
    fn start_span(&self, name: &str, parent: Option<&TraceParent>) -> Box<dyn TraceSpan> {
        let trace_id = parent
            .map(|p| p.trace_id.clone())
            .unwrap_or_else(new_trace_id);
        Box::new(LangfuseSpan {
            events: self.events.clone(),
            id: uuid::Uuid::new_v4().to_string(),
            trace_id,
            name: name.to_string(),
            is_root: parent.is_none(),
            attributes: None,
            started_at: Utc::now(),
        })
    }

    fn create_score(&self, score: Score) -> Result<(), TracerError> {
        self.enqueue(score_create_event(&score, Utc::now()))
    }

    async fn shutdown(&self) {
        LangfuseTracer::shutdown(self).await;
    }
}

struct LangfuseSpan {
    events: mpsc::Sender<Value>,
    id: String,
    trace_id: String,
    name: String,
    is_root: bool,
    attributes: Option<TraceAttributes>,
    started_at: DateTime<Utc>,
}

impl TraceSpan for LangfuseSpan {
    fn update_trace(&mut self, attributes: TraceAttributes) {
        self.attributes = Some(attributes);
    }

    fn trace_id(&self) -> Option<String> {
        Some(self.trace_id.clone())
    }
}

impl LangfuseSpan {
    fn emit(&self, event: Value) {
        if let Err(e) = enqueue(&self.events, event) {
            warn!(trace_id = %self.trace_id, error = %e, "Dropping Langfuse span event");
        }
    }
}

impl Drop for LangfuseSpan {
    fn drop(&mut self) {
        let ended_at = Utc::now();
        // Traces are upserted by id, so only send one when there is
        // something to say about the trace itself.
        if self.is_root || self.attributes.is_some() {
            let name = self.is_root.then_some(self.name.as_str());
            let attributes = self.attributes.take().unwrap_or_default();
            self.emit(trace_create_event(
                &self.trace_id,
                name,
                &attributes,
                self.started_at,
            ));
        }
        self.emit(span_create_event(
            &self.id,
            &self.trace_id,
            &self.name,
            self.started_at,
            ended_at,
        ));
    }
}

// ============================================================================
// Ingestion events
// ============================================================================

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn envelope(kind: &str, body: Value, at: DateTime<Utc>) -> Value {
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "type": kind,
        "timestamp": timestamp(at),
        "body": body,
    })
}

fn trace_create_event(
    trace_id: &str,
    name: Option<&str>,
    attributes: &TraceAttributes,
    at: DateTime<Utc>,
) -> Value {
    let mut body = json!({
        "id": trace_id,
        "timestamp": timestamp(at),
    });
    if let Some(name) = name {
        body["name"] = json!(name);
    }
    if let Some(session_id) = &attributes.session_id {
        body["sessionId"] = json!(session_id);
    }
    if let Some(user_id) = &attributes.user_id {
        body["userId"] = json!(user_id);
    }
    if !attributes.tags.is_empty() {
        body["tags"] = json!(attributes.tags);
    }
    envelope("trace-create", body, at)
}

fn span_create_event(
    span_id: &str,
    trace_id: &str,
    name: &str,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> Value {
    let body = json!({
        "id": span_id,
        "traceId": trace_id,
        "name": name,
        "startTime": timestamp(started_at),
        "endTime": timestamp(ended_at),
    });
    envelope("span-create", body, ended_at)
}

fn score_create_event(score: &Score, at: DateTime<Utc>) -> Value {
    let (value, data_type) = match &score.value {
        ScoreValue::Numeric(v) => (json!(v), "NUMERIC"),
        ScoreValue::Text(v) => (json!(v), "CATEGORICAL"),
    };
    let mut body = json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "traceId": score.trace_id,
        "name": score.name,
        "value": value,
        "dataType": data_type,
    });
    if let Some(comment) = &score.comment {
        body["comment"] = json!(comment);
    }
    envelope("score-create", body, at)
}

// ============================================================================
// Delivery
// ============================================================================

struct IngestionClient {
    http: reqwest::Client,
    url: String,
    public_key: String,
    secret_key: String,
}

impl IngestionClient {
    async fn send(&self, batch: Vec<Value>) {
        let count = batch.len();
        let result = self
            .http
            .post(&self.url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await
            .and_then(|resp| resp.error_for_status());

        match result {
            Ok(_) => debug!(events = count, "Flushed Langfuse batch"),
            Err(e) => warn!(events = count, error = %e, "Failed to flush Langfuse batch"),
        }
    }
}

async fn run_flusher(
    mut rx: mpsc::Receiver<Value>,
    client: IngestionClient,
    batch_size: usize,
    flush_interval: Duration,
    stop: Arc<Notify>,
) {
    let mut buffer: Vec<Value> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        client.send(std::mem::take(&mut buffer)).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    client.send(std::mem::take(&mut buffer)).await;
                }
            }
            _ = stop.notified() => {
                // Refuse new events; recv() still yields what is queued.
                rx.close();
                while let Some(event) = rx.recv().await {
                    buffer.push(event);
                    if buffer.len() >= batch_size {
                        client.send(std::mem::take(&mut buffer)).await;
                    }
                }
                break;
            }
        }
    }

    if !buffer.is_empty() {
        client.send(buffer).await;
    }
    debug!("Langfuse flusher stopped");
}
