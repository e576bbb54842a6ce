//! Mock tracer for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Score, TraceAttributes, TraceParent, TraceSpan, Tracer, TracerError};

/// What the mock saw for one span.
#[derive(Debug, Clone)]
pub struct RecordedSpan {
    pub name: String,
    pub trace_id: String,
    pub parent: Option<TraceParent>,
    pub attributes: Option<TraceAttributes>,
    pub closed: bool,
}

/// Tracer that hands out sequential trace ids (`tr-001`, `tr-002`, ...) and
/// records every span and score.
#[derive(Default)]
pub struct MockTracer {
    next_id: AtomicUsize,
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
    scores: Mutex<Vec<Score>>,
    fail_on_score: AtomicBool,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_on_score(&self, fail: bool) {
        self.fail_on_score.store(fail, Ordering::SeqCst);
    }

    pub fn spans(&self) -> Vec<RecordedSpan> {
        locked(&self.spans).clone()
    }

    pub fn scores(&self) -> Vec<Score> {
        locked(&self.scores).clone()
    }
}

impl Tracer for MockTracer {
    fn start_span(&self, name: &str, parent: Option<&TraceParent>) -> Box<dyn TraceSpan> {
        let trace_id = match parent {
            Some(p) => p.trace_id.clone(),
            None => format!("tr-{:03}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let mut spans = locked(&self.spans);
        spans.push(RecordedSpan {
            name: name.to_string(),
            trace_id: trace_id.clone(),
            parent: parent.cloned(),
            attributes: None,
            closed: false,
        });
        Box::new(MockSpan {
            spans: Arc::clone(&self.spans),
            slot: spans.len() - 1,
            trace_id,
        })
    }

    fn create_score(&self, score: Score) -> Result<(), TracerError> {
        if self.fail_on_score.load(Ordering::SeqCst) {
            return Err(TracerError::Closed);
        }
        locked(&self.scores).push(score);
        Ok(())
    }
}

struct MockSpan {
    spans: Arc<Mutex<Vec<RecordedSpan>>>,
    slot: usize,
    trace_id: String,
}

impl TraceSpan for MockSpan {
    fn update_trace(&mut self, attributes: TraceAttributes) {
        if let Some(span) = locked(&self.spans).get_mut(self.slot) {
            span.attributes = Some(attributes);
        }
    }

    fn trace_id(&self) -> Option<String> {
        Some(self.trace_id.clone())
    }
}

impl Drop for MockSpan {
    fn drop(&mut self) {
        if let Some(span) = locked(&self.spans).get_mut(self.slot) {
            span.closed = true;
        }
    }
}
