//! Counters and batch-latency histogram.

use std::collections::HashMap;
use std::time::Duration;

use base::Mutex;

#[derive(Default)]
struct Inner {
    total_received: HashMap<String, u64>,
    validation_errors: HashMap<String, u64>,
    dropped_messages: HashMap<String, u64>,
    batch_items_flushed: Vec<usize>,
    batch_latencies_ms: Vec<f64>,
}

/// Thread-safe counters and a batch-latency histogram. Mirrors the
/// lock-guarded counters of the component this was modeled on, plus
/// synchronous fast-path variants for the two counters incremented on
/// every message (validation errors, drops) rather than once per batch.
pub struct Metrics {
    inner: Mutex<Inner>,
}

/// A point-in-time summary, as logged periodically by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total_received: u64,
    pub validation_errors: u64,
    pub dropped_messages: u64,
    pub avg_batch_ms: f64,
    pub p95_batch_ms: f64,
    pub batches: usize,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn record_message_received(&self, subject: &str) {
        *self
            .inner
            .lock()
            .total_received
            .entry(subject.to_string())
            .or_insert(0) += 1;
    }

    /// Synchronous fast path, usable from the hot message-delivery callback.
    pub fn record_validation_error_sync(&self, subject: &str) {
        *self
            .inner
            .lock()
            .validation_errors
            .entry(subject.to_string())
            .or_insert(0) += 1;
    }

    /// Synchronous fast path, usable from the hot message-delivery callback.
    pub fn record_dropped_message_sync(&self, subject: &str) {
        *self
            .inner
            .lock()
            .dropped_messages
            .entry(subject.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_batch(&self, items_flushed: usize, latency: Duration) {
        let mut inner = self.inner.lock();
        inner.batch_items_flushed.push(items_flushed);
        inner.batch_latencies_ms.push(latency.as_secs_f64() * 1000.0);
    }

    pub fn summary(&self) -> Summary {
        let inner = self.inner.lock();
        let total_received = inner.total_received.values().sum();
        let validation_errors = inner.validation_errors.values().sum();
        let dropped_messages = inner.dropped_messages.values().sum();

        let (avg_batch_ms, p95_batch_ms) = if inner.batch_latencies_ms.is_empty() {
            (0.0, 0.0)
        } else {
            let sum: f64 = inner.batch_latencies_ms.iter().sum();
            let avg = sum / inner.batch_latencies_ms.len() as f64;
            let mut sorted = inner.batch_latencies_ms.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let idx = ((sorted.len() as f64) * 0.95) as usize;
            let p95 = sorted[idx.min(sorted.len() - 1)];
            (avg, p95)
        };

        Summary {
            total_received,
            validation_errors,
            dropped_messages,
            avg_batch_ms,
            p95_batch_ms,
            batches: inner.batch_items_flushed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_aggregates_across_subjects() {
        let m = Metrics::new();
        m.record_message_received("tickperframe");
        m.record_message_received("all_tracks.cam1");
        m.record_dropped_message_sync("fps.cam1");
        m.record_batch(10, Duration::from_millis(2));
        m.record_batch(20, Duration::from_millis(4));

        let s = m.summary();
        assert_eq!(s.total_received, 2);
        assert_eq!(s.dropped_messages, 1);
        assert_eq!(s.batches, 2);
        assert!((s.avg_batch_ms - 3.0).abs() < 1e-9);
    }
}
