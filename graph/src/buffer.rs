//! Per-subject FIFO buffer with fine-grained locking.
//!
//! Different subjects can be pushed to and drained from concurrently;
//! only subjects sharing a buffer contend with each other. A coarse
//! lock protects the subject-to-buffer map itself (insertion, and
//! removal once a subject's buffer empties), never the buffers' contents.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base::Mutex;
use serde_json::Value;

const RATE_WINDOW: Duration = Duration::from_secs(10);
const CONCURRENCY_HISTORY_LEN: usize = 100;

struct Rates {
    fill: HashMap<String, u64>,
    process: HashMap<String, u64>,
    window_start: Instant,
}

/// A single buffered message awaiting batch processing.
pub struct Entry {
    pub subject: String,
    pub payload: Value,
}

pub struct BatchBuffer {
    subjects: Mutex<HashMap<String, Arc<Mutex<VecDeque<Value>>>>>,
    rates: Mutex<Rates>,
    concurrency_history: Mutex<VecDeque<usize>>,
    batch_count: Mutex<u64>,
}

/// Per-subject add/drain rates measured over the last completed
/// 10-second window; empty until a full window has elapsed.
#[derive(Debug, Clone, Default)]
pub struct SubjectRate {
    pub fill_rate: f64,
    pub process_rate: f64,
    pub net_rate: f64,
}

/// A point-in-time read of buffer occupancy, taken just before a drain.
#[derive(Debug, Clone, Default)]
pub struct BatchInfo {
    pub active_subjects: usize,
    pub total_buffered: usize,
    pub average_concurrent_subjects: f64,
    pub batch_number: u64,
}

impl Default for BatchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchBuffer {
    pub fn new() -> Self {
        BatchBuffer {
            subjects: Mutex::new(HashMap::new()),
            rates: Mutex::new(Rates {
                fill: HashMap::new(),
                process: HashMap::new(),
                window_start: Instant::now(),
            }),
            concurrency_history: Mutex::new(VecDeque::new()),
            batch_count: Mutex::new(0),
        }
    }

    fn queue_for(&self, subject: &str) -> Arc<Mutex<VecDeque<Value>>> {
        let mut subjects = self.subjects.lock();
        subjects
            .entry(subject.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    pub fn push(&self, subject: &str, payload: Value) {
        let queue = self.queue_for(subject);
        queue.lock().push_back(payload);
        *self.rates.lock().fill.entry(subject.to_string()).or_insert(0) += 1;
    }

    pub fn total_buffered(&self) -> usize {
        let subjects: Vec<_> = self.subjects.lock().values().cloned().collect();
        subjects.iter().map(|q| q.lock().len()).sum()
    }

    pub fn subject_buffer_sizes(&self) -> HashMap<String, usize> {
        let subjects: Vec<_> = self
            .subjects
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        subjects
            .into_iter()
            .map(|(k, q)| (k, q.lock().len()))
            .collect()
    }

    /// Extracts up to `limit` messages FIFO across all subjects,
    /// removing emptied subjects from the map, and returns diagnostic
    /// info about the buffer state observed just before the drain.
    pub fn drain(&self, limit: usize) -> (Vec<Entry>, BatchInfo) {
        let sizes_before = self.subject_buffer_sizes();
        let active_subjects = sizes_before.values().filter(|&&n| n > 0).count();
        let total_buffered: usize = sizes_before.values().sum();

        let mut history = self.concurrency_history.lock();
        history.push_back(active_subjects);
        if history.len() > CONCURRENCY_HISTORY_LEN {
            history.pop_front();
        }
        let average_concurrent_subjects =
            history.iter().sum::<usize>() as f64 / history.len() as f64;
        drop(history);

        let mut entries = Vec::with_capacity(limit.min(total_buffered));
        let subjects: Vec<_> = self
            .subjects
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (subject, queue) in subjects {
            if entries.len() >= limit {
                break;
            }
            let mut q = queue.lock();
            let take = (limit - entries.len()).min(q.len());
            for _ in 0..take {
                if let Some(payload) = q.pop_front() {
                    entries.push(Entry {
                        subject: subject.clone(),
                        payload,
                    });
                }
            }
            let now_empty = q.is_empty();
            drop(q);
            if now_empty {
                let mut subjects_map = self.subjects.lock();
                if subjects_map
                    .get(&subject)
                    .map(|q| q.lock().is_empty())
                    .unwrap_or(false)
                {
                    subjects_map.remove(&subject);
                }
            }
        }

        if !entries.is_empty() {
            let mut rates = self.rates.lock();
            for e in &entries {
                *rates.process.entry(e.subject.clone()).or_insert(0) += 1;
            }
            *self.batch_count.lock() += 1;
        }

        let batch_number = *self.batch_count.lock();
        (
            entries,
            BatchInfo {
                active_subjects,
                total_buffered,
                average_concurrent_subjects,
                batch_number,
            },
        )
    }

    /// Returns per-subject fill/process rates for the window just
    /// completed, resetting counters; returns an empty map if the
    /// 10-second window hasn't elapsed yet.
    pub fn fill_rates(&self) -> HashMap<String, SubjectRate> {
        let mut rates = self.rates.lock();
        let elapsed = rates.window_start.elapsed();
        if elapsed < RATE_WINDOW {
            return HashMap::new();
        }
        let secs = elapsed.as_secs_f64();
        let mut out = HashMap::new();
        let subjects: Vec<String> = rates
            .fill
            .keys()
            .chain(rates.process.keys())
            .cloned()
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        for subject in subjects {
            let fill = *rates.fill.get(&subject).unwrap_or(&0) as f64 / secs;
            let process = *rates.process.get(&subject).unwrap_or(&0) as f64 / secs;
            out.insert(
                subject,
                SubjectRate {
                    fill_rate: fill,
                    process_rate: process,
                    net_rate: fill - process,
                },
            );
        }
        rates.fill.clear();
        rates.process.clear();
        rates.window_start = Instant::now();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_then_drain_preserves_fifo_per_subject() {
        let buf = BatchBuffer::new();
        buf.push("a", json!(1));
        buf.push("a", json!(2));
        buf.push("b", json!(3));

        let (entries, info) = buf.drain(10);
        assert_eq!(entries.len(), 3);
        assert_eq!(info.active_subjects, 2);
        let a_vals: Vec<_> = entries.iter().filter(|e| e.subject == "a").map(|e| e.payload.clone()).collect();
        assert_eq!(a_vals, vec![json!(1), json!(2)]);
    }

    #[test]
    fn drain_respects_limit_across_subjects() {
        let buf = BatchBuffer::new();
        for i in 0..5 {
            buf.push("a", json!(i));
        }
        let (entries, _) = buf.drain(3);
        assert_eq!(entries.len(), 3);
        assert_eq!(buf.total_buffered(), 2);
    }

    #[test]
    fn emptied_subject_is_removed_from_map() {
        let buf = BatchBuffer::new();
        buf.push("a", json!(1));
        let (_, _) = buf.drain(10);
        assert_eq!(buf.subject_buffer_sizes().len(), 0);
    }

    #[test]
    fn fill_rates_empty_before_window_elapses() {
        let buf = BatchBuffer::new();
        buf.push("a", json!(1));
        assert!(buf.fill_rates().is_empty());
    }
}
