//! Ambient metrics collection (spec.md section 4.12): atomic counters
//! for the named events the rest of the system wants visible, plus a
//! best-effort latency sample buffer. Grounded in `tracing`'s
//! span/event instrumentation model already used throughout this repo
//! for ambient observability — this module is the place those events
//! accumulate into numbers a caller can snapshot, not a metrics
//! exporter (out of scope per spec.md's non-goals).

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const DEFAULT_LATENCY_SAMPLE_CAPACITY: usize = 1024;

/// A point-in-time read of the collector's counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub wal_sequence: u64,
    pub checkpoint_count: u64,
    pub recovery_passes: u64,
    pub throttle_delayed: u64,
    pub throttle_cache_hits: u64,
    pub operation_counts: Vec<(String, u64)>,
    pub latency_samples: Vec<Duration>,
}

/// Atomic counters plus a bounded latency ring buffer. All counter
/// increments are wait-free; the latency buffer is guarded by a
/// `try_lock` so a contended recorder never blocks its caller — a
/// dropped sample is an acceptable loss, a stalled request path is not.
pub struct MetricsCollector {
    wal_sequence: AtomicU64,
    checkpoint_count: AtomicU64,
    recovery_passes: AtomicU64,
    throttle_delayed: AtomicU64,
    throttle_cache_hits: AtomicU64,
    operation_counts: DashMap<&'static str, AtomicU64>,
    latency_samples: Mutex<VecDeque<Duration>>,
    latency_capacity: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        MetricsCollector::with_latency_capacity(DEFAULT_LATENCY_SAMPLE_CAPACITY)
    }

    pub fn with_latency_capacity(latency_capacity: usize) -> Self {
        MetricsCollector {
            wal_sequence: AtomicU64::new(0),
            checkpoint_count: AtomicU64::new(0),
            recovery_passes: AtomicU64::new(0),
            throttle_delayed: AtomicU64::new(0),
            throttle_cache_hits: AtomicU64::new(0),
            operation_counts: DashMap::new(),
            latency_samples: Mutex::new(VecDeque::new()),
            latency_capacity,
        }
    }

    pub fn record_wal_append(&self, sequence: u64) {
        self.wal_sequence.store(sequence, Ordering::Relaxed);
    }

    pub fn record_checkpoint(&self) {
        self.checkpoint_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recovery_pass(&self) {
        self.recovery_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttle_delay(&self) {
        self.throttle_delayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.throttle_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_operation(&self, operation: &'static str) {
        self.operation_counts.entry(operation).or_insert_with(|| AtomicU64::new(0)).fetch_add(1, Ordering::Relaxed);
    }

    /// Record one latency sample, dropping the oldest once the ring
    /// buffer is full. Never blocks: a contended lock just means the
    /// sample is skipped.
    pub fn record_latency(&self, sample: Duration) {
        if let Some(mut samples) = self.latency_samples.try_lock() {
            if samples.len() >= self.latency_capacity {
                samples.pop_front();
            }
            samples.push_back(sample);
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        let operation_counts = self
            .operation_counts
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().load(Ordering::Relaxed)))
            .collect();
        let latency_samples = self.latency_samples.lock().iter().cloned().collect();

        Snapshot {
            wal_sequence: self.wal_sequence.load(Ordering::Relaxed),
            checkpoint_count: self.checkpoint_count.load(Ordering::Relaxed),
            recovery_passes: self.recovery_passes.load(Ordering::Relaxed),
            throttle_delayed: self.throttle_delayed.load(Ordering::Relaxed),
            throttle_cache_hits: self.throttle_cache_hits.load(Ordering::Relaxed),
            operation_counts,
            latency_samples,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        MetricsCollector::new()
    }
}
