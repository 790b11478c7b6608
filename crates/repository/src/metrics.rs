//! `RepositoryMetrics`: the repository's view onto
//! `entitydb-gateway::MetricsCollector` (spec.md section 4.6's
//! supplement) — every public operation times itself and feeds the
//! shared collector, following the teacher's ambient-instrumentation
//! choice (`tracing` spans plus a counter sink) rather than a bespoke
//! per-crate metrics type.

use entitydb_gateway::MetricsCollector;
use std::time::Instant;

pub struct RepositoryMetrics {
    collector: MetricsCollector,
}

impl RepositoryMetrics {
    pub fn new() -> Self {
        RepositoryMetrics { collector: MetricsCollector::new() }
    }

    /// Record one completed operation and its latency.
    pub fn record(&self, operation: &'static str, started_at: Instant) {
        self.collector.record_operation(operation);
        self.collector.record_latency(started_at.elapsed());
    }

    pub fn collector(&self) -> &MetricsCollector {
        &self.collector
    }
}

impl Default for RepositoryMetrics {
    fn default() -> Self {
        RepositoryMetrics::new()
    }
}
