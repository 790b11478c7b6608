//! Checkpoint trigger tracking (spec.md section 4.2): a checkpoint fires
//! when any one of three thresholds is crossed.

use std::time::{Duration, Instant};

/// Default thresholds, mirrored from `entitydb_core::limits`.
const DEFAULT_PUT_THRESHOLD: u64 = entitydb_core::limits::DEFAULT_CHECKPOINT_PUT_THRESHOLD;
const DEFAULT_INTERVAL: Duration =
    Duration::from_secs(entitydb_core::limits::DEFAULT_CHECKPOINT_INTERVAL_SECS);
const DEFAULT_WAL_BYTES: u64 = entitydb_core::limits::DEFAULT_CHECKPOINT_WAL_BYTES;

/// Tracks PUTs, elapsed time, and accumulated WAL bytes since the last
/// checkpoint, and decides when the next one is due.
pub struct CheckpointTrigger {
    put_threshold: u64,
    interval: Duration,
    byte_threshold: u64,

    puts_since_checkpoint: u64,
    bytes_since_checkpoint: u64,
    last_checkpoint: Instant,
}

impl CheckpointTrigger {
    pub fn new() -> Self {
        CheckpointTrigger {
            put_threshold: DEFAULT_PUT_THRESHOLD,
            interval: DEFAULT_INTERVAL,
            byte_threshold: DEFAULT_WAL_BYTES,
            puts_since_checkpoint: 0,
            bytes_since_checkpoint: 0,
            last_checkpoint: Instant::now(),
        }
    }

    pub fn with_thresholds(put_threshold: u64, interval: Duration, byte_threshold: u64) -> Self {
        CheckpointTrigger {
            put_threshold,
            interval,
            byte_threshold,
            puts_since_checkpoint: 0,
            bytes_since_checkpoint: 0,
            last_checkpoint: Instant::now(),
        }
    }

    /// Record a PUT of `record_len` bytes appended to the WAL.
    pub fn record_put(&mut self, record_len: u64) {
        self.puts_since_checkpoint += 1;
        self.bytes_since_checkpoint += record_len;
    }

    /// Whether a checkpoint should run now.
    pub fn should_checkpoint(&self) -> bool {
        self.puts_since_checkpoint >= self.put_threshold
            || self.last_checkpoint.elapsed() >= self.interval
            || self.bytes_since_checkpoint >= self.byte_threshold
    }

    /// Reset counters after a checkpoint has been written.
    pub fn reset(&mut self) {
        self.puts_since_checkpoint = 0;
        self.bytes_since_checkpoint = 0;
        self.last_checkpoint = Instant::now();
    }
}

impl Default for CheckpointTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_put_count() {
        let mut trigger = CheckpointTrigger::with_thresholds(3, Duration::from_secs(3600), u64::MAX);
        assert!(!trigger.should_checkpoint());
        trigger.record_put(10);
        trigger.record_put(10);
        assert!(!trigger.should_checkpoint());
        trigger.record_put(10);
        assert!(trigger.should_checkpoint());
    }

    #[test]
    fn fires_on_byte_count() {
        let mut trigger = CheckpointTrigger::with_thresholds(u64::MAX, Duration::from_secs(3600), 100);
        trigger.record_put(60);
        assert!(!trigger.should_checkpoint());
        trigger.record_put(60);
        assert!(trigger.should_checkpoint());
    }

    #[test]
    fn reset_clears_counters() {
        let mut trigger = CheckpointTrigger::with_thresholds(1, Duration::from_secs(3600), u64::MAX);
        trigger.record_put(1);
        assert!(trigger.should_checkpoint());
        trigger.reset();
        assert!(!trigger.should_checkpoint());
    }
}
