//! Size and threshold constants referenced throughout the engine.
//!
//! Grouped in one `Limits` struct (teacher's `strata_core::limits::Limits`
//! shape) rather than scattered module-level constants, so the writer,
//! WAL, and repository can all construct one from config.

/// Default content chunk size: 4 MiB (spec.md section 4.3).
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Content larger than this is split into chunks.
pub const CHUNKING_THRESHOLD: usize = DEFAULT_CHUNK_SIZE;

/// Checkpoint trigger: PUT count since last checkpoint.
pub const DEFAULT_CHECKPOINT_PUT_THRESHOLD: u64 = 1000;

/// Checkpoint trigger: elapsed wall-clock time.
pub const DEFAULT_CHECKPOINT_INTERVAL_SECS: u64 = 5 * 60;

/// Checkpoint trigger: accumulated WAL bytes.
pub const DEFAULT_CHECKPOINT_WAL_BYTES: u64 = 100 * 1024 * 1024;

/// Offsets at or past this bound are treated as corrupt (spec.md
/// invariant 5: a defensive upper bound well below realistic file sizes
/// that still fits comfortably in a `u64` section-size field).
pub const MAX_VALID_OFFSET: u64 = 1 << 31;

/// Default session TTL.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 60 * 60;

/// Runtime-tunable limits. Everything here has a spec-mandated or
/// teacher-grounded default; construct via `Limits::default()` and
/// override individual fields from the config resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub chunk_size: usize,
    pub checkpoint_put_threshold: u64,
    pub checkpoint_interval_secs: u64,
    pub checkpoint_wal_bytes: u64,
    pub max_entity_id_bytes: usize,
    pub session_ttl_secs: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            checkpoint_put_threshold: DEFAULT_CHECKPOINT_PUT_THRESHOLD,
            checkpoint_interval_secs: DEFAULT_CHECKPOINT_INTERVAL_SECS,
            checkpoint_wal_bytes: DEFAULT_CHECKPOINT_WAL_BYTES,
            max_entity_id_bytes: crate::entity::MAX_ENTITY_ID_BYTES,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}
