//! Error taxonomy (spec.md section 7).
//!
//! `Error` is the aggregate type every crate-local error type converts
//! into via `#[from]`, the same fan-in shape as the teacher's
//! `strata_core::error::Error`. Variants are grouped by fault category
//! in doc comments, not by Rust syntax, since `thiserror` has no notion
//! of sub-enums without an extra indirection layer we don't need here.

use crate::entity::EntityIdError;
use crate::tag::TagError;
use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified fault type.
#[derive(Debug, Error)]
pub enum Error {
    // ---- Input faults: reported to caller, never retried ----
    #[error("invalid tag: {0}")]
    InvalidTag(#[from] TagError),

    #[error("invalid entity id: {0}")]
    InvalidEntityId(#[from] EntityIdError),

    #[error("invalid time range: from {from} is after to {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("duplicate entity id: {0}")]
    DuplicateId(String),

    // ---- Conflict faults: caller should re-read and retry ----
    #[error("entity {id} was not updated: clock did not advance past its last assertion")]
    ConflictMonotonicTs { id: String },

    // ---- Authorization faults: never logged with token material ----
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden: missing permission for {resource}:{action}")]
    Forbidden { resource: String, action: String },

    // ---- Not-found faults ----
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("entity {id} did not exist at the requested timestamp")]
    PreExistence { id: String },

    // ---- Storage faults: trigger recovery on the affected region ----
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    #[error("corrupt record at offset {offset}: {reason}")]
    CorruptRecord { offset: u64, reason: String },

    #[error("position mismatch: writer tracked {tracked}, file reports {reported}")]
    PositionMismatch { tracked: u64, reported: u64 },

    #[error("WAL full: attempted to append {attempted} bytes with {remaining} bytes of capacity remaining")]
    WalFull { attempted: u64, remaining: u64 },

    // ---- Logic faults: engine enters read-only mode ----
    #[error("recovery index logic fault: {0}")]
    IndexLogicFault(String),

    // ---- I/O passthrough ----
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this is an input-validation fault (never retried, never
    /// triggers recovery).
    pub fn is_input_fault(&self) -> bool {
        matches!(
            self,
            Error::InvalidTag(_)
                | Error::InvalidEntityId(_)
                | Error::InvalidRange { .. }
                | Error::InvalidTimestamp(_)
                | Error::DuplicateId(_)
        )
    }

    /// Whether this is a storage fault that should trigger recovery on
    /// the affected region.
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            Error::CorruptHeader(_)
                | Error::CorruptRecord { .. }
                | Error::PositionMismatch { .. }
                | Error::WalFull { .. }
        )
    }

    /// Whether this is a logic fault that must put the engine into
    /// read-only mode and wait for operator intervention.
    pub fn is_logic_fault(&self) -> bool {
        matches!(self, Error::IndexLogicFault(_))
    }

    /// Whether the caller should re-read current state and retry rather
    /// than treat this as a permanent input fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::ConflictMonotonicTs { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_input_faults() {
        assert!(Error::DuplicateId("x".into()).is_input_fault());
        assert!(!Error::DuplicateId("x".into()).is_storage_fault());
    }

    #[test]
    fn classifies_conflict_faults() {
        let err = Error::ConflictMonotonicTs { id: "doc_1".into() };
        assert!(err.is_conflict());
        assert!(!err.is_input_fault());
    }

    #[test]
    fn classifies_storage_faults() {
        let err = Error::PositionMismatch {
            tracked: 10,
            reported: 20,
        };
        assert!(err.is_storage_fault());
        assert!(!err.is_input_fault());
    }

    #[test]
    fn classifies_logic_faults() {
        let err = Error::IndexLogicFault("backward timestamp".into());
        assert!(err.is_logic_fault());
    }

    #[test]
    fn display_includes_context() {
        let err = Error::CorruptRecord {
            offset: 128,
            reason: "bad crc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("128"));
        assert!(msg.contains("bad crc"));
    }
}
