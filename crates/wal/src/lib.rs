//! Write-ahead log operations over a section of the unified file
//! (spec.md section 4.2): append, replay, and checkpoint triggers.
//!
//! This crate does not own a `File`; it operates against anything that
//! implements [`WalBackend`], so `entitydb-storage` can hand it a view
//! over the real unified file while tests exercise it against an
//! in-memory buffer.

mod backend;
mod section;
mod trigger;

pub use backend::WalBackend;
pub use entitydb_format::{WalRecord, WalRecordType};
pub use section::{ReplayOutcome, WalSection};
pub use trigger::CheckpointTrigger;
