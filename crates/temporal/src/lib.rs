//! Temporal engine: `Materialize`, `Diff`, `History`, and `Changes` over
//! an entity's timestamped tag sequence (spec.md section 4.7).
//!
//! This crate has no knowledge of the unified file; `entitydb-repository`
//! assembles an `EntityHistory` from `Reader::history_records` and calls
//! into the operations here.

mod change_index;
mod history;
mod input;

pub use change_index::ChangeIndex;
pub use history::{EntityHistory, MaterializedView, Snapshot, TemporalDiff, TimelineEntry};
pub use input::parse_timestamp;
