//! The unified file (spec.md sections 4.1, 4.3-4.5, 4.8): header and
//! absolute-offset I/O, the append-only writer, the mmap reader, the
//! entity/tag indices they share, and the recovery pipeline that always
//! runs on open.

mod entity_index;
mod file;
mod reader;
mod recovery;
mod retention;
mod writer;

pub use entity_index::EntityIndex;
pub use file::{check_position, UnifiedFile};
pub use reader::Reader;
pub use recovery::{recover, RecoveryOutcome, RecoveryReport};
pub use retention::{Retention, RetentionPolicy};
pub use writer::Writer;

use entitydb_core::Result;
use entitydb_index::TagIndex;
use std::path::Path;
use std::sync::Arc;
use tracing::instrument;

/// Opens a unified file end to end: runs recovery (unconditionally, per
/// spec.md section 4.8) to obtain a trustworthy header and freshly
/// rebuilt indices, then hands back a writer and an independently
/// mmap-backed reader sharing those indices.
pub struct UnifiedStore {
    pub writer: Writer,
    pub reader: Reader,
    pub entity_index: Arc<EntityIndex>,
    pub tag_index: Arc<TagIndex>,
    pub last_recovery: RecoveryReport,
}

impl UnifiedStore {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (file, header) = UnifiedFile::open_for_recovery(path)?;
        let outcome = recovery::recover(&file, header)?;
        let entity_index = Arc::new(outcome.entity_index);
        let tag_index = Arc::new(outcome.tag_index);

        let reader = Reader::open(path, entity_index.clone())?;
        let writer = Writer::new(file, outcome.header, entity_index.clone(), tag_index.clone());

        Ok(UnifiedStore {
            writer,
            reader,
            entity_index,
            tag_index,
            last_recovery: outcome.report,
        })
    }
}
