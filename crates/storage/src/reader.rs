//! Memory-mapped reader: zero-copy lookups against the data section
//! (spec.md section 4.5). The reader opens its own read-only file
//! handle and mmap, independent of the writer's handle, and re-maps
//! whenever the file has grown past its current view.

use crate::entity_index::EntityIndex;
use entitydb_core::{Entity, EntityId, Error, Result, Tag, TagText, Timestamp};
use entitydb_format::EntityRecord;
use memmap2::{Mmap, MmapOptions};
use parking_lot::Mutex;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;

struct MappedView {
    mmap: Mmap,
    len: u64,
}

/// A pooled, mmap-backed reader over the unified file's data section.
/// Safe to clone cheaply and share across threads: the `Arc<EntityIndex>`
/// is shared with the writer, and the mmap is re-established under a
/// lock whenever a read observes the file has grown.
pub struct Reader {
    path: PathBuf,
    file: File,
    view: Mutex<MappedView>,
    entity_index: Arc<EntityIndex>,
}

impl Reader {
    pub fn open(path: impl AsRef<Path>, entity_index: Arc<EntityIndex>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Reader {
            path,
            file,
            view: Mutex::new(MappedView { mmap, len }),
            entity_index,
        })
    }

    fn remap_if_grown(&self) -> Result<()> {
        let current_len = self.file.metadata()?.len();
        let mut view = self.view.lock();
        if current_len != view.len {
            let mmap = unsafe { MmapOptions::new().map(&self.file)? };
            *view = MappedView {
                mmap,
                len: current_len,
            };
        }
        Ok(())
    }

    fn record_at(&self, offset: u64) -> Result<EntityRecord> {
        self.remap_if_grown()?;
        let view = self.view.lock();
        let buf = &view.mmap[..];
        let offset = offset as usize;
        if offset >= buf.len() {
            return Err(Error::CorruptRecord {
                offset: offset as u64,
                reason: "record offset past end of mapped file".to_string(),
            });
        }
        let (record, _consumed) = EntityRecord::decode(&buf[offset..], offset as u64)?;
        Ok(record)
    }

    /// Look up `id`'s current content alongside its full temporal tag
    /// history (every tag ever asserted across every version, spec.md
    /// section 3), by walking the whole `prev_offset` chain.
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn get(&self, id: &EntityId) -> Result<Option<Entity>> {
        let history = self.history_records(id)?;
        if history.is_empty() {
            return Ok(None);
        }
        Some(assemble_entity(history)).transpose()
    }

    /// Follow the `prev_offset` chain for `id`, oldest last. Returns
    /// every version ever written, newest first.
    pub fn history_records(&self, id: &EntityId) -> Result<Vec<EntityRecord>> {
        let mut out = Vec::new();
        let Some(mut offset) = self.entity_index.get(id) else {
            return Ok(out);
        };
        loop {
            let record = self.record_at(offset)?;
            let prev = record.prev_offset;
            out.push(record);
            if prev == 0 {
                break;
            }
            offset = prev;
        }
        Ok(out)
    }

    /// Reassemble a specific content chunk without materializing the
    /// whole entity, for callers streaming very large content.
    pub fn get_chunk(&self, id: &EntityId, chunk_index: u32) -> Result<Option<Vec<u8>>> {
        let Some(offset) = self.entity_index.get(id) else {
            return Ok(None);
        };
        let record = self.record_at(offset)?;
        Ok(record
            .chunks
            .into_iter()
            .find(|c| c.index == chunk_index)
            .map(|c| c.bytes))
    }

    /// Stream the full content of `id` by concatenating its chunks in
    /// index order.
    pub fn stream_content(&self, id: &EntityId) -> Result<Option<Vec<u8>>> {
        let Some(offset) = self.entity_index.get(id) else {
            return Ok(None);
        };
        let mut record = self.record_at(offset)?;
        record.chunks.sort_by_key(|c| c.index);
        let mut buf = Vec::with_capacity(record.content_len() as usize);
        for chunk in record.chunks {
            buf.extend_from_slice(&chunk.bytes);
        }
        Ok(Some(buf))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Build an `Entity` from its full version history (newest first, as
/// returned by `history_records`). Content comes from the newest version
/// only; tags accumulate across every version in assertion order, since
/// a tag asserted in an older version remains part of the entity's
/// permanent temporal record even after a newer version supersedes it in
/// `Materialize`.
fn assemble_entity(mut history: Vec<EntityRecord>) -> Result<Entity> {
    let latest = history.first_mut().expect("history is non-empty");
    latest.chunks.sort_by_key(|c| c.index);
    let mut content = Vec::with_capacity(latest.content_len() as usize);
    for chunk in &latest.chunks {
        content.extend_from_slice(&chunk.bytes);
    }
    let id = EntityId::new(latest.id.clone())?;

    let mut tags = Vec::new();
    for record in history.iter().rev() {
        for field in &record.tags {
            let text = TagText::new(field.text.clone())?;
            tags.push(Tag::new(Timestamp::from_nanos(field.timestamp_ns), text));
        }
    }

    Ok(Entity::new(id, tags, entitydb_core::Content(content)))
}
