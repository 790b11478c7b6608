//! Entity writer: assembles records, chunks large content, appends to
//! the WAL before committing to the data section, and keeps the
//! in-memory entity/tag indices current (spec.md section 4.3).

use crate::entity_index::EntityIndex;
use crate::file::{check_position, UnifiedFile};
use entitydb_core::{limits, EntityId, Result, Tag};
use entitydb_format::{ChunkDescriptor, EntityRecord, HeaderBlock, TagField};
use entitydb_index::TagIndex;
use entitydb_wal::{CheckpointTrigger, WalRecord, WalSection};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::instrument;

/// Appends new entity versions to the unified file. Exactly one writer
/// should exist per open file; concurrent writers would race on the
/// data section cursor and the header.
pub struct Writer {
    file: UnifiedFile,
    header: HeaderBlock,
    wal: WalSection,
    trigger: CheckpointTrigger,
    data_cursor: AtomicU64,
    entity_index: Arc<EntityIndex>,
    tag_index: Arc<TagIndex>,
}

impl Writer {
    pub fn new(
        file: UnifiedFile,
        header: HeaderBlock,
        entity_index: Arc<EntityIndex>,
        tag_index: Arc<TagIndex>,
    ) -> Self {
        let wal = WalSection::new(header.wal);
        let data_cursor = AtomicU64::new(header.data.offset + header.data.size);
        Writer {
            file,
            header,
            wal,
            trigger: CheckpointTrigger::new(),
            data_cursor,
            entity_index,
            tag_index,
        }
    }

    /// Split content into `limits::DEFAULT_CHUNK_SIZE` chunks once it
    /// exceeds `limits::CHUNKING_THRESHOLD` (spec.md section 4.3).
    fn chunk(content: &[u8]) -> Vec<ChunkDescriptor> {
        if content.len() <= limits::CHUNKING_THRESHOLD {
            return vec![ChunkDescriptor::new(0, content.to_vec())];
        }
        content
            .chunks(limits::DEFAULT_CHUNK_SIZE)
            .enumerate()
            .map(|(i, bytes)| ChunkDescriptor::new(i as u32, bytes.to_vec()))
            .collect()
    }

    /// Append a new version of `id` with `tags` and `content`. Returns
    /// the byte offset of the new record in the data section.
    #[instrument(skip(self, tags, content), fields(entity_id = %id))]
    pub fn put(&mut self, id: &EntityId, tags: &[Tag], content: &[u8]) -> Result<u64> {
        let prev_offset = self.entity_index.get(id).unwrap_or(0);
        let tag_fields: Vec<TagField> = tags
            .iter()
            .map(|t| TagField {
                timestamp_ns: t.timestamp.as_nanos(),
                text: t.text.as_str().to_string(),
            })
            .collect();
        let chunks = Self::chunk(content);
        let record = EntityRecord::new(id.as_str().to_string(), prev_offset, tag_fields, chunks);
        let bytes = record.to_bytes();

        let offset = self.data_cursor.load(Ordering::SeqCst);

        // Log to the WAL before the data section is touched, so a crash
        // between these two writes leaves a replayable record rather
        // than an orphaned data-section write the index never learns of.
        let wal_record = WalRecord::put(
            self.header.wal_sequence + 1,
            id.as_str().to_string(),
            entitydb_core::Timestamp::now().as_nanos(),
            bytes.clone(),
        );
        let sequence = self.wal.append(&mut self.file, &wal_record)?;

        self.file.write_at(offset, &bytes)?;
        self.file.sync()?;

        // Post-write cross-validation against the filesystem itself
        // (spec.md section 4.3), not just our own in-memory bookkeeping:
        // the file's actual length can legitimately exceed where this
        // write lands (the reserved tag-dictionary/entity-index/trailing
        // span always sits ahead of the data cursor), but it must never
        // come up short of it. Coming up short means the write did not
        // land where the writer thought it did — e.g. an astronomical
        // offset corrupting the underlying file — and the chain can no
        // longer be trusted.
        let reported = self.file.file_len()?;
        let expected = offset + bytes.len() as u64;
        check_position(expected, reported)?;

        self.data_cursor.store(offset + bytes.len() as u64, Ordering::SeqCst);
        // The data section grows by exactly the new record's length;
        // shift every section after it forward by the same amount so
        // the offset-ordering invariant (spec.md invariant 5) still
        // holds and the data section never overruns the tag dictionary.
        let grown = bytes.len() as u64;
        self.header.data.size += grown;
        self.header.tag_dict.offset += grown;
        self.header.entity_index.offset += grown;
        self.header.file_size += grown;
        self.header.wal_sequence = sequence;
        self.header.last_modified_ns = entitydb_core::Timestamp::now().as_nanos();
        if prev_offset == 0 {
            self.header.entity_count += 1;
        }
        self.file.set_len(self.header.file_size)?;
        self.file.write_header(&self.header)?;

        self.entity_index.set(id.clone(), offset);
        for tag in tags {
            self.tag_index.add(tag.text.as_str(), id.clone());
        }

        self.trigger.record_put(bytes.len() as u64);
        if self.trigger.should_checkpoint() {
            self.checkpoint()?;
        }

        Ok(offset)
    }

    /// Force a checkpoint: write the header, mark the WAL's checkpoint
    /// sequence, and reset the trigger (spec.md section 4.2).
    #[instrument(skip(self))]
    pub fn checkpoint(&mut self) -> Result<()> {
        let checkpoint_record =
            WalRecord::checkpoint(self.header.wal_sequence + 1, entitydb_core::Timestamp::now().as_nanos());
        let sequence = self.wal.append(&mut self.file, &checkpoint_record)?;
        self.header.wal_sequence = sequence;
        self.header.checkpoint_sequence = sequence;
        self.file.write_header(&self.header)?;
        self.trigger.reset();
        Ok(())
    }

    pub fn header(&self) -> &HeaderBlock {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Tag, TagText, Timestamp};

    fn make_writer(dir: &tempfile::TempDir) -> Writer {
        let path = dir.path().join("store.euff");
        let (file, header) = UnifiedFile::open_or_create(&path).unwrap();
        Writer::new(
            file,
            header,
            Arc::new(EntityIndex::new()),
            Arc::new(TagIndex::new()),
        )
    }

    #[test]
    fn put_appends_record_and_updates_indices() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = make_writer(&dir);
        let id = EntityId::new("doc_1").unwrap();
        let tags = vec![Tag::new(Timestamp::from_nanos(1), TagText::new("status:draft").unwrap())];
        let offset = writer.put(&id, &tags, b"hello").unwrap();
        assert!(offset > 0);
        assert_eq!(writer.entity_index.get(&id), Some(offset));
        assert_eq!(writer.tag_index.lookup("status:draft"), vec![id]);
    }

    #[test]
    fn second_put_chains_prev_offset() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = make_writer(&dir);
        let id = EntityId::new("doc_1").unwrap();
        let t1 = vec![Tag::new(Timestamp::from_nanos(1), TagText::new("status:draft").unwrap())];
        let first_offset = writer.put(&id, &t1, b"v1").unwrap();

        let t2 = vec![Tag::new(Timestamp::from_nanos(2), TagText::new("status:published").unwrap())];
        let second_offset = writer.put(&id, &t2, b"v2").unwrap();
        assert_ne!(first_offset, second_offset);
        assert_eq!(writer.entity_index.get(&id), Some(second_offset));
    }

    #[test]
    fn large_content_is_chunked() {
        let big = vec![7u8; limits::DEFAULT_CHUNK_SIZE + 10];
        let chunks = Writer::chunk(&big);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].bytes.len(), limits::DEFAULT_CHUNK_SIZE);
        assert_eq!(chunks[1].bytes.len(), 10);
    }
}
