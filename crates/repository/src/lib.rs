//! The entity repository (spec.md section 4.6): the public contract
//! surface above storage, the tag index, and the temporal engine.
//! Grounded in `strata-engine::database`'s facade-over-`Arc`-handles
//! shape and its `coordinator.rs`'s per-operation `tracing::instrument`
//! spans; the per-entity striped lock table is grounded in
//! `strata-concurrency::manager`'s per-branch commit lock.

mod locks;
mod metrics;
mod query;
mod session_resolver;

pub use locks::StripedLocks;
pub use metrics::RepositoryMetrics;
pub use query::QueryFilters;
pub use session_resolver::RepositorySessionResolver;

use entitydb_core::{Content, Entity, EntityId, Error, Result, Tag, TagText, Timestamp};
use entitydb_format::EntityRecord;
use entitydb_index::TagIndex;
use entitydb_storage::{EntityIndex, Reader, UnifiedStore, Writer};
use entitydb_temporal::{ChangeIndex, EntityHistory, Snapshot, TemporalDiff, TimelineEntry};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Orchestrates the WAL/storage writer, the mmap reader, the tag and
/// entity indices, and the temporal engine behind the single contract
/// surface `spec.md` section 4.6 names. The sole component allowed to
/// drive a write through `Writer::put` (which itself upholds "WAL
/// before data section" at its own layer).
pub struct Repository {
    writer: Mutex<Writer>,
    reader: Arc<Reader>,
    entity_index: Arc<EntityIndex>,
    tag_index: Arc<TagIndex>,
    change_index: Arc<ChangeIndex>,
    locks: StripedLocks,
    metrics: RepositoryMetrics,
}

fn record_to_snapshot(mut record: EntityRecord) -> Result<Snapshot> {
    record.chunks.sort_by_key(|c| c.index);
    let mut content = Vec::with_capacity(record.content_len() as usize);
    for chunk in &record.chunks {
        content.extend_from_slice(&chunk.bytes);
    }
    let tags = record
        .tags
        .iter()
        .map(|field| {
            Ok(Tag::new(
                Timestamp::from_nanos(field.timestamp_ns),
                entitydb_core::TagText::new(field.text.clone())?,
            ))
        })
        .collect::<Result<Vec<Tag>>>()?;
    Ok(Snapshot::new(tags, Content(content)))
}

fn not_found(id: &EntityId) -> Error {
    Error::NotFound(id.as_str().to_string())
}

impl Repository {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = UnifiedStore::open(path)?;
        let reader = Arc::new(store.reader);
        let change_index = Arc::new(ChangeIndex::new());

        for id in store.entity_index.all_ids() {
            if let Some(entity) = reader.get(&id)? {
                if let Some(updated_at) = entity.updated_at() {
                    change_index.record(id, updated_at);
                }
            }
        }

        Ok(Repository {
            writer: Mutex::new(store.writer),
            reader,
            entity_index: store.entity_index,
            tag_index: store.tag_index,
            change_index,
            locks: StripedLocks::new(),
            metrics: RepositoryMetrics::new(),
        })
    }

    /// A `SessionResolver` backed by this repository's own tag index and
    /// reader, for `entitydb_security::authorize`.
    pub fn session_resolver(&self) -> RepositorySessionResolver {
        RepositorySessionResolver::new(self.reader.clone(), self.tag_index.clone())
    }

    pub fn metrics(&self) -> &RepositoryMetrics {
        &self.metrics
    }

    /// `create(entity)`: id must not already exist; tags are stamped
    /// with a single assertion timestamp, same as every tag in a create
    /// belongs to the same version.
    #[instrument(skip(self, tags, content), fields(entity_id = %id))]
    pub fn create(&self, id: &EntityId, tags: Vec<TagText>, content: &[u8]) -> Result<Entity> {
        let started_at = Instant::now();
        let _guard = self.locks.lock(id);
        if self.entity_index.get(id).is_some() {
            return Err(Error::DuplicateId(id.as_str().to_string()));
        }
        let now = Timestamp::now();
        let tags: Vec<Tag> = tags.into_iter().map(|t| Tag::new(now, t)).collect();
        self.writer.lock().put(id, &tags, content)?;
        self.change_index.record(id.clone(), now);
        self.metrics.record("create", started_at);
        self.reader.get(id)?.ok_or_else(|| not_found(id))
    }

    /// `get(id)`: the latest version, assembled with its full temporal
    /// tag sequence.
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn get(&self, id: &EntityId) -> Result<Entity> {
        let started_at = Instant::now();
        let entity = self.reader.get(id)?.ok_or_else(|| not_found(id))?;
        self.metrics.record("get", started_at);
        Ok(entity)
    }

    /// `update(id, tag_delta, content?)`: a fresh version stamped at
    /// `Timestamp::now()`. If the clock has not advanced past the
    /// entity's last assertion (e.g. a backward clock step), the update
    /// is refused as `conflict_monotonic_ts` rather than silently
    /// violating invariant 1 (strictly increasing tag timestamps).
    #[instrument(skip(self, tag_delta, content), fields(entity_id = %id))]
    pub fn update(&self, id: &EntityId, tag_delta: Vec<TagText>, content: Option<&[u8]>) -> Result<Entity> {
        let started_at = Instant::now();
        let _guard = self.locks.lock(id);
        let existing = self.reader.get(id)?.ok_or_else(|| not_found(id))?;
        let last = existing.updated_at().unwrap_or(Timestamp::EPOCH);
        let now = Timestamp::now();
        if !now.is_after(last) {
            return Err(Error::ConflictMonotonicTs { id: id.as_str().to_string() });
        }
        let tags: Vec<Tag> = tag_delta.into_iter().map(|t| Tag::new(now, t)).collect();
        let new_content = content.unwrap_or(&existing.content.0);
        self.writer.lock().put(id, &tags, new_content)?;
        self.change_index.record(id.clone(), now);
        self.metrics.record("update", started_at);
        self.reader.get(id)?.ok_or_else(|| not_found(id))
    }

    /// `list_by_tag(tag_text)`: empty on a miss, never an error.
    #[instrument(skip(self))]
    pub fn list_by_tag(&self, tag_text: &TagText) -> Vec<EntityId> {
        self.tag_index.lookup(tag_text.as_str())
    }

    /// `query(filters)`: AND conjunction across `filters.tags`, narrowed
    /// further by an optional namespace and content substring.
    #[instrument(skip(self, filters))]
    pub fn query(&self, filters: &QueryFilters) -> Result<Vec<Entity>> {
        let candidates = query::intersect_candidates(&filters.tags, |text| self.tag_index.lookup(text));
        let ids: Vec<EntityId> = match candidates {
            Some(set) => set.into_iter().collect(),
            None => self.entity_index.all_ids(),
        };
        let mut results = Vec::new();
        for id in ids {
            let Some(entity) = self.reader.get(&id)? else { continue };
            if query::matches(&entity, filters) {
                results.push(entity);
            }
        }
        Ok(results)
    }

    fn history_of(&self, id: &EntityId) -> Result<Option<EntityHistory>> {
        let records = self.reader.history_records(id)?;
        if records.is_empty() {
            return Ok(None);
        }
        let snapshots = records.into_iter().map(record_to_snapshot).collect::<Result<Vec<_>>>()?;
        Ok(EntityHistory::new(id.clone(), snapshots))
    }

    /// `as_of(id, T)`: the version active at `T`.
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn as_of(&self, id: &EntityId, at: Timestamp) -> Result<Entity> {
        let history = self.history_of(id)?.ok_or_else(|| not_found(id))?;
        history.entity_as_of(at)
    }

    /// `history(id, [from, to])`: every distinct version boundary
    /// within the optional range (the whole timeline if `range` is
    /// `None`).
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn history(&self, id: &EntityId, range: Option<(Timestamp, Timestamp)>) -> Result<Vec<TimelineEntry>> {
        let history = self.history_of(id)?.ok_or_else(|| not_found(id))?;
        let timeline = history.timeline()?;
        Ok(match range {
            Some((from, to)) => timeline.into_iter().filter(|entry| !entry.at.is_before(from) && !entry.at.is_after(to)).collect(),
            None => timeline,
        })
    }

    /// `diff(id, T1, T2)`.
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn diff(&self, id: &EntityId, from: Timestamp, to: Timestamp) -> Result<TemporalDiff> {
        let history = self.history_of(id)?.ok_or_else(|| not_found(id))?;
        history.diff(from, to)
    }

    /// `changes(since T)`: ids whose maximum tag timestamp exceeds `T`.
    #[instrument(skip(self))]
    pub fn changes(&self, since: Timestamp) -> Vec<EntityId> {
        self.change_index.since(since)
    }

    /// `get_chunk(id, chunk_index)`: one chunk of the current version's
    /// content, without assembling the whole thing (spec.md section
    /// 4.4's reader capability surface).
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn get_chunk(&self, id: &EntityId, chunk_index: u32) -> Result<Vec<u8>> {
        self.reader.get_chunk(id, chunk_index)?.ok_or_else(|| not_found(id))
    }

    /// `stream_content(id)`: the current version's content, chunks
    /// concatenated in index order.
    #[instrument(skip(self), fields(entity_id = %id))]
    pub fn stream_content(&self, id: &EntityId) -> Result<Vec<u8>> {
        self.reader.stream_content(id)?.ok_or_else(|| not_found(id))
    }
}
