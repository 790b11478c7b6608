//! In-memory entity index: `entity_id -> latest record offset`. Rebuilt
//! on recovery by scanning the data section (spec.md section 4.8, step
//! 3); persisted lazily at checkpoint time.

use entitydb_core::EntityId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

#[derive(Debug, Default)]
pub struct EntityIndex {
    offsets: RwLock<FxHashMap<EntityId, u64>>,
}

impl EntityIndex {
    pub fn new() -> Self {
        EntityIndex::default()
    }

    pub fn set(&self, id: EntityId, offset: u64) {
        self.offsets.write().insert(id, offset);
    }

    pub fn get(&self, id: &EntityId) -> Option<u64> {
        self.offsets.read().get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.read().is_empty()
    }

    pub fn all_ids(&self) -> Vec<EntityId> {
        self.offsets.read().keys().cloned().collect()
    }

    /// Replace the entire index, used by recovery's rebuild step.
    pub fn replace(&self, entries: impl IntoIterator<Item = (EntityId, u64)>) {
        let mut guard = self.offsets.write();
        guard.clear();
        guard.extend(entries);
    }
}
