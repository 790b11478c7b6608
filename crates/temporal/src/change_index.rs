//! `Changes(since T)`: the index of entities whose maximum tag timestamp
//! exceeds `T` (spec.md section 4.7). Maintained incrementally by the
//! writer/repository on every put, mirroring the teacher's one
//! `parking_lot::RwLock`-guarded map per maintained index.

use entitydb_core::{EntityId, Timestamp};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;

/// Entities keyed by their current `updated_at`, so `since(T)` is a
/// single range scan rather than a full walk of every entity. A side
/// map tracks each entity's current bucket so `record` can remove the
/// stale one instead of leaving it behind.
#[derive(Debug, Default)]
pub struct ChangeIndex {
    by_timestamp: RwLock<BTreeMap<Timestamp, Vec<EntityId>>>,
    current: RwLock<std::collections::HashMap<EntityId, Timestamp>>,
}

impl ChangeIndex {
    pub fn new() -> Self {
        ChangeIndex::default()
    }

    /// Record that `id`'s maximum tag timestamp is now `updated_at`.
    /// Removes `id` from whatever bucket it was last recorded under, so
    /// each entity ever appears in exactly one bucket at a time and
    /// `since` never returns it twice.
    pub fn record(&self, id: EntityId, updated_at: Timestamp) {
        let mut current = self.current.write();
        let mut by_timestamp = self.by_timestamp.write();
        if let Some(old) = current.insert(id.clone(), updated_at) {
            if let Some(bucket) = by_timestamp.get_mut(&old) {
                bucket.retain(|existing| existing != &id);
                if bucket.is_empty() {
                    by_timestamp.remove(&old);
                }
            }
        }
        by_timestamp.entry(updated_at).or_default().push(id);
    }

    /// Entities whose maximum tag timestamp is strictly greater than
    /// `since`.
    pub fn since(&self, since: Timestamp) -> Vec<EntityId> {
        self.by_timestamp
            .read()
            .range((Bound::Excluded(since), Bound::Unbounded))
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
