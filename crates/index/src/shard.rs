//! A single index shard: one `tag_text -> sorted_set<entity_id>` map
//! behind its own reader-writer lock.

use entitydb_core::EntityId;
use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct Shard {
    entries: FxHashMap<String, BTreeSet<EntityId>>,
}

impl Shard {
    pub fn new() -> Self {
        Shard::default()
    }

    pub fn add(&mut self, tag_text: &str, entity_id: EntityId) {
        self.entries
            .entry(tag_text.to_string())
            .or_default()
            .insert(entity_id);
    }

    pub fn remove(&mut self, tag_text: &str, entity_id: &EntityId) {
        if let Some(set) = self.entries.get_mut(tag_text) {
            set.remove(entity_id);
            if set.is_empty() {
                self.entries.remove(tag_text);
            }
        }
    }

    pub fn lookup(&self, tag_text: &str) -> Vec<EntityId> {
        self.entries
            .get(tag_text)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn lookup_prefix(&self, prefix: &str) -> Vec<EntityId> {
        let mut out = BTreeSet::new();
        for (text, set) in &self.entries {
            if text.starts_with(prefix) {
                out.extend(set.iter().cloned());
            }
        }
        out.into_iter().collect()
    }

    pub fn tag_count(&self) -> usize {
        self.entries.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.values().map(|set| set.len()).sum()
    }
}
