//! 256-way sharded tag index.

use crate::shard::Shard;
use entitydb_core::EntityId;
use parking_lot::RwLock;
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tracing::debug;

/// Number of shards the tag space is partitioned into (spec.md section
/// 4.4). Fixed at build time; not config-tunable, since changing it would
/// require a full index rebuild.
pub const SHARD_COUNT: usize = 256;

/// Diagnostic counts for one shard, used by the recovery/metrics paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardStats {
    pub tag_count: usize,
    pub entry_count: usize,
}

/// `tag_text -> sorted_set<entity_id>`, partitioned across 256 shards by
/// a hash of the tag text, each behind its own reader-writer lock so
/// writers on unrelated tags never contend.
pub struct TagIndex {
    shards: Vec<RwLock<Shard>>,
}

impl TagIndex {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        shards.resize_with(SHARD_COUNT, || RwLock::new(Shard::new()));
        TagIndex { shards }
    }

    fn shard_for(&self, tag_text: &str) -> &RwLock<Shard> {
        let mut hasher = FxHasher::default();
        tag_text.hash(&mut hasher);
        let index = (hasher.finish() as usize) % SHARD_COUNT;
        &self.shards[index]
    }

    pub fn add(&self, tag_text: &str, entity_id: EntityId) {
        self.shard_for(tag_text).write().add(tag_text, entity_id);
    }

    pub fn remove(&self, tag_text: &str, entity_id: &EntityId) {
        self.shard_for(tag_text).write().remove(tag_text, entity_id);
    }

    /// Exact lookup: entity ids tagged with `tag_text` at some point in
    /// their history.
    pub fn lookup(&self, tag_text: &str) -> Vec<EntityId> {
        self.shard_for(tag_text).read().lookup(tag_text)
    }

    /// Prefix lookup used by RBAC wildcard resolution
    /// (`rbac:perm:doc:*`). Unlike `lookup`, this must scan every shard
    /// since a prefix can span shards the hash partitioning has no
    /// knowledge of.
    pub fn lookup_prefix(&self, prefix: &str) -> Vec<EntityId> {
        let mut out = std::collections::BTreeSet::new();
        for shard in &self.shards {
            out.extend(shard.read().lookup_prefix(prefix));
        }
        out.into_iter().collect()
    }

    pub fn shard_stats(&self) -> Vec<ShardStats> {
        self.shards
            .iter()
            .map(|shard| {
                let guard = shard.read();
                ShardStats {
                    tag_count: guard.tag_count(),
                    entry_count: guard.entry_count(),
                }
            })
            .collect()
    }

    pub fn total_entries(&self) -> usize {
        self.shard_stats().iter().map(|s| s.entry_count).sum()
    }

    /// Rebuild the index from scratch given the full set of (tag_text,
    /// entity_id) pairs observed during recovery (spec.md section 4.8,
    /// step 4). Replaces all shards; callers must not read concurrently.
    pub fn rebuild(pairs: impl IntoIterator<Item = (String, EntityId)>) -> Self {
        let index = TagIndex::new();
        let mut count = 0usize;
        for (tag_text, entity_id) in pairs {
            index.add(&tag_text, entity_id);
            count += 1;
        }
        debug!(count, "tag index rebuilt");
        index
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> EntityId {
        EntityId::new(s).unwrap()
    }

    #[test]
    fn add_and_lookup_across_many_tags_distributes_across_shards() {
        let index = TagIndex::new();
        for i in 0..1000 {
            index.add(&format!("tag:{i}"), id(&format!("doc_{i}")));
        }
        let stats = index.shard_stats();
        let used_shards = stats.iter().filter(|s| s.tag_count > 0).count();
        assert!(used_shards > 1, "expected tags to spread across shards");
        assert_eq!(index.total_entries(), 1000);
    }

    #[test]
    fn lookup_prefix_spans_shards() {
        let index = TagIndex::new();
        index.add("rbac:perm:doc:read", id("doc_1"));
        index.add("rbac:perm:doc:write", id("doc_2"));
        index.add("rbac:role:admin", id("doc_3"));

        let mut results = index.lookup_prefix("rbac:perm:doc:");
        results.sort();
        assert_eq!(results, vec![id("doc_1"), id("doc_2")]);
    }

    #[test]
    fn remove_drops_entity_from_lookup() {
        let index = TagIndex::new();
        index.add("status:active", id("doc_1"));
        index.remove("status:active", &id("doc_1"));
        assert!(index.lookup("status:active").is_empty());
    }

    #[test]
    fn rebuild_reconstructs_from_pairs() {
        let pairs = vec![
            ("status:active".to_string(), id("doc_1")),
            ("status:active".to_string(), id("doc_2")),
        ];
        let index = TagIndex::rebuild(pairs);
        let mut results = index.lookup("status:active");
        results.sort();
        assert_eq!(results, vec![id("doc_1"), id("doc_2")]);
    }
}
