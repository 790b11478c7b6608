//! The 256-way sharded tag index (spec.md section 4.4): `tag_text ->
//! sorted_set<entity_id>`, partitioned by a hash of the tag text so
//! writers on unrelated tags never contend for the same lock.

mod shard;
mod tag_index;

pub use tag_index::{ShardStats, TagIndex};
