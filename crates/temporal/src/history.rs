//! Per-entity temporal history: the sequence of versions a repository
//! assembles from the storage layer's `prev_offset` chain, and the
//! operations computed over it (spec.md section 4.7).
//!
//! Mirrors `VersionedHistory<T>`'s newest-first ordering and
//! construction-time validation, adapted from whole-value versioning to
//! a per-namespace tag collapse: a `Snapshot` is one written version
//! (its own newly asserted tags plus the content as of that write), and
//! `EntityHistory` is the full, non-empty sequence of those snapshots.

use entitydb_core::{Content, ContentHash, Entity, EntityId, Error, Result, Tag, TagText, Timestamp};
use std::collections::{BTreeMap, BTreeSet};

/// One written version: the tags newly asserted at that write, and the
/// content committed alongside them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub tags: Vec<Tag>,
    pub content: Content,
}

impl Snapshot {
    pub fn new(tags: Vec<Tag>, content: Content) -> Self {
        Snapshot { tags, content }
    }
}

/// The collapsed namespace -> winning-tag view `Materialize(T)` produces.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MaterializedView {
    pub as_of: Timestamp,
    pub tags: BTreeMap<String, Tag>,
}

/// One entry of `History`: a point in time at which some namespace's
/// winning tag changed, and the resulting view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub at: Timestamp,
    pub view: MaterializedView,
}

/// `Diff(T1, T2)`'s result: namespace:value pairs gained and lost
/// between the two materialized views, plus whether the content itself
/// changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalDiff {
    pub from: Timestamp,
    pub to: Timestamp,
    pub added: Vec<TagText>,
    pub removed: Vec<TagText>,
    pub content_changed: bool,
}

/// A non-empty sequence of an entity's versions, newest first, with each
/// version's effective timestamp resolved at construction time.
///
/// A version's own timestamp is the maximum of the tags it newly
/// asserted; a version with no tags of its own (an empty `tags` slice on
/// `put`) inherits the timestamp of the version immediately before it,
/// so it never contributes a spurious boundary to `timeline()`.
#[derive(Debug, Clone)]
pub struct EntityHistory {
    id: EntityId,
    snapshots: Vec<(Timestamp, Snapshot)>,
}

impl EntityHistory {
    /// Build from `snapshots` ordered newest first, the same order
    /// `Reader::history_records` returns. `None` if `snapshots` is empty.
    pub fn new(id: EntityId, snapshots: Vec<Snapshot>) -> Option<Self> {
        if snapshots.is_empty() {
            return None;
        }
        let mut dated = Vec::with_capacity(snapshots.len());
        let mut fallback = Timestamp::EPOCH;
        for snapshot in snapshots.into_iter().rev() {
            let effective = snapshot.tags.iter().map(|t| t.timestamp).max().unwrap_or(fallback);
            fallback = effective;
            dated.push((effective, snapshot));
        }
        dated.reverse();
        Some(EntityHistory { id, snapshots: dated })
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Effective timestamp of the oldest version.
    pub fn created_at(&self) -> Timestamp {
        self.snapshots.last().expect("non-empty").0
    }

    /// Effective timestamp of the newest version.
    pub fn updated_at(&self) -> Timestamp {
        self.snapshots.first().expect("non-empty").0
    }

    /// The current (latest) entity view: the newest version's content
    /// paired with the full cumulative tag sequence.
    pub fn current(&self) -> Entity {
        Entity::new(self.id.clone(), self.all_tags().into_iter().cloned().collect(), self.latest_content().clone())
    }

    pub fn latest_content(&self) -> &Content {
        &self.snapshots.first().expect("non-empty").1.content
    }

    /// Every tag ever asserted across every version, oldest first.
    fn all_tags(&self) -> Vec<&Tag> {
        self.snapshots.iter().rev().flat_map(|(_, s)| s.tags.iter()).collect()
    }

    /// The content committed by the latest version whose own timestamp
    /// is at or before `at`.
    fn content_as_of(&self, at: Timestamp) -> &Content {
        for (ts, snapshot) in &self.snapshots {
            if !ts.is_after(at) {
                return &snapshot.content;
            }
        }
        &self.snapshots.last().expect("non-empty").1.content
    }

    /// `Materialize(T)`: for each namespace, the most recent tag with
    /// timestamp <= `at`. A future `at` naturally includes every tag
    /// ever asserted and so returns the current state without any
    /// special case; `at` strictly before the entity's creation is
    /// `pre_existence`.
    pub fn materialize(&self, at: Timestamp) -> Result<MaterializedView> {
        if at.is_before(self.created_at()) {
            return Err(Error::PreExistence {
                id: self.id.as_str().to_string(),
            });
        }
        let mut winners: BTreeMap<String, Tag> = BTreeMap::new();
        for tag in self.all_tags() {
            if tag.timestamp.is_after(at) {
                continue;
            }
            match winners.get(tag.text.namespace()) {
                Some(existing) if existing.timestamp.is_after(tag.timestamp) => {}
                _ => {
                    winners.insert(tag.text.namespace().to_string(), tag.clone());
                }
            }
        }
        Ok(MaterializedView { as_of: at, tags: winners })
    }

    /// The full entity as it stood at `at`: the materialized tag set
    /// paired with the content committed by the version active at that
    /// time. This is what `as_of(id, T)` hands back, one level above the
    /// bare namespace collapse `materialize` computes.
    pub fn entity_as_of(&self, at: Timestamp) -> Result<Entity> {
        let view = self.materialize(at)?;
        let tags = view.tags.into_values().collect();
        Ok(Entity::new(self.id.clone(), tags, self.content_as_of(at).clone()))
    }

    /// `Diff(T1, T2)`: namespace:value pairs gained/lost between the two
    /// materialized views, by full tag-text set equality, plus a
    /// content-hash comparison of the content active at each time.
    pub fn diff(&self, from: Timestamp, to: Timestamp) -> Result<TemporalDiff> {
        if from.is_after(to) {
            return Err(Error::InvalidRange {
                from: from.as_nanos(),
                to: to.as_nanos(),
            });
        }
        let before = self.materialize(from)?;
        let after = self.materialize(to)?;
        let before_set: BTreeSet<&str> = before.tags.values().map(|t| t.text.as_str()).collect();
        let after_set: BTreeSet<&str> = after.tags.values().map(|t| t.text.as_str()).collect();

        let added = after_set
            .difference(&before_set)
            .map(|text| TagText::new(*text).expect("materialized tag text is already valid"))
            .collect();
        let removed = before_set
            .difference(&after_set)
            .map(|text| TagText::new(*text).expect("materialized tag text is already valid"))
            .collect();

        let content_changed = ContentHash::of(&self.content_as_of(from).0) != ContentHash::of(&self.content_as_of(to).0);

        Ok(TemporalDiff {
            from,
            to,
            added,
            removed,
            content_changed,
        })
    }

    /// `History`: every distinct materialized view over time, collapsed
    /// so that a timestamp only produces an entry when it actually
    /// changes the winning tag set (a reassertion that doesn't change
    /// any namespace's winner is not a version boundary).
    pub fn timeline(&self) -> Result<Vec<TimelineEntry>> {
        let timestamps: BTreeSet<Timestamp> = self.all_tags().into_iter().map(|t| t.timestamp).collect();
        let mut out = Vec::new();
        let mut last: Option<BTreeMap<String, Tag>> = None;
        for at in timestamps {
            let view = self.materialize(at)?;
            if last.as_ref() != Some(&view.tags) {
                last = Some(view.tags.clone());
                out.push(TimelineEntry { at, view });
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(nanos: u64, text: &str) -> Tag {
        Tag::new(Timestamp::from_nanos(nanos), TagText::new(text).unwrap())
    }

    fn history() -> EntityHistory {
        let id = EntityId::new("doc_1").unwrap();
        let snapshots = vec![
            // newest first
            Snapshot::new(vec![tag(30, "status:published")], Content(b"v3".to_vec())),
            Snapshot::new(vec![tag(20, "status:review"), tag(20, "type:document")], Content(b"v2".to_vec())),
            Snapshot::new(vec![tag(10, "status:draft")], Content(b"v1".to_vec())),
        ];
        EntityHistory::new(id, snapshots).unwrap()
    }

    #[test]
    fn materialize_collapses_to_most_recent_tag_per_namespace() {
        let h = history();
        let view = h.materialize(Timestamp::from_nanos(25)).unwrap();
        assert_eq!(view.tags.get("status").unwrap().text.as_str(), "status:review");
        assert_eq!(view.tags.get("type").unwrap().text.as_str(), "type:document");
    }

    #[test]
    fn future_timestamp_returns_current_state() {
        let h = history();
        let far_future = h.materialize(Timestamp::from_nanos(1_000_000)).unwrap();
        let now = h.materialize(h.updated_at()).unwrap();
        assert_eq!(far_future.tags, now.tags);
        assert_eq!(far_future.tags.get("status").unwrap().text.as_str(), "status:published");
    }

    #[test]
    fn entity_as_of_pairs_materialized_tags_with_the_content_active_at_that_time() {
        let h = history();
        let at_20 = h.entity_as_of(Timestamp::from_nanos(25)).unwrap();
        assert_eq!(at_20.content.0, b"v2");
        assert!(at_20.tags.iter().any(|t| t.text.as_str() == "status:review"));
    }

    #[test]
    fn timestamp_before_creation_is_pre_existence() {
        let h = history();
        let err = h.materialize(Timestamp::from_nanos(5)).unwrap_err();
        assert!(matches!(err, Error::PreExistence { .. }));
        assert!(!err.is_input_fault());
    }

    #[test]
    fn diff_reports_added_removed_and_content_change() {
        let h = history();
        let diff = h.diff(Timestamp::from_nanos(10), Timestamp::from_nanos(30)).unwrap();
        assert!(diff.content_changed);
        let added: Vec<&str> = diff.added.iter().map(|t| t.as_str()).collect();
        let removed: Vec<&str> = diff.removed.iter().map(|t| t.as_str()).collect();
        assert!(added.contains(&"status:published"));
        assert!(added.contains(&"type:document"));
        assert!(removed.contains(&"status:draft"));
    }

    #[test]
    fn diff_inverted_range_is_invalid_range() {
        let h = history();
        let err = h
            .diff(Timestamp::from_nanos(30), Timestamp::from_nanos(10))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRange { .. }));
    }

    #[test]
    fn timeline_collapses_reassertions_that_do_not_change_the_winner() {
        let id = EntityId::new("doc_2").unwrap();
        let snapshots = vec![
            Snapshot::new(vec![tag(20, "status:draft")], Content(b"v2".to_vec())),
            Snapshot::new(vec![tag(10, "status:draft")], Content(b"v1".to_vec())),
        ];
        let h = EntityHistory::new(id, snapshots).unwrap();
        let entries = h.timeline().unwrap();
        // Same namespace:value reasserted at a later time does not move
        // the winning tag (equality, not a change), so the materialized
        // set is identical and no second boundary is recorded.
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].at, Timestamp::from_nanos(10));
    }

    #[test]
    fn timeline_records_a_boundary_per_actual_change() {
        let h = history();
        let entries = h.timeline().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].at, Timestamp::from_nanos(10));
        assert_eq!(entries[2].at, Timestamp::from_nanos(30));
    }

    #[test]
    fn a_version_with_no_tags_inherits_the_previous_timestamp() {
        let id = EntityId::new("doc_3").unwrap();
        let snapshots = vec![
            Snapshot::new(vec![], Content(b"v2".to_vec())),
            Snapshot::new(vec![tag(10, "status:draft")], Content(b"v1".to_vec())),
        ];
        let h = EntityHistory::new(id, snapshots).unwrap();
        assert_eq!(h.updated_at(), Timestamp::from_nanos(10));
        assert_eq!(h.latest_content().0, b"v2");
    }
}
