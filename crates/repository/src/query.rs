//! `query(filters)` (spec.md section 4.6): tag conjunction with AND
//! semantics ("a historic bug treated this as OR; the fix is now part
//! of the contract"), an optional namespace filter, and an optional
//! content substring filter.

use entitydb_core::{Entity, EntityId, TagText};
use std::collections::BTreeSet;

/// Filters combined with AND: an entity must match every tag in
/// `tags`, and (if present) carry some tag in `namespace` and contain
/// `content_substring` in its current content.
#[derive(Debug, Clone, Default)]
pub struct QueryFilters {
    pub tags: Vec<TagText>,
    pub namespace: Option<String>,
    pub content_substring: Option<Vec<u8>>,
}

/// Intersect per-tag candidate sets. `lookup` resolves one tag's
/// matching entity ids (the tag index already does the equality
/// lookup); `None` candidates means "no tag filter", deferring to
/// `all_ids` for the starting set.
pub fn intersect_candidates(tags: &[TagText], lookup: impl Fn(&str) -> Vec<EntityId>) -> Option<BTreeSet<EntityId>> {
    let mut candidates: Option<BTreeSet<EntityId>> = None;
    for tag in tags {
        let matched: BTreeSet<EntityId> = lookup(tag.as_str()).into_iter().collect();
        candidates = Some(match candidates {
            Some(prev) => prev.intersection(&matched).cloned().collect(),
            None => matched,
        });
    }
    candidates
}

/// Whether `entity` passes the non-tag filters (tag conjunction is
/// already applied by the caller via `intersect_candidates`).
pub fn matches(entity: &Entity, filters: &QueryFilters) -> bool {
    if let Some(namespace) = &filters.namespace {
        if !entity.tags.iter().any(|t| t.text.namespace() == namespace) {
            return false;
        }
    }
    if let Some(substring) = &filters.content_substring {
        if !contains_subslice(&entity.content.0, substring) {
            return false;
        }
    }
    true
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() {
        return true;
    }
    if needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Content, Tag, Timestamp};

    fn entity(tags: &[&str], content: &[u8]) -> Entity {
        let tags = tags.iter().map(|t| Tag::new(Timestamp::from_nanos(1), TagText::new(*t).unwrap())).collect();
        Entity::new(EntityId::new("doc_1").unwrap(), tags, Content(content.to_vec()))
    }

    #[test]
    fn intersect_candidates_applies_and_semantics() {
        let a = EntityId::new("a").unwrap();
        let b = EntityId::new("b").unwrap();
        let c = EntityId::new("c").unwrap();
        let lookup = |tag: &str| -> Vec<EntityId> {
            match tag {
                "type:document" => vec![a.clone(), b.clone()],
                "status:draft" => vec![b.clone(), c.clone()],
                _ => vec![],
            }
        };
        let tags = vec![TagText::new("type:document").unwrap(), TagText::new("status:draft").unwrap()];
        let result = intersect_candidates(&tags, lookup).unwrap();
        assert_eq!(result, BTreeSet::from([b]));
    }

    #[test]
    fn no_tag_filter_yields_no_candidate_restriction() {
        let result = intersect_candidates(&[], |_| vec![]);
        assert!(result.is_none());
    }

    #[test]
    fn namespace_filter_requires_a_matching_tag() {
        let e = entity(&["type:document", "status:draft"], b"hello");
        let filters = QueryFilters {
            tags: vec![],
            namespace: Some("status".to_string()),
            content_substring: None,
        };
        assert!(matches(&e, &filters));

        let filters_miss = QueryFilters {
            namespace: Some("rbac".to_string()),
            ..filters
        };
        assert!(!matches(&e, &filters_miss));
    }

    #[test]
    fn content_substring_filter() {
        let e = entity(&["type:document"], b"hello world");
        let filters = QueryFilters {
            tags: vec![],
            namespace: None,
            content_substring: Some(b"wor".to_vec()),
        };
        assert!(matches(&e, &filters));

        let filters_miss = QueryFilters {
            content_substring: Some(b"xyz".to_vec()),
            ..filters
        };
        assert!(!matches(&e, &filters_miss));
    }
}
