//! Sessions as entities (spec.md sections 4.9, 6, 9): a session is an
//! ordinary entity tagged with the token it answers to, the user it
//! belongs to, and its expiry — expiration is a tag, not a background
//! deletion, so sessions remain subject to the same temporal queries as
//! any other entity.

use entitydb_core::{Entity, EntityId, Tag, TagText, Timestamp};
use std::time::Duration;

/// Default session lifetime (spec.md section 6's configuration table).
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

/// The tag that resolves a session entity by its opaque token
/// (`tag_index.lookup(...)`, per spec.md section 4.9 step 1). Spec.md
/// describes session tokens only as opaque strings, not constrained to
/// the tag grammar, so a token with a character outside
/// `[A-Za-z0-9_-]` simply has no tag to look up — `None`, not a panic.
pub fn session_token_tag(token: &str) -> Option<TagText> {
    TagText::new(format!("has:session:{token}")).ok()
}

fn user_tag(user_id: &EntityId) -> TagText {
    TagText::new(format!("has:user:{}", user_id.as_str())).expect("entity id must already be segment-safe")
}

fn expiry_tag(expires_at: Timestamp) -> TagText {
    TagText::new(format!("conf:expires_at:{}", expires_at.as_nanos())).expect("nanos is always digits")
}

/// Build the tag set for a freshly created session entity. `None` if
/// `token` does not fit the tag grammar.
pub fn new_session_tags(token: &str, user_id: &EntityId, asserted_at: Timestamp, expires_at: Timestamp) -> Option<Vec<Tag>> {
    Some(vec![
        Tag::new(asserted_at, session_token_tag(token)?),
        Tag::new(asserted_at, user_tag(user_id)),
        Tag::new(asserted_at, expiry_tag(expires_at)),
    ])
}

/// Extend a session's lifetime: a fresh `conf:expires_at:<nanos>`
/// assertion, which supersedes the prior one in `Materialize` without
/// erasing the fact that the session was once going to expire earlier.
pub fn refresh_tag(asserted_at: Timestamp, expires_at: Timestamp) -> Tag {
    Tag::new(asserted_at, expiry_tag(expires_at))
}

/// The user id a session entity belongs to, if its tags include a
/// well-formed `has:user:<id>` assertion.
pub fn user_id_of(session: &Entity) -> Option<EntityId> {
    session
        .tags
        .iter()
        .filter(|t| t.text.namespace() == "has")
        .filter_map(|t| t.text.value_after_namespace())
        .find_map(|rest| rest.strip_prefix("user:"))
        .and_then(|id| EntityId::new(id).ok())
}

/// The most recent `conf:expires_at:<nanos>` assertion, if any.
fn current_expiry(session: &Entity) -> Option<Timestamp> {
    session
        .tags
        .iter()
        .filter(|t| t.text.namespace() == "conf")
        .filter_map(|t| t.text.value_after_namespace())
        .filter_map(|rest| rest.strip_prefix("expires_at:"))
        .filter_map(|nanos| nanos.parse::<u64>().ok())
        .map(Timestamp::from_nanos)
        .max()
}

/// Whether `session` has no `expires_at` assertion, or its most recent
/// one is at or before `now`.
pub fn is_expired(session: &Entity, now: Timestamp) -> bool {
    match current_expiry(session) {
        Some(expires_at) => !expires_at.is_after(now),
        None => true,
    }
}
