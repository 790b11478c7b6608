//! Session resolution and the RBAC predicate (spec.md sections 4.9, 9).
//!
//! `authorize` is expressed over a `SessionResolver` capability rather
//! than a concrete store, per spec.md section 9's "polymorphism instead
//! of inheritance": the single real implementation lives in
//! `entitydb-repository`, which already holds the tag index and reader
//! this crate needs to resolve a token to a user entity.

mod rbac;
mod session;

pub use rbac::authorize_entity;
pub use session::{
    is_expired, new_session_tags, refresh_tag, session_token_tag, user_id_of, DEFAULT_SESSION_TTL,
};

use entitydb_core::{Entity, EntityId, Error, Result, Timestamp};
use tracing::instrument;

/// Resolves the two reads `authorize` needs: the session entity behind
/// a token, and the user entity a session belongs to. The predicate
/// itself does no writing (spec.md section 4.9: "never writes during
/// evaluation").
pub trait SessionResolver {
    fn resolve_session(&self, token: &str) -> Option<Entity>;
    fn resolve_user(&self, user_id: &EntityId) -> Option<Entity>;
}

/// `authorize(session_token, resource, action)` (spec.md section 4.9):
/// resolve the session, reject an unknown or expired one as
/// `Unauthenticated`, resolve its user, and evaluate the RBAC predicate
/// against `resource:action`, returning `Forbidden` on a denied but
/// otherwise valid session.
#[instrument(skip(resolver), fields(resource, action))]
pub fn authorize(
    resolver: &impl SessionResolver,
    session_token: &str,
    resource: &str,
    action: &str,
    now: Timestamp,
) -> Result<()> {
    let session = resolver.resolve_session(session_token).ok_or(Error::Unauthenticated)?;
    if is_expired(&session, now) {
        return Err(Error::Unauthenticated);
    }
    let user_id = user_id_of(&session).ok_or(Error::Unauthenticated)?;
    let user = resolver.resolve_user(&user_id).ok_or(Error::Unauthenticated)?;

    if authorize_entity(&user, resource, action) {
        Ok(())
    } else {
        Err(Error::Forbidden {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_core::{Content, Tag, TagText};
    use std::collections::HashMap;

    struct FakeResolver {
        sessions: HashMap<String, Entity>,
        users: HashMap<EntityId, Entity>,
    }

    impl SessionResolver for FakeResolver {
        fn resolve_session(&self, token: &str) -> Option<Entity> {
            self.sessions.get(token).cloned()
        }
        fn resolve_user(&self, user_id: &EntityId) -> Option<Entity> {
            self.users.get(user_id).cloned()
        }
    }

    fn fixture() -> FakeResolver {
        let user_id = EntityId::new("user_1").unwrap();
        let session_tags =
            new_session_tags("tok-valid", &user_id, Timestamp::from_nanos(1), Timestamp::from_nanos(1_000_000)).unwrap();
        let session = Entity::new(EntityId::new("session_1").unwrap(), session_tags, Content::default());

        let user_tags = vec![
            Tag::new(Timestamp::from_nanos(1), TagText::new("type:user").unwrap()),
            Tag::new(Timestamp::from_nanos(1), TagText::new("rbac:role:user").unwrap()),
            Tag::new(Timestamp::from_nanos(1), TagText::new("rbac:perm:entity:view").unwrap()),
        ];
        let user = Entity::new(user_id.clone(), user_tags, Content::default());

        let mut sessions = HashMap::new();
        sessions.insert("tok-valid".to_string(), session);
        let mut users = HashMap::new();
        users.insert(user_id, user);
        FakeResolver { sessions, users }
    }

    #[test]
    fn allows_a_permitted_operation() {
        let resolver = fixture();
        assert!(authorize(&resolver, "tok-valid", "entity", "view", Timestamp::from_nanos(2)).is_ok());
    }

    #[test]
    fn denies_an_unpermitted_operation_as_forbidden() {
        let resolver = fixture();
        let err = authorize(&resolver, "tok-valid", "entity", "create", Timestamp::from_nanos(2)).unwrap_err();
        assert!(matches!(err, Error::Forbidden { .. }));
    }

    #[test]
    fn unknown_token_is_unauthenticated() {
        let resolver = fixture();
        let err = authorize(&resolver, "tok-missing", "entity", "view", Timestamp::from_nanos(2)).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }

    #[test]
    fn expired_session_is_unauthenticated_not_forbidden() {
        let resolver = fixture();
        let err = authorize(&resolver, "tok-valid", "entity", "view", Timestamp::from_nanos(10_000_000)).unwrap_err();
        assert!(matches!(err, Error::Unauthenticated));
    }
}
