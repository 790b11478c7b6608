//! The repository's `SessionResolver` implementation (spec.md section
//! 9's polymorphism note): the only place the two lookups `authorize`
//! needs — token to session entity, user id to user entity — actually
//! touch the tag index and reader. `entitydb-security` stays ignorant
//! of storage entirely.

use entitydb_core::{Entity, EntityId};
use entitydb_index::TagIndex;
use entitydb_security::{session_token_tag, SessionResolver};
use entitydb_storage::Reader;
use std::sync::Arc;

pub struct RepositorySessionResolver {
    reader: Arc<Reader>,
    tag_index: Arc<TagIndex>,
}

impl RepositorySessionResolver {
    pub fn new(reader: Arc<Reader>, tag_index: Arc<TagIndex>) -> Self {
        RepositorySessionResolver { reader, tag_index }
    }
}

impl SessionResolver for RepositorySessionResolver {
    fn resolve_session(&self, token: &str) -> Option<Entity> {
        let tag = session_token_tag(token)?;
        let candidates = self.tag_index.lookup(tag.as_str());
        let id = candidates.into_iter().next()?;
        self.reader.get(&id).ok().flatten()
    }

    fn resolve_user(&self, user_id: &EntityId) -> Option<Entity> {
        self.reader.get(user_id).ok().flatten()
    }
}
