//! Per-entity write serialization (spec.md section 5): a fixed-size
//! table of stripes, each guarding every entity whose id hashes into it.
//! Grounded in the teacher's `TransactionManager`'s per-branch commit
//! lock (`crates/concurrency/src/manager.rs`) — there, commits on the
//! same branch serialize to prevent a validate/apply race; here, a
//! `get`-then-`put` read-modify-write on the same entity needs the same
//! protection, while unrelated entities still commit in parallel.
//!
//! A fixed stripe count (rather than one lock per entity) bounds memory
//! use; two different entities can still land in the same stripe and
//! serialize unnecessarily, which is an acceptable cost for a bounded
//! table.

use entitydb_core::EntityId;
use parking_lot::{Mutex, MutexGuard};
use std::hash::{Hash, Hasher};
use rustc_hash::FxHasher;

const STRIPE_COUNT: usize = 256;

pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
}

impl StripedLocks {
    pub fn new() -> Self {
        let mut stripes = Vec::with_capacity(STRIPE_COUNT);
        stripes.resize_with(STRIPE_COUNT, || Mutex::new(()));
        StripedLocks { stripes }
    }

    fn stripe_for(&self, id: &EntityId) -> &Mutex<()> {
        let mut hasher = FxHasher::default();
        id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % STRIPE_COUNT;
        &self.stripes[index]
    }

    /// Acquire the stripe guarding `id`. Held for the duration of a
    /// repository operation's read-modify-write against that entity.
    pub fn lock(&self, id: &EntityId) -> MutexGuard<'_, ()> {
        self.stripe_for(id).lock()
    }
}

impl Default for StripedLocks {
    fn default() -> Self {
        StripedLocks::new()
    }
}
