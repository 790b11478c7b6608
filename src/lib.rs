//! # EntityDB
//!
//! A single-file temporal entity store: every tag ever asserted on an
//! entity is kept, not just its current value, so any past state can be
//! materialized, diffed against another point in time, or watched for
//! change (spec.md section 3).
//!
//! ```no_run
//! use entitydb::{EntityId, Repository, TagText};
//!
//! fn main() -> entitydb::Result<()> {
//!     let repo = Repository::open("./data/store.euff")?;
//!     let id = EntityId::new("doc_1")?;
//!     repo.create(&id, vec![TagText::new("status:draft")?], b"hello")?;
//!     let entity = repo.get(&id)?;
//!     assert_eq!(entity.content.0, b"hello");
//!     Ok(())
//! }
//! ```
//!
//! # Crate layout
//!
//! Internal crates (`entitydb-format`, `entitydb-wal`, `entitydb-index`,
//! `entitydb-storage`, `entitydb-temporal`, `entitydb-security`,
//! `entitydb-gateway`) are not exposed; [`Repository`] is the stable
//! surface an external HTTP layer links against, mirroring how the
//! teacher's root crate re-exports a single facade for its own
//! blackbox test suite.

pub use entitydb_core::{
    Content, ContentHash, Entity, EntityId, EntityIdError, Error, Limits, ReservedNamespace, Result, Tag, TagError,
    TagText, Timestamp,
};
pub use entitydb_gateway::{
    adaptive_delay, parse_toml_env, CacheKey, CachedResponse, ConfigKey, ConfigResolver, ConfigValue, Decision,
    MetricsCollector, Snapshot as MetricsSnapshot, Throttler,
};
pub use entitydb_repository::{QueryFilters, Repository, RepositoryMetrics, RepositorySessionResolver};
pub use entitydb_security::{authorize, is_expired, new_session_tags, refresh_tag, session_token_tag, SessionResolver};
pub use entitydb_temporal::{parse_timestamp, MaterializedView, TemporalDiff, TimelineEntry};
