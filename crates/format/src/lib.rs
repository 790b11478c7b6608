//! Binary encodings for the unified EntityDB file (spec.md sections 4.1
//! and 6): the 128-byte header, the entity record, the content chunk
//! descriptor, and the WAL record. This crate only encodes/decodes bytes
//! — it never opens a file; that is `entitydb-storage`'s and
//! `entitydb-wal`'s job.

mod checksum;
mod header;
mod record;
mod wal_record;

pub use checksum::crc32;
pub use header::{HeaderBlock, SectionSpan, MAGIC, VERSION, HEADER_SIZE, MAX_VALID_OFFSET};
pub use record::{ChunkDescriptor, EntityRecord, TagField};
pub use wal_record::{WalRecord, WalRecordType};
