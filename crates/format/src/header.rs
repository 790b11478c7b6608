//! The 128-byte unified file header (spec.md section 4.1).
//!
//! ```text
//! magic(4) version(4) file_size(8)
//! wal_offset(8)    wal_size(8)
//! data_offset(8)   data_size(8)
//! tagdict_offset(8) tagdict_size(8)
//! index_offset(8)  index_size(8)
//! entity_count(8) last_modified_ns(8) wal_sequence(8) checkpoint_sequence(8)
//! reserved(16)
//! ```
//!
//! All multi-byte integers are little-endian. Any opener that cannot
//! validate the magic, version, and the offset invariant must refuse to
//! write and trigger recovery (spec.md section 4.1's contract) rather
//! than relying on `seek` to surface the problem later.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{Error, Result};
use std::io::Cursor;

/// Magic bytes identifying an EntityDB unified file.
pub const MAGIC: [u8; 4] = *b"EUFF";

/// Current format version. No legacy format is accepted (spec.md
/// section 6: "legacy format support is explicitly removed").
pub const VERSION: u32 = 2;

/// Serialized header size in bytes.
pub const HEADER_SIZE: usize = 128;

/// Defensive upper bound on any section offset/size (spec.md invariant 5).
pub const MAX_VALID_OFFSET: u64 = entitydb_core::limits::MAX_VALID_OFFSET;

/// WAL capacity reserved when a brand-new file is initialized, before any
/// record has been appended. Chosen so a freshly created file already
/// satisfies the strict offset ordering in `validate()` rather than
/// starting in a technically-invalid state that only becomes valid once
/// the first record is written.
const INITIAL_WAL_CAPACITY: u64 = 64 * 1024;

/// Trailing capacity reserved past the entity index so `file_size` is
/// strictly greater than the entity index offset on a new file.
const INITIAL_TRAILING_RESERVE: u64 = 4096;

/// One (offset, size) pair describing a section's extent in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionSpan {
    pub offset: u64,
    pub size: u64,
}

/// The parsed unified file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub file_size: u64,
    pub wal: SectionSpan,
    pub data: SectionSpan,
    pub tag_dict: SectionSpan,
    pub entity_index: SectionSpan,
    pub entity_count: u64,
    pub last_modified_ns: u64,
    pub wal_sequence: u64,
    pub checkpoint_sequence: u64,
    /// Reserved for future use. Per the spec's open question, recovery
    /// treats this as opaque/absent and never reads it as a backup
    /// field — see `entitydb-storage`'s recovery pipeline.
    pub reserved: [u8; 16],
}

impl HeaderBlock {
    /// A fresh header for a brand-new file with zero-size sections,
    /// sections laid out contiguously starting right after the header.
    pub fn new_empty() -> Self {
        let wal = SectionSpan {
            offset: HEADER_SIZE as u64,
            size: INITIAL_WAL_CAPACITY,
        };
        let data = SectionSpan {
            offset: wal.offset + wal.size,
            size: 0,
        };
        let tag_dict = SectionSpan {
            offset: data.offset + data.size,
            size: 0,
        };
        let entity_index = SectionSpan {
            offset: tag_dict.offset + tag_dict.size,
            size: 0,
        };
        HeaderBlock {
            file_size: entity_index.offset + entity_index.size + INITIAL_TRAILING_RESERVE,
            wal,
            data,
            tag_dict,
            entity_index,
            entity_count: 0,
            last_modified_ns: 0,
            wal_sequence: 0,
            checkpoint_sequence: 0,
            reserved: [0u8; 16],
        }
    }

    /// Serialize to a `HEADER_SIZE`-byte buffer.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        {
            let mut cursor = Cursor::new(&mut buf[..]);
            cursor.write_all(&MAGIC).unwrap();
            cursor.write_u32::<LittleEndian>(VERSION).unwrap();
            cursor.write_u64::<LittleEndian>(self.file_size).unwrap();
            for span in [&self.wal, &self.data, &self.tag_dict, &self.entity_index] {
                cursor.write_u64::<LittleEndian>(span.offset).unwrap();
                cursor.write_u64::<LittleEndian>(span.size).unwrap();
            }
            cursor.write_u64::<LittleEndian>(self.entity_count).unwrap();
            cursor
                .write_u64::<LittleEndian>(self.last_modified_ns)
                .unwrap();
            cursor.write_u64::<LittleEndian>(self.wal_sequence).unwrap();
            cursor
                .write_u64::<LittleEndian>(self.checkpoint_sequence)
                .unwrap();
            cursor.write_all(&self.reserved).unwrap();
        }
        buf
    }

    /// Parse a `HEADER_SIZE`-byte buffer, validating magic, version, and
    /// the section-offset invariant (spec.md invariant 5). Never panics
    /// on malformed input; always returns `Error::CorruptHeader`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::CorruptHeader(format!(
                "header buffer too short: {} bytes, need {}",
                buf.len(),
                HEADER_SIZE
            )));
        }
        let mut cursor = Cursor::new(buf);
        let mut magic = [0u8; 4];
        cursor
            .read_exact(&mut magic)
            .map_err(|e| Error::CorruptHeader(e.to_string()))?;
        if magic != MAGIC {
            return Err(Error::CorruptHeader(format!(
                "bad magic: {:?}, expected {:?}",
                magic, MAGIC
            )));
        }
        let version = cursor
            .read_u32::<LittleEndian>()
            .map_err(|e| Error::CorruptHeader(e.to_string()))?;
        if version != VERSION {
            return Err(Error::CorruptHeader(format!(
                "unsupported version {version}, expected {VERSION}"
            )));
        }
        let file_size = read_u64(&mut cursor)?;
        let wal = read_span(&mut cursor)?;
        let data = read_span(&mut cursor)?;
        let tag_dict = read_span(&mut cursor)?;
        let entity_index = read_span(&mut cursor)?;
        let entity_count = read_u64(&mut cursor)?;
        let last_modified_ns = read_u64(&mut cursor)?;
        let wal_sequence = read_u64(&mut cursor)?;
        let checkpoint_sequence = read_u64(&mut cursor)?;
        let mut reserved = [0u8; 16];
        cursor
            .read_exact(&mut reserved)
            .map_err(|e| Error::CorruptHeader(e.to_string()))?;

        let header = HeaderBlock {
            file_size,
            wal,
            data,
            tag_dict,
            entity_index,
            entity_count,
            last_modified_ns,
            wal_sequence,
            checkpoint_sequence,
            reserved,
        };
        header.validate()?;
        Ok(header)
    }

    /// Validate the section-offset invariant (spec.md invariant 5):
    /// `0 < wal_offset < data_offset <= tag_dict_offset <= entity_index_offset < file_size`,
    /// and every offset below `MAX_VALID_OFFSET`.
    pub fn validate(&self) -> Result<()> {
        let offsets = [
            self.wal.offset,
            self.data.offset,
            self.tag_dict.offset,
            self.entity_index.offset,
        ];
        if offsets.iter().any(|&o| o >= MAX_VALID_OFFSET) {
            return Err(Error::CorruptHeader(format!(
                "section offset exceeds defensive bound {MAX_VALID_OFFSET}: {offsets:?}"
            )));
        }
        if !(self.wal.offset > 0
            && self.wal.offset < self.data.offset
            && self.data.offset <= self.tag_dict.offset
            && self.tag_dict.offset <= self.entity_index.offset
            && self.entity_index.offset < self.file_size)
        {
            return Err(Error::CorruptHeader(format!(
                "section offsets violate ordering invariant: wal={}, data={}, tag_dict={}, \
                 entity_index={}, file_size={}",
                self.wal.offset, self.data.offset, self.tag_dict.offset,
                self.entity_index.offset, self.file_size
            )));
        }
        Ok(())
    }
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64> {
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|e| Error::CorruptHeader(e.to_string()))
}

fn read_span(cursor: &mut Cursor<&[u8]>) -> Result<SectionSpan> {
    let offset = read_u64(cursor)?;
    let size = read_u64(cursor)?;
    Ok(SectionSpan { offset, size })
}

use std::io::Read;
