//! Entity record encoding (spec.md section 4.3).
//!
//! ```text
//! id_length(4) id
//! prev_offset(8)               // 0 == no previous version
//! tag_count(4) [timestamp(8) text_length(4) text]...
//! chunk_count(4) [index(4) length(8) crc32(4) bytes]...
//! record_crc(4)
//! ```
//!
//! `record_crc` covers every byte of the record preceding it. Updates are
//! append-only: a new record's `prev_offset` points at the previous
//! version's record offset in the data section, and the entity index is
//! updated to point at the newest record (spec.md section 4.3).

use crate::checksum::crc32;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{Error, Result};
use std::io::{Cursor, Read};

/// One timestamped tag as it appears in an entity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagField {
    pub timestamp_ns: u64,
    pub text: String,
}

/// One content chunk as it appears in an entity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: u32,
    pub crc32: u32,
    pub bytes: Vec<u8>,
}

impl ChunkDescriptor {
    pub fn new(index: u32, bytes: Vec<u8>) -> Self {
        let crc = crc32(&bytes);
        ChunkDescriptor {
            index,
            crc32: crc,
            bytes,
        }
    }

    /// Re-verify the chunk's checksum against its current bytes.
    pub fn verify(&self) -> bool {
        crc32(&self.bytes) == self.crc32
    }
}

/// A fully decoded (or to-be-encoded) entity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: String,
    /// Offset in the data section of the previous version of this
    /// entity, or `0` if this is the first record ever written for it.
    pub prev_offset: u64,
    pub tags: Vec<TagField>,
    pub chunks: Vec<ChunkDescriptor>,
}

impl EntityRecord {
    pub fn new(id: String, prev_offset: u64, tags: Vec<TagField>, chunks: Vec<ChunkDescriptor>) -> Self {
        Self {
            id,
            prev_offset,
            tags,
            chunks,
        }
    }

    /// Total content length across all chunks.
    pub fn content_len(&self) -> u64 {
        self.chunks.iter().map(|c| c.bytes.len() as u64).sum()
    }

    /// Encode to bytes, appending the trailing `record_crc`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(self.id.len() as u32).unwrap();
        buf.extend_from_slice(self.id.as_bytes());
        buf.write_u64::<LittleEndian>(self.prev_offset).unwrap();

        buf.write_u32::<LittleEndian>(self.tags.len() as u32).unwrap();
        for tag in &self.tags {
            buf.write_u64::<LittleEndian>(tag.timestamp_ns).unwrap();
            buf.write_u32::<LittleEndian>(tag.text.len() as u32).unwrap();
            buf.extend_from_slice(tag.text.as_bytes());
        }

        buf.write_u32::<LittleEndian>(self.chunks.len() as u32).unwrap();
        for chunk in &self.chunks {
            buf.write_u32::<LittleEndian>(chunk.index).unwrap();
            buf.write_u64::<LittleEndian>(chunk.bytes.len() as u64).unwrap();
            buf.write_u32::<LittleEndian>(chunk.crc32).unwrap();
            buf.extend_from_slice(&chunk.bytes);
        }

        let crc = crc32(&buf);
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf
    }

    /// Decode a record occupying the *entire* `buf` (no trailing bytes
    /// from a following record), verifying `record_crc` covers the
    /// preceding bytes exactly. `offset` is used only for error context.
    /// Prefer [`EntityRecord::decode`] when reading from a data section
    /// that may contain more records after this one.
    pub fn from_bytes(buf: &[u8], offset: u64) -> Result<Self> {
        let (record, consumed) = Self::decode(buf, offset)?;
        if consumed != buf.len() {
            return Err(Error::CorruptRecord {
                offset,
                reason: format!(
                    "record consumed {consumed} of {} buffer bytes; trailing data present",
                    buf.len()
                ),
            });
        }
        Ok(record)
    }

    /// Decode a record from the start of `buf`, which may extend past
    /// this record into whatever follows it in the data section.
    /// Returns the record and the number of bytes consumed, mirroring
    /// [`crate::WalRecord::decode`]. The record's own length fields
    /// determine where it ends; the trailing CRC is read and verified
    /// immediately after.
    pub fn decode(buf: &[u8], offset: u64) -> Result<(Self, usize)> {
        let mut cursor = Cursor::new(buf);
        let id_len = read_u32(&mut cursor, offset)? as usize;
        let mut id_bytes = vec![0u8; id_len];
        cursor
            .read_exact(&mut id_bytes)
            .map_err(|e| corrupt(offset, e))?;
        let id = String::from_utf8(id_bytes).map_err(|e| Error::CorruptRecord {
            offset,
            reason: format!("id is not valid utf-8: {e}"),
        })?;

        let prev_offset = read_u64(&mut cursor, offset)?;

        let tag_count = read_u32(&mut cursor, offset)?;
        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let timestamp_ns = read_u64(&mut cursor, offset)?;
            let text_len = read_u32(&mut cursor, offset)? as usize;
            let mut text_bytes = vec![0u8; text_len];
            cursor
                .read_exact(&mut text_bytes)
                .map_err(|e| corrupt(offset, e))?;
            let text = String::from_utf8(text_bytes).map_err(|e| Error::CorruptRecord {
                offset,
                reason: format!("tag text is not valid utf-8: {e}"),
            })?;
            tags.push(TagField { timestamp_ns, text });
        }

        let chunk_count = read_u32(&mut cursor, offset)?;
        let mut chunks = Vec::with_capacity(chunk_count as usize);
        for _ in 0..chunk_count {
            let index = read_u32(&mut cursor, offset)?;
            let len = read_u64(&mut cursor, offset)? as usize;
            let crc = read_u32(&mut cursor, offset)?;
            let mut bytes = vec![0u8; len];
            cursor
                .read_exact(&mut bytes)
                .map_err(|e| corrupt(offset, e))?;
            chunks.push(ChunkDescriptor {
                index,
                crc32: crc,
                bytes,
            });
        }

        let body_len = cursor.position() as usize;
        if body_len + 4 > buf.len() {
            return Err(Error::CorruptRecord {
                offset,
                reason: "buffer truncated before trailing crc".to_string(),
            });
        }
        let body = &buf[..body_len];
        let trailing_crc = (&buf[body_len..body_len + 4])
            .read_u32::<LittleEndian>()
            .map_err(|e| corrupt(offset, e))?;
        let computed_crc = crc32(body);
        if computed_crc != trailing_crc {
            return Err(Error::CorruptRecord {
                offset,
                reason: format!("crc mismatch: computed {computed_crc}, stored {trailing_crc}"),
            });
        }

        for chunk in &chunks {
            if !chunk.verify() {
                return Err(Error::CorruptRecord {
                    offset,
                    reason: format!("chunk {} crc mismatch", chunk.index),
                });
            }
        }

        Ok((
            EntityRecord {
                id,
                prev_offset,
                tags,
                chunks,
            },
            body_len + 4,
        ))
    }
}

fn corrupt(offset: u64, e: std::io::Error) -> Error {
    Error::CorruptRecord {
        offset,
        reason: e.to_string(),
    }
}

fn read_u32(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u32> {
    cursor
        .read_u32::<LittleEndian>()
        .map_err(|e| corrupt(offset, e))
}

fn read_u64(cursor: &mut Cursor<&[u8]>, offset: u64) -> Result<u64> {
    cursor
        .read_u64::<LittleEndian>()
        .map_err(|e| corrupt(offset, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EntityRecord {
        EntityRecord::new(
            "doc_1".to_string(),
            0,
            vec![
                TagField { timestamp_ns: 100, text: "type:document".to_string() },
                TagField { timestamp_ns: 100, text: "status:draft".to_string() },
            ],
            vec![ChunkDescriptor::new(0, b"hello world".to_vec())],
        )
    }

    #[test]
    fn roundtrips() {
        let record = sample();
        let bytes = record.to_bytes();
        let decoded = EntityRecord::from_bytes(&bytes, 0).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn detects_record_crc_corruption() {
        let record = sample();
        let mut bytes = record.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        assert!(matches!(
            EntityRecord::from_bytes(&bytes, 0),
            Err(Error::CorruptRecord { .. })
        ));
    }

    #[test]
    fn detects_chunk_crc_corruption() {
        let record = sample();
        let mut bytes = record.to_bytes();
        // Flip a byte inside the chunk payload, then recompute a record
        // crc over the (now-inconsistent) body so only the chunk crc
        // check can catch it.
        let flip_pos = bytes.len() - 1 - 4 - 2; // somewhere in "hello world"
        bytes[flip_pos] ^= 0xFF;
        let body_len = bytes.len() - 4;
        let new_crc = crc32(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&new_crc.to_le_bytes());
        assert!(matches!(
            EntityRecord::from_bytes(&bytes, 0),
            Err(Error::CorruptRecord { .. })
        ));
    }

    #[test]
    fn content_len_sums_chunks() {
        let record = sample();
        assert_eq!(record.content_len(), "hello world".len() as u64);
    }

    #[test]
    fn prev_offset_chains_updates() {
        let first = sample();
        let second = EntityRecord::new(
            "doc_1".to_string(),
            4096,
            vec![TagField { timestamp_ns: 200, text: "status:published".to_string() }],
            vec![ChunkDescriptor::new(0, b"v2".to_vec())],
        );
        assert_eq!(first.prev_offset, 0);
        assert_eq!(second.prev_offset, 4096);
    }
}
