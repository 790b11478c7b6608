//! WAL record encoding (spec.md section 4.2).
//!
//! ```text
//! sequence(8) type(1) entity_id_len(4) entity_id timestamp_ns(8)
//! payload_length(4) payload crc32(4)
//! ```

use crate::checksum::crc32;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use entitydb_core::{Error, Result};
use std::io::{Cursor, Read};

/// The kind of mutation a WAL record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalRecordType {
    Put,
    Checkpoint,
}

impl WalRecordType {
    fn to_byte(self) -> u8 {
        match self {
            WalRecordType::Put => 0,
            WalRecordType::Checkpoint => 1,
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(WalRecordType::Put),
            1 => Ok(WalRecordType::Checkpoint),
            other => Err(Error::CorruptRecord {
                offset: 0,
                reason: format!("unknown WAL record type byte {other}"),
            }),
        }
    }
}

/// A single WAL record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub sequence: u64,
    pub record_type: WalRecordType,
    pub entity_id: String,
    pub timestamp_ns: u64,
    pub payload: Vec<u8>,
}

impl WalRecord {
    pub fn put(sequence: u64, entity_id: String, timestamp_ns: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            record_type: WalRecordType::Put,
            entity_id,
            timestamp_ns,
            payload,
        }
    }

    pub fn checkpoint(sequence: u64, timestamp_ns: u64) -> Self {
        Self {
            sequence,
            record_type: WalRecordType::Checkpoint,
            entity_id: String::new(),
            timestamp_ns,
            payload: Vec::new(),
        }
    }

    /// Encode to bytes, including the trailing CRC32 checksum of
    /// everything preceding it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.write_u64::<LittleEndian>(self.sequence).unwrap();
        buf.push(self.record_type.to_byte());
        buf.write_u32::<LittleEndian>(self.entity_id.len() as u32).unwrap();
        buf.extend_from_slice(self.entity_id.as_bytes());
        buf.write_u64::<LittleEndian>(self.timestamp_ns).unwrap();
        buf.write_u32::<LittleEndian>(self.payload.len() as u32).unwrap();
        buf.extend_from_slice(&self.payload);
        let crc = crc32(&buf);
        buf.write_u32::<LittleEndian>(crc).unwrap();
        buf
    }

    /// Decode a record from the start of `buf`. Returns the record and
    /// the number of bytes consumed, so the caller can advance past it
    /// while scanning a WAL section. On any CRC or structural failure,
    /// returns `Error::CorruptRecord` so the replay loop can treat
    /// everything from this point on as garbage.
    pub fn decode(buf: &[u8], offset: u64) -> Result<(Self, usize)> {
        // Minimum: sequence(8) + type(1) + id_len(4) + ts(8) + payload_len(4) + crc(4)
        const MIN_LEN: usize = 8 + 1 + 4 + 8 + 4 + 4;
        if buf.len() < MIN_LEN {
            return Err(Error::CorruptRecord {
                offset,
                reason: "buffer shorter than minimum WAL record size".to_string(),
            });
        }
        let mut cursor = Cursor::new(buf);
        let sequence = cursor.read_u64::<LittleEndian>().map_err(|e| corrupt(offset, e))?;
        let mut type_byte = [0u8; 1];
        cursor.read_exact(&mut type_byte).map_err(|e| corrupt(offset, e))?;
        let record_type = WalRecordType::from_byte(type_byte[0]).map_err(|_| Error::CorruptRecord {
            offset,
            reason: format!("unknown WAL record type byte {}", type_byte[0]),
        })?;
        let id_len = cursor.read_u32::<LittleEndian>().map_err(|e| corrupt(offset, e))? as usize;
        if cursor.position() as usize + id_len > buf.len() {
            return Err(Error::CorruptRecord {
                offset,
                reason: "entity id length exceeds buffer".to_string(),
            });
        }
        let mut id_bytes = vec![0u8; id_len];
        cursor.read_exact(&mut id_bytes).map_err(|e| corrupt(offset, e))?;
        let entity_id = String::from_utf8(id_bytes).map_err(|e| Error::CorruptRecord {
            offset,
            reason: format!("entity id is not valid utf-8: {e}"),
        })?;
        let timestamp_ns = cursor.read_u64::<LittleEndian>().map_err(|e| corrupt(offset, e))?;
        let payload_len = cursor.read_u32::<LittleEndian>().map_err(|e| corrupt(offset, e))? as usize;
        if cursor.position() as usize + payload_len > buf.len() {
            return Err(Error::CorruptRecord {
                offset,
                reason: "payload length exceeds buffer".to_string(),
            });
        }
        let mut payload = vec![0u8; payload_len];
        cursor.read_exact(&mut payload).map_err(|e| corrupt(offset, e))?;

        let consumed_before_crc = cursor.position() as usize;
        if consumed_before_crc + 4 > buf.len() {
            return Err(Error::CorruptRecord {
                offset,
                reason: "buffer truncated before trailing crc".to_string(),
            });
        }
        let stored_crc = (&buf[consumed_before_crc..consumed_before_crc + 4])
            .read_u32::<LittleEndian>()
            .map_err(|e| corrupt(offset, e))?;
        let computed_crc = crc32(&buf[..consumed_before_crc]);
        if computed_crc != stored_crc {
            return Err(Error::CorruptRecord {
                offset,
                reason: format!("crc mismatch: computed {computed_crc}, stored {stored_crc}"),
            });
        }

        Ok((
            WalRecord {
                sequence,
                record_type,
                entity_id,
                timestamp_ns,
                payload,
            },
            consumed_before_crc + 4,
        ))
    }
}

fn corrupt(offset: u64, e: std::io::Error) -> Error {
    Error::CorruptRecord {
        offset,
        reason: e.to_string(),
    }
}
