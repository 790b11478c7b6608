//! `WalSection`: append and replay against a `WalBackend`.

use crate::backend::WalBackend;
use entitydb_core::Error;
use entitydb_format::{SectionSpan, WalRecord, MAX_VALID_OFFSET};
use tracing::{info, warn};

/// Outcome of replaying a WAL section: the records found in sequence
/// order, and the byte offset (relative to the section) at which replay
/// stopped, which is the section's write position going forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub records: Vec<WalRecord>,
    /// Offset, relative to the section start, of the first byte not
    /// covered by a successfully decoded record. Bytes from here to the
    /// end of the section's written extent are garbage left by a crash
    /// mid-append and must be overwritten, not trusted.
    pub truncated_at: u64,
    /// Whether replay stopped early because of a corrupt record (as
    /// opposed to simply running out of written bytes).
    pub hit_corruption: bool,
}

/// A write-ahead log section: a span of the unified file plus the
/// writer's current position within it.
pub struct WalSection {
    pub span: SectionSpan,
    /// Absolute file offset of the next byte to write.
    pub write_position: u64,
}

impl WalSection {
    pub fn new(span: SectionSpan) -> Self {
        WalSection {
            write_position: span.offset,
            span,
        }
    }

    /// Pre-seek validation (spec.md section 4.2): the writer must check
    /// the WAL offset from the header before ever calling `seek`/writing.
    /// An offset of zero or at/past the defensive bound is a corrupt
    /// header, never a condition we discover via a failed seek.
    pub fn validate_offset(offset: u64) -> Result<(), Error> {
        if offset == 0 || offset >= MAX_VALID_OFFSET {
            return Err(Error::CorruptHeader(format!(
                "WAL offset {offset} is zero or exceeds the defensive bound {MAX_VALID_OFFSET}"
            )));
        }
        Ok(())
    }

    /// Append `record` to the section, fsync, and return its durable
    /// sequence number. Fails with `Error::WalFull` if the record would
    /// overflow the section's reserved capacity.
    pub fn append(
        &mut self,
        backend: &mut impl WalBackend,
        record: &WalRecord,
    ) -> Result<u64, Error> {
        Self::validate_offset(self.span.offset)?;
        let bytes = record.to_bytes();
        let section_end = self.span.offset + self.span.size;
        let attempted_end = self.write_position + bytes.len() as u64;
        if attempted_end > section_end {
            return Err(Error::WalFull {
                attempted: bytes.len() as u64,
                remaining: section_end.saturating_sub(self.write_position),
            });
        }
        backend.write_at(self.write_position, &bytes)?;
        backend.sync()?;
        self.write_position += bytes.len() as u64;
        info!(sequence = record.sequence, len = bytes.len(), "wal record appended");
        Ok(record.sequence)
    }

    /// Replay records starting at `from_sequence`, reading forward from
    /// the section's start until the reserved capacity, stopping at the
    /// first record whose CRC fails or whose structure is malformed.
    /// Bytes past that point are treated as garbage left by a crash
    /// mid-write, never surfaced as an error — recovery relies on this.
    pub fn replay(
        &self,
        backend: &impl WalBackend,
        from_sequence: u64,
    ) -> Result<ReplayOutcome, Error> {
        let mut records = Vec::new();
        let mut cursor = self.span.offset;
        let section_end = self.span.offset + self.span.size;
        let mut hit_corruption = false;

        while cursor < section_end {
            let remaining = (section_end - cursor) as usize;
            // Read a conservative chunk; record boundaries are
            // self-describing once the header fields are parsed, so
            // over-reading is safe as long as we stay within the section.
            let probe_len = remaining.min(64 * 1024);
            let chunk = match backend.read_at(cursor, probe_len) {
                Ok(c) => c,
                Err(_) => break,
            };
            if chunk.iter().all(|&b| b == 0) {
                // Unwritten (zeroed) tail of the section.
                break;
            }
            match WalRecord::decode(&chunk, cursor) {
                Ok((record, consumed)) => {
                    cursor += consumed as u64;
                    if record.sequence >= from_sequence {
                        records.push(record);
                    }
                }
                Err(err) => {
                    warn!(offset = cursor, error = %err, "wal replay stopped at corrupt record");
                    hit_corruption = true;
                    break;
                }
            }
        }

        Ok(ReplayOutcome {
            records,
            truncated_at: cursor - self.span.offset,
            hit_corruption,
        })
    }
}
