//! The on-disk unified file: header load/store and an absolute-offset
//! read/write backend shared by the WAL section, the data section, and
//! the tag dictionary/entity index sections.

use entitydb_core::{Error, Result};
use entitydb_format::{HeaderBlock, HEADER_SIZE};
use entitydb_wal::WalBackend;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::info;

/// The real unified file backing store. A single `File` handle guarded
/// by a mutex; every read/write is addressed by absolute offset so the
/// same backend serves the WAL, data, tag dictionary, and entity index
/// sections without needing four separate handles.
pub struct UnifiedFile {
    file: Mutex<File>,
}

impl UnifiedFile {
    /// Open an existing unified file, or create and initialize a new one
    /// with an empty header if it does not exist.
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<(Self, HeaderBlock)> {
        let path = path.as_ref();
        let existed = path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let backend = UnifiedFile {
            file: Mutex::new(file),
        };

        if existed && backend.file_len()? >= HEADER_SIZE as u64 {
            let header = backend.read_header()?;
            info!(path = %path.display(), entities = header.entity_count, "opened existing unified file");
            Ok((backend, header))
        } else {
            let header = HeaderBlock::new_empty();
            backend.write_header(&header)?;
            backend.set_len(header.file_size)?;
            info!(path = %path.display(), "initialized new unified file");
            Ok((backend, header))
        }
    }

    /// Open (creating if necessary) without requiring the header to be
    /// valid: returns `None` in place of the header when the file is too
    /// short to hold one or fails to validate, so the caller can run the
    /// recovery pipeline instead of failing outright (spec.md section
    /// 4.8: recovery runs "on open", not only after a corruption is
    /// detected mid-operation).
    pub fn open_for_recovery(path: impl AsRef<Path>) -> Result<(Self, Option<HeaderBlock>)> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let backend = UnifiedFile {
            file: Mutex::new(file),
        };
        if backend.file_len()? < HEADER_SIZE as u64 {
            return Ok((backend, None));
        }
        match backend.read_header() {
            Ok(header) => Ok((backend, Some(header))),
            Err(_) => Ok((backend, None)),
        }
    }

    pub fn read_header(&self) -> Result<HeaderBlock> {
        let bytes = self.read_at(0, HEADER_SIZE)?;
        HeaderBlock::from_bytes(&bytes)
    }

    pub fn write_header(&self, header: &HeaderBlock) -> Result<()> {
        self.write_at(0, &header.to_bytes())?;
        self.sync()?;
        Ok(())
    }

    pub fn set_len(&self, len: u64) -> Result<()> {
        let file = self.file.lock();
        file.set_len(len)?;
        Ok(())
    }
}

/// The mutex makes every operation effectively shared-state mutation
/// under `&self`; these are the methods `Writer`/`Reader` call directly
/// when they hold only an `Arc<UnifiedFile>`.
impl UnifiedFile {
    pub fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn write_at(&self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)
    }

    pub fn sync(&self) -> std::io::Result<()> {
        let file = self.file.lock();
        file.sync_all()
    }

    pub fn file_len(&self) -> std::io::Result<u64> {
        let file = self.file.lock();
        Ok(file.metadata()?.len())
    }
}

/// `entitydb-wal` requires `&mut self` for its trait contract; the real
/// file needs none of that exclusivity since every operation already
/// goes through the internal mutex, so the impl just forwards.
impl WalBackend for UnifiedFile {
    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        UnifiedFile::read_at(self, offset, len)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        UnifiedFile::write_at(self, offset, data)
    }

    fn sync(&mut self) -> std::io::Result<()> {
        UnifiedFile::sync(self)
    }

    fn file_len(&self) -> std::io::Result<u64> {
        UnifiedFile::file_len(self)
    }
}

/// Raised if, after an append, the file's actual length as reported by
/// the filesystem falls short of the offset the writer was tracking in
/// memory (spec.md section 4.3's position cross-validation). `reported`
/// is allowed to exceed `tracked` — the unified file always keeps a
/// reserved span ahead of the data cursor for the tag dictionary, entity
/// index, and trailing slack, so a healthy file is routinely larger than
/// the cursor. A `reported` that comes up short is what actually signals
/// a write that did not land where the writer thought it did.
pub fn check_position(tracked: u64, reported: u64) -> Result<()> {
    if reported < tracked {
        return Err(Error::PositionMismatch { tracked, reported });
    }
    Ok(())
}
