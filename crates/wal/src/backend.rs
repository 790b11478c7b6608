//! The storage abstraction the WAL writes against.
//!
//! Kept narrow on purpose (spec.md section 9's "polymorphism instead of
//! inheritance" design note): a writer is anything that provides these
//! three operations, nothing more.

/// A backing store the WAL section can read, write, and durably persist
/// to. `entitydb-storage` implements this over the real unified file;
/// tests implement it over a `Vec<u8>`.
pub trait WalBackend {
    /// Read `len` bytes starting at absolute file `offset`.
    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>>;

    /// Write `data` at absolute file `offset`.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()>;

    /// Flush and fsync so the write is durable before `append` returns.
    fn sync(&mut self) -> std::io::Result<()>;

    /// The backend's view of the current file size, used for the
    /// writer's position cross-validation (spec.md section 4.3).
    fn file_len(&self) -> std::io::Result<u64>;
}

/// An in-memory `WalBackend` used by tests and by recovery dry-runs.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    pub data: Vec<u8>,
}

impl WalBackend for MemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let offset = offset as usize;
        if offset + len > self.data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of in-memory backend",
            ));
        }
        Ok(self.data[offset..offset + len].to_vec())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> std::io::Result<()> {
        let offset = offset as usize;
        let end = offset + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(data);
        Ok(())
    }

    fn sync(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    fn file_len(&self) -> std::io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}
