//! Content identity for the temporal engine's diff operation.
//!
//! `diff` needs to say whether content changed between two points in
//! time without holding both byte buffers in memory at once; a digest
//! comparison is cheaper and is the same approach `sha2` is used for
//! elsewhere in this workspace (content-addressable chunk identity).

use sha2::{Digest, Sha256};
use std::fmt;

/// A SHA-256 digest of an entity's content bytes at some point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
