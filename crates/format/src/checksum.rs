//! CRC32 (crc32fast, the same family the teacher uses across WAL and
//! record checksums) used uniformly for WAL records, entity records, and
//! content chunks.

/// Compute the CRC32 checksum of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_deterministic() {
        assert_eq!(crc32(b"hello"), crc32(b"hello"));
    }

    #[test]
    fn differs_for_different_input() {
        assert_ne!(crc32(b"hello"), crc32(b"world"));
    }
}
