//! Incremental xxHash64 (seed 0), used for both block-level and global
//! integrity checks (spec §4.1).
//!
//! Mirrors the role `crc32fast::Hasher` plays in the teacher's
//! `block.rs`/`superblock.rs`: one running instance is fed every byte
//! written before the footer, and the same algorithm re-derived over the
//! same byte range must match on read-back.

use xxhash_rust::xxh64::Xxh64;

const SEED: u64 = 0;

/// A running xxHash64 accumulator over everything written so far.
pub struct RollingChecksum {
    hasher: Xxh64,
}

impl RollingChecksum {
    pub fn new() -> Self {
        Self { hasher: Xxh64::new(SEED) }
    }

    #[inline]
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finish(self) -> u64 {
        self.hasher.digest()
    }
}

impl Default for RollingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot xxHash64 over a complete buffer — used for the per-block
/// checksum, which covers the uncompressed `ids || seq || qual || aux`
/// streams assembled in memory by the block compressor.
pub fn hash_bytes(data: &[u8]) -> u64 {
    xxhash_rust::xxh64::xxh64(data, SEED)
}
