//! Block index (spec §4.1): `header_size:u32, entry_size:u32, num_blocks:u64`
//! followed by `num_blocks` entries of
//! `(offset:u64, compressed_size:u64, archive_id_start:u64, read_count:u32)`.

use crate::error::{FqcError, FqcResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const NOMINAL_ENTRY_SIZE: usize = 28;
const INDEX_HEADER_PREFIX: usize = 4 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockIndexEntry {
    pub offset: u64,
    pub compressed_size: u64,
    pub archive_id_start: u64,
    pub read_count: u32,
}

impl BlockIndexEntry {
    pub fn archive_id_end(&self) -> u64 {
        self.archive_id_start + self.read_count as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockIndex {
    pub entries: Vec<BlockIndexEntry>,
}

impl BlockIndex {
    pub fn write<W: Write>(&self, mut w: W) -> FqcResult<()> {
        let header_size = INDEX_HEADER_PREFIX as u32;
        w.write_u32::<LittleEndian>(header_size)?;
        w.write_u32::<LittleEndian>(NOMINAL_ENTRY_SIZE as u32)?;
        w.write_u64::<LittleEndian>(self.entries.len() as u64)?;
        for e in &self.entries {
            w.write_u64::<LittleEndian>(e.offset)?;
            w.write_u64::<LittleEndian>(e.compressed_size)?;
            w.write_u64::<LittleEndian>(e.archive_id_start)?;
            w.write_u32::<LittleEndian>(e.read_count)?;
        }
        Ok(())
    }

    /// Read the index, skipping trailing entry bytes when `entry_size` is
    /// larger than the known layout and failing with a format error when
    /// it is smaller (spec §4.1).
    pub fn read<R: Read>(mut r: R) -> FqcResult<Self> {
        let _header_size = r.read_u32::<LittleEndian>()?;
        let entry_size = r.read_u32::<LittleEndian>()? as usize;
        if entry_size < NOMINAL_ENTRY_SIZE {
            return Err(FqcError::format(format!(
                "block index entry_size {entry_size} below minimum {NOMINAL_ENTRY_SIZE}"
            )));
        }
        let num_blocks = r.read_u64::<LittleEndian>()?;
        let trailing = entry_size - NOMINAL_ENTRY_SIZE;

        let mut entries = Vec::with_capacity(num_blocks as usize);
        for _ in 0..num_blocks {
            let offset = r.read_u64::<LittleEndian>()?;
            let compressed_size = r.read_u64::<LittleEndian>()?;
            let archive_id_start = r.read_u64::<LittleEndian>()?;
            let read_count = r.read_u32::<LittleEndian>()?;
            if trailing > 0 {
                std::io::copy(&mut r.by_ref().take(trailing as u64), &mut std::io::sink())?;
            }
            entries.push(BlockIndexEntry { offset, compressed_size, archive_id_start, read_count });
        }
        Ok(Self { entries })
    }

    /// Validate the continuity invariant of spec §3/§8: archive IDs form one
    /// globally continuous range across blocks.
    pub fn validate_continuity(&self) -> FqcResult<()> {
        for w in self.entries.windows(2) {
            if w[0].archive_id_end() != w[1].archive_id_start {
                return Err(FqcError::format(
                    "block index archive IDs are not globally continuous",
                ));
            }
        }
        Ok(())
    }

    /// All blocks whose archive-ID range intersects `[a, b]` inclusive,
    /// without touching any block fully outside the range (spec §8, Range
    /// query).
    pub fn blocks_in_range(&self, a: u64, b: u64) -> Vec<&BlockIndexEntry> {
        self.entries
            .iter()
            .filter(|e| e.archive_id_end() > a && e.archive_id_start <= b)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockIndex {
        BlockIndex {
            entries: vec![
                BlockIndexEntry { offset: 100, compressed_size: 50, archive_id_start: 0, read_count: 10 },
                BlockIndexEntry { offset: 150, compressed_size: 60, archive_id_start: 10, read_count: 5 },
            ],
        }
    }

    #[test]
    fn roundtrip() {
        let idx = sample();
        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        let read = BlockIndex::read(&buf[..]).unwrap();
        assert_eq!(read.entries.len(), 2);
        read.validate_continuity().unwrap();
    }

    #[test]
    fn skips_trailing_entry_bytes() {
        let idx = sample();
        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        // Bump entry_size by 3 and splice in 3 extra bytes per entry.
        buf[4..8].copy_from_slice(&(NOMINAL_ENTRY_SIZE as u32 + 3).to_le_bytes());
        let mut spliced = buf[..16].to_vec();
        for entry in buf[16..].chunks(NOMINAL_ENTRY_SIZE) {
            spliced.extend_from_slice(entry);
            spliced.extend_from_slice(&[0u8; 3]);
        }
        let read = BlockIndex::read(&spliced[..]).unwrap();
        assert_eq!(read.entries.len(), 2);
    }

    #[test]
    fn rejects_entry_size_below_minimum() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(INDEX_HEADER_PREFIX as u32).to_le_bytes());
        buf.extend_from_slice(&20u32.to_le_bytes());
        buf.extend_from_slice(&0u64.to_le_bytes());
        assert!(BlockIndex::read(&buf[..]).is_err());
    }

    #[test]
    fn detects_discontinuity() {
        let mut idx = sample();
        idx.entries[1].archive_id_start = 11;
        assert!(idx.validate_continuity().is_err());
    }
}
