//! File footer — exactly 32 bytes (spec §4.1):
//! `index_offset:u64, reorder_map_offset:u64 (0 ⇔ absent), global_checksum:u64,
//! "FQC_EOF\0"`.

use crate::error::{FqcError, FqcResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const FOOTER_SIZE: usize = 32;
pub const END_SENTINEL: [u8; 8] = *b"FQC_EOF\0";

#[derive(Debug, Clone, Copy)]
pub struct FileFooter {
    pub index_offset: u64,
    pub reorder_map_offset: u64,
    pub global_checksum: u64,
}

impl FileFooter {
    pub fn write<W: Write>(&self, mut w: W) -> FqcResult<()> {
        w.write_u64::<LittleEndian>(self.index_offset)?;
        w.write_u64::<LittleEndian>(self.reorder_map_offset)?;
        w.write_u64::<LittleEndian>(self.global_checksum)?;
        w.write_all(&END_SENTINEL)?;
        Ok(())
    }

    /// Read exactly `FOOTER_SIZE` bytes and validate the end sentinel.
    /// Callers are expected to have seeked to `file_len - FOOTER_SIZE`.
    pub fn read<R: Read>(mut r: R) -> FqcResult<Self> {
        let index_offset = r.read_u64::<LittleEndian>()?;
        let reorder_map_offset = r.read_u64::<LittleEndian>()?;
        let global_checksum = r.read_u64::<LittleEndian>()?;
        let mut sentinel = [0u8; 8];
        r.read_exact(&mut sentinel)?;
        if sentinel != END_SENTINEL {
            return Err(FqcError::format("footer end sentinel missing or corrupt"));
        }
        Ok(Self { index_offset, reorder_map_offset, global_checksum })
    }

    pub fn has_reorder_map(&self) -> bool {
        self.reorder_map_offset != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let footer = FileFooter { index_offset: 123, reorder_map_offset: 0, global_checksum: 0xabcd };
        let mut buf = Vec::new();
        footer.write(&mut buf).unwrap();
        assert_eq!(buf.len(), FOOTER_SIZE);
        let read = FileFooter::read(&buf[..]).unwrap();
        assert_eq!(read.index_offset, 123);
        assert!(!read.has_reorder_map());
    }

    #[test]
    fn rejects_missing_sentinel() {
        let mut buf = vec![0u8; FOOTER_SIZE];
        assert!(FileFooter::read(&buf[..]).is_err());
        buf[24..32].copy_from_slice(&END_SENTINEL);
        assert!(FileFooter::read(&buf[..]).is_ok());
    }
}
