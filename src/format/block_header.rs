//! Block header — exactly 104 bytes (spec §4.1).
//!
//! ```text
//! header_size:u32  block_id:u32  checksum_type:u8
//! codec_ids:u8  codec_seq:u8  codec_qual:u8  codec_aux:u8
//! reserved1:u8(=0)  reserved2:u16(=0)  block_xxhash64:u64
//! uncompressed_count:u32  uniform_read_length:u32  compressed_size:u64
//! (offset:u64,size:u64) x 4   -- ids, seq, qual, aux, in that order
//! ```

use crate::error::{FqcError, FqcResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub const BLOCK_HEADER_SIZE: usize = 104;

/// Codec family, decoded from the high nibble of a codec byte (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CodecFamily {
    Raw = 0,
    AbcV1 = 1,
    ScmV1 = 2,
    DeltaLzma = 3,
    DeltaZstd = 4,
    ZstdPlain = 5,
    DeltaVarint = 6,
    ScmOrder1 = 7,
}

impl CodecFamily {
    pub fn from_u8(v: u8) -> FqcResult<Self> {
        Ok(match v {
            0 => CodecFamily::Raw,
            1 => CodecFamily::AbcV1,
            2 => CodecFamily::ScmV1,
            3 => CodecFamily::DeltaLzma,
            4 => CodecFamily::DeltaZstd,
            5 => CodecFamily::ZstdPlain,
            6 => CodecFamily::DeltaVarint,
            7 => CodecFamily::ScmOrder1,
            other => return Err(FqcError::UnsupportedCodec(other)),
        })
    }
}

/// A `(family:4, version:4)` packed codec tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecTag {
    pub family: CodecFamily,
    pub version: u8,
}

impl CodecTag {
    pub fn new(family: CodecFamily, version: u8) -> Self {
        Self { family, version: version & 0x0f }
    }

    pub fn to_byte(self) -> u8 {
        ((self.family as u8) << 4) | (self.version & 0x0f)
    }

    pub fn from_byte(b: u8) -> FqcResult<Self> {
        let family = CodecFamily::from_u8(b >> 4)?;
        Ok(Self { family, version: b & 0x0f })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreamRegion {
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BlockHeader {
    pub block_id: u32,
    pub checksum_type: u8,
    pub codec_ids: CodecTag,
    pub codec_seq: CodecTag,
    pub codec_qual: CodecTag,
    pub codec_aux: CodecTag,
    pub block_xxhash64: u64,
    pub uncompressed_count: u32,
    /// 0 means variable length; the aux stream carries per-read lengths.
    pub uniform_read_length: u32,
    pub compressed_size: u64,
    pub ids: StreamRegion,
    pub seq: StreamRegion,
    pub qual: StreamRegion,
    pub aux: StreamRegion,
}

impl BlockHeader {
    pub fn write<W: Write>(&self, mut w: W) -> FqcResult<()> {
        if self.uniform_read_length == 0 && self.aux.size == 0 {
            return Err(FqcError::format_at(
                "block with uniform_read_length=0 must carry a non-empty aux stream",
                self.block_id,
            ));
        }

        w.write_u32::<LittleEndian>(BLOCK_HEADER_SIZE as u32)?;
        w.write_u32::<LittleEndian>(self.block_id)?;
        w.write_u8(self.checksum_type)?;
        w.write_u8(self.codec_ids.to_byte())?;
        w.write_u8(self.codec_seq.to_byte())?;
        w.write_u8(self.codec_qual.to_byte())?;
        w.write_u8(self.codec_aux.to_byte())?;
        w.write_u8(0)?; // reserved1
        w.write_u16::<LittleEndian>(0)?; // reserved2
        w.write_u64::<LittleEndian>(self.block_xxhash64)?;
        w.write_u32::<LittleEndian>(self.uncompressed_count)?;
        w.write_u32::<LittleEndian>(self.uniform_read_length)?;
        w.write_u64::<LittleEndian>(self.compressed_size)?;
        for region in [&self.ids, &self.seq, &self.qual, &self.aux] {
            w.write_u64::<LittleEndian>(region.offset)?;
            w.write_u64::<LittleEndian>(region.size)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(mut r: R) -> FqcResult<Self> {
        let header_size = r.read_u32::<LittleEndian>()?;
        if header_size as usize != BLOCK_HEADER_SIZE {
            return Err(FqcError::format(format!(
                "block header_size {header_size} != expected {BLOCK_HEADER_SIZE}"
            )));
        }
        let block_id = r.read_u32::<LittleEndian>()?;
        let checksum_type = r.read_u8()?;
        let codec_ids = CodecTag::from_byte(r.read_u8()?)?;
        let codec_seq = CodecTag::from_byte(r.read_u8()?)?;
        let codec_qual = CodecTag::from_byte(r.read_u8()?)?;
        let codec_aux = CodecTag::from_byte(r.read_u8()?)?;
        let reserved1 = r.read_u8()?;
        let reserved2 = r.read_u16::<LittleEndian>()?;
        if reserved1 != 0 || reserved2 != 0 {
            return Err(FqcError::format_at("block header reserved fields must be 0", block_id));
        }
        let block_xxhash64 = r.read_u64::<LittleEndian>()?;
        let uncompressed_count = r.read_u32::<LittleEndian>()?;
        let uniform_read_length = r.read_u32::<LittleEndian>()?;
        let compressed_size = r.read_u64::<LittleEndian>()?;

        let mut regions = [StreamRegion::default(); 4];
        for region in regions.iter_mut() {
            region.offset = r.read_u64::<LittleEndian>()?;
            region.size = r.read_u64::<LittleEndian>()?;
        }
        let [ids, seq, qual, aux] = regions;

        if uniform_read_length == 0 && aux.size == 0 {
            return Err(FqcError::format_at(
                "block with uniform_read_length=0 must carry a non-empty aux stream",
                block_id,
            ));
        }
        if uncompressed_count == 0 {
            return Err(FqcError::format_at("block declares zero reads", block_id));
        }

        Ok(Self {
            block_id,
            checksum_type,
            codec_ids,
            codec_seq,
            codec_qual,
            codec_aux,
            block_xxhash64,
            uncompressed_count,
            uniform_read_length,
            compressed_size,
            ids,
            seq,
            qual,
            aux,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BlockHeader {
        BlockHeader {
            block_id: 7,
            checksum_type: 0,
            codec_ids: CodecTag::new(CodecFamily::DeltaZstd, 1),
            codec_seq: CodecTag::new(CodecFamily::AbcV1, 1),
            codec_qual: CodecTag::new(CodecFamily::ScmV1, 1),
            codec_aux: CodecTag::new(CodecFamily::DeltaVarint, 1),
            block_xxhash64: 0xdead_beef_1234_5678,
            uncompressed_count: 100,
            uniform_read_length: 0,
            compressed_size: 400,
            ids: StreamRegion { offset: 0, size: 100 },
            seq: StreamRegion { offset: 100, size: 150 },
            qual: StreamRegion { offset: 250, size: 140 },
            aux: StreamRegion { offset: 390, size: 10 },
        }
    }

    #[test]
    fn roundtrip() {
        let hdr = sample();
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        assert_eq!(buf.len(), BLOCK_HEADER_SIZE);
        let read = BlockHeader::read(&buf[..]).unwrap();
        assert_eq!(read.block_id, 7);
        assert_eq!(read.codec_seq.family, CodecFamily::AbcV1);
        assert_eq!(read.uncompressed_count, 100);
    }

    #[test]
    fn rejects_uniform_zero_with_empty_aux() {
        let mut hdr = sample();
        hdr.uniform_read_length = 0;
        hdr.aux.size = 0;
        let mut buf = Vec::new();
        assert!(hdr.write(&mut buf).is_err());
    }

    #[test]
    fn codec_tag_pack_unpack() {
        let tag = CodecTag::new(CodecFamily::ScmOrder1, 9);
        let byte = tag.to_byte();
        let back = CodecTag::from_byte(byte).unwrap();
        assert_eq!(back.family, CodecFamily::ScmOrder1);
        assert_eq!(back.version, 9 & 0x0f);
    }
}
