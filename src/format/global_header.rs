//! Global header (spec §4.1): fixed prefix + variable tail.
//!
//! ```text
//! header_size:u32  flags:u64  compression_algo:u8  checksum_type:u8
//! reserved:u16(=0) total_read_count:u64  original_filename_len:u16
//! -- variable tail --
//! filename bytes (no terminator)  timestamp:u64  codec_params (0xFF-terminated)
//! ```
//!
//! `header_size` is the authoritative byte length of this header (prefix +
//! tail); a reader skips straight to `header_size` bytes past the magic
//! before reading the first block, so future minor versions can append
//! fields to the tail without breaking old readers (spec §8, "Forward-compat
//! skip").

use crate::error::{FqcError, FqcResult};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

// ── Flag bit layout ─────────────────────────────────────────────────────────

pub const FLAG_PAIRED_END: u64 = 1 << 0;
pub const FLAG_PRESERVE_ORDER: u64 = 1 << 1;
pub const FLAG_LEGACY_LONG_READ: u64 = 1 << 2; // reserved, must be 0
const QUALITY_MODE_SHIFT: u32 = 3;
const QUALITY_MODE_MASK: u64 = 0b11 << QUALITY_MODE_SHIFT;
const ID_MODE_SHIFT: u32 = 5;
const ID_MODE_MASK: u64 = 0b11 << ID_MODE_SHIFT;
pub const FLAG_REORDER_MAP_PRESENT: u64 = 1 << 7;
const PE_LAYOUT_SHIFT: u32 = 8;
const PE_LAYOUT_MASK: u64 = 0b11 << PE_LAYOUT_SHIFT;
const READ_LENGTH_CLASS_SHIFT: u32 = 10;
const READ_LENGTH_CLASS_MASK: u64 = 0b11 << READ_LENGTH_CLASS_SHIFT;
pub const FLAG_STREAMING_MODE: u64 = 1 << 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QualityMode {
    Lossless = 0,
    Illumina8Bin = 1,
    Qvz = 2,
    Discard = 3,
}

impl QualityMode {
    pub fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            0 => QualityMode::Lossless,
            1 => QualityMode::Illumina8Bin,
            2 => QualityMode::Qvz,
            _ => QualityMode::Discard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IdMode {
    Exact = 0,
    Tokenise = 1,
    Discard = 2,
}

impl IdMode {
    pub fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            0 => IdMode::Exact,
            1 => IdMode::Tokenise,
            _ => IdMode::Discard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PeLayout {
    Interleaved = 0,
    Consecutive = 1,
}

impl PeLayout {
    pub fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            0 => PeLayout::Interleaved,
            _ => PeLayout::Consecutive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadLengthClass {
    Short = 0,
    Medium = 1,
    Long = 2,
}

impl ReadLengthClass {
    pub fn from_bits(v: u8) -> Self {
        match v & 0b11 {
            0 => ReadLengthClass::Short,
            1 => ReadLengthClass::Medium,
            _ => ReadLengthClass::Long,
        }
    }
}

/// Typed view over the raw `flags: u64` bitfield of spec §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalFlags(pub u64);

impl GlobalFlags {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn paired_end(&self) -> bool {
        self.0 & FLAG_PAIRED_END != 0
    }
    pub fn set_paired_end(&mut self, v: bool) {
        self.set_bit(FLAG_PAIRED_END, v);
    }

    pub fn preserve_order(&self) -> bool {
        self.0 & FLAG_PRESERVE_ORDER != 0
    }
    pub fn set_preserve_order(&mut self, v: bool) {
        self.set_bit(FLAG_PRESERVE_ORDER, v);
    }

    pub fn quality_mode(&self) -> QualityMode {
        QualityMode::from_bits(((self.0 & QUALITY_MODE_MASK) >> QUALITY_MODE_SHIFT) as u8)
    }
    pub fn set_quality_mode(&mut self, mode: QualityMode) {
        self.0 = (self.0 & !QUALITY_MODE_MASK) | ((mode as u64) << QUALITY_MODE_SHIFT);
    }

    pub fn id_mode(&self) -> IdMode {
        IdMode::from_bits(((self.0 & ID_MODE_MASK) >> ID_MODE_SHIFT) as u8)
    }
    pub fn set_id_mode(&mut self, mode: IdMode) {
        self.0 = (self.0 & !ID_MODE_MASK) | ((mode as u64) << ID_MODE_SHIFT);
    }

    pub fn reorder_map_present(&self) -> bool {
        self.0 & FLAG_REORDER_MAP_PRESENT != 0
    }
    pub fn set_reorder_map_present(&mut self, v: bool) {
        self.set_bit(FLAG_REORDER_MAP_PRESENT, v);
    }

    pub fn pe_layout(&self) -> PeLayout {
        PeLayout::from_bits(((self.0 & PE_LAYOUT_MASK) >> PE_LAYOUT_SHIFT) as u8)
    }
    pub fn set_pe_layout(&mut self, layout: PeLayout) {
        self.0 = (self.0 & !PE_LAYOUT_MASK) | ((layout as u64) << PE_LAYOUT_SHIFT);
    }

    pub fn read_length_class(&self) -> ReadLengthClass {
        ReadLengthClass::from_bits(((self.0 & READ_LENGTH_CLASS_MASK) >> READ_LENGTH_CLASS_SHIFT) as u8)
    }
    pub fn set_read_length_class(&mut self, class: ReadLengthClass) {
        self.0 = (self.0 & !READ_LENGTH_CLASS_MASK) | ((class as u64) << READ_LENGTH_CLASS_SHIFT);
    }

    pub fn streaming_mode(&self) -> bool {
        self.0 & FLAG_STREAMING_MODE != 0
    }
    pub fn set_streaming_mode(&mut self, v: bool) {
        self.set_bit(FLAG_STREAMING_MODE, v);
        if v {
            // streaming_mode ⇒ preserve_order ∧ ¬has_reorder_map (spec §4.1)
            self.set_preserve_order(true);
            self.set_reorder_map_present(false);
        }
    }

    fn set_bit(&mut self, mask: u64, v: bool) {
        if v {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    /// Validate the constraints spec §4.1 fixes on this bitfield.
    pub fn validate(&self) -> FqcResult<()> {
        if self.0 & FLAG_LEGACY_LONG_READ != 0 {
            return Err(FqcError::format("reserved flag bit 2 (legacy long-read) must be 0"));
        }
        if self.streaming_mode() && (!self.preserve_order() || self.reorder_map_present()) {
            return Err(FqcError::format(
                "streaming_mode requires preserve_order=1 and reorder map absent",
            ));
        }
        Ok(())
    }
}

// ── Global header ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GlobalHeader {
    pub flags: GlobalFlags,
    pub compression_algo: u8,
    pub checksum_type: u8,
    pub total_read_count: u64,
    pub original_filename: String,
    pub timestamp: u64,
    /// Opaque codec-parameter bytes, terminated on disk by a lone `0xFF`.
    pub codec_params: Vec<u8>,
}

pub const CHECKSUM_XXHASH64: u8 = 0;

impl GlobalHeader {
    pub fn new(total_read_count: u64, original_filename: String, timestamp: u64) -> Self {
        Self {
            flags: GlobalFlags::new(),
            compression_algo: 0,
            checksum_type: CHECKSUM_XXHASH64,
            total_read_count,
            original_filename,
            timestamp,
            codec_params: Vec::new(),
        }
    }

    pub fn write<W: Write>(&self, mut w: W) -> FqcResult<()> {
        self.flags.validate()?;

        let filename_bytes = self.original_filename.as_bytes();
        if filename_bytes.len() > u16::MAX as usize {
            return Err(FqcError::Usage("original filename too long".into()));
        }
        if self.codec_params.iter().any(|&b| b == 0xFF) {
            // 0xFF is the tail terminator sentinel; the blob itself must not
            // contain it unescaped.
            return Err(FqcError::Usage("codec_params may not contain the 0xFF terminator byte".into()));
        }

        let header_size = 4 + 8 + 1 + 1 + 2 + 8 + 2
            + filename_bytes.len()
            + 8
            + self.codec_params.len()
            + 1;

        w.write_u32::<LittleEndian>(header_size as u32)?;
        w.write_u64::<LittleEndian>(self.flags.0)?;
        w.write_u8(self.compression_algo)?;
        w.write_u8(self.checksum_type)?;
        w.write_u16::<LittleEndian>(0)?; // reserved
        w.write_u64::<LittleEndian>(self.total_read_count)?;
        w.write_u16::<LittleEndian>(filename_bytes.len() as u16)?;
        w.write_all(filename_bytes)?;
        w.write_u64::<LittleEndian>(self.timestamp)?;
        w.write_all(&self.codec_params)?;
        w.write_u8(0xFF)?;
        Ok(())
    }

    /// Read the global header. Unknown extension bytes between the known
    /// prefix/tail fields and `header_size` are skipped, implementing the
    /// forward-compatibility guarantee of spec §8.
    pub fn read<R: Read>(mut r: R) -> FqcResult<Self> {
        let header_size = r.read_u32::<LittleEndian>()?;
        let flags = GlobalFlags(r.read_u64::<LittleEndian>()?);
        flags.validate()?;
        let compression_algo = r.read_u8()?;
        let checksum_type = r.read_u8()?;
        let reserved = r.read_u16::<LittleEndian>()?;
        if reserved != 0 {
            return Err(FqcError::format("global header reserved field must be 0"));
        }
        let total_read_count = r.read_u64::<LittleEndian>()?;
        let filename_len = r.read_u16::<LittleEndian>()? as usize;
        let mut filename_bytes = vec![0u8; filename_len];
        r.read_exact(&mut filename_bytes)?;
        let original_filename = String::from_utf8(filename_bytes)
            .map_err(|_| FqcError::format("original_filename is not valid UTF-8"))?;
        let timestamp = r.read_u64::<LittleEndian>()?;

        // Read the codec-parameters blob up to its 0xFF terminator.
        let mut codec_params = Vec::new();
        loop {
            let b = r.read_u8()?;
            if b == 0xFF {
                break;
            }
            codec_params.push(b);
        }

        let consumed = 4 + 8 + 1 + 1 + 2 + 8 + 2 + filename_len + 8 + codec_params.len() + 1;
        if (header_size as usize) < consumed {
            return Err(FqcError::format("global header_size smaller than its own known fields"));
        }
        // Skip any unknown extension bytes appended by a newer writer.
        let extra = header_size as usize - consumed;
        if extra > 0 {
            std::io::copy(&mut r.by_ref().take(extra as u64), &mut std::io::sink())?;
        }

        Ok(Self {
            flags,
            compression_algo,
            checksum_type,
            total_read_count,
            original_filename,
            timestamp,
            codec_params,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut hdr = GlobalHeader::new(42, "reads.fastq".into(), 1_700_000_000);
        hdr.flags.set_paired_end(true);
        hdr.flags.set_quality_mode(QualityMode::Illumina8Bin);
        hdr.flags.set_id_mode(IdMode::Tokenise);
        hdr.flags.set_reorder_map_present(true);

        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        let read = GlobalHeader::read(&buf[..]).unwrap();
        assert_eq!(read.total_read_count, 42);
        assert_eq!(read.original_filename, "reads.fastq");
        assert!(read.flags.paired_end());
        assert_eq!(read.flags.quality_mode(), QualityMode::Illumina8Bin);
        assert_eq!(read.flags.id_mode(), IdMode::Tokenise);
        assert!(read.flags.reorder_map_present());
    }

    #[test]
    fn streaming_forces_preserve_order() {
        let mut flags = GlobalFlags::new();
        flags.set_streaming_mode(true);
        assert!(flags.preserve_order());
        assert!(!flags.reorder_map_present());
        assert!(flags.validate().is_ok());
    }

    #[test]
    fn forward_compat_skip_extension_bytes() {
        let hdr = GlobalHeader::new(0, String::new(), 0);
        let mut buf = Vec::new();
        hdr.write(&mut buf).unwrap();
        // Bump header_size and splice in extra bytes just before EOF.
        let extra = [1u8, 2, 3, 4];
        let new_size = buf.len() as u32 - 1 + extra.len() as u32; // -1: terminator already counted
        buf[0..4].copy_from_slice(&new_size.to_le_bytes());
        let term = buf.pop().unwrap();
        buf.extend_from_slice(&extra);
        buf.push(term);
        let read = GlobalHeader::read(&buf[..]).unwrap();
        assert_eq!(read.total_read_count, 0);
    }
}
