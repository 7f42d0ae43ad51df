//! General-purpose back-end compressor (spec §4.1's `DELTA_LZMA`/
//! `DELTA_ZSTD`/`ZSTD_PLAIN` families share one of two back ends).
//!
//! Mirrors `sixcy::codec`'s `Codec` trait and `get_codec` dispatch, keyed on
//! the spec's 1-byte `CodecFamily` instead of a 16-byte UUID.

use crate::error::{FqcError, FqcResult};
use crate::format::CodecFamily;

pub trait BackendCodec: Send + Sync {
    fn compress(&self, data: &[u8], level: i32) -> FqcResult<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> FqcResult<Vec<u8>>;
}

pub struct ZstdBackend;
impl BackendCodec for ZstdBackend {
    fn compress(&self, data: &[u8], level: i32) -> FqcResult<Vec<u8>> {
        zstd::encode_all(data, level).map_err(|e| FqcError::Compression(e.to_string()))
    }
    fn decompress(&self, data: &[u8]) -> FqcResult<Vec<u8>> {
        zstd::decode_all(data).map_err(|e| FqcError::Compression(e.to_string()))
    }
}

pub struct LzmaBackend;
impl BackendCodec for LzmaBackend {
    fn compress(&self, data: &[u8], _level: i32) -> FqcResult<Vec<u8>> {
        let mut out = Vec::new();
        lzma_rs::lzma_compress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| FqcError::Compression(e.to_string()))?;
        Ok(out)
    }
    fn decompress(&self, data: &[u8]) -> FqcResult<Vec<u8>> {
        let mut out = Vec::new();
        lzma_rs::lzma_decompress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| FqcError::Compression(e.to_string()))?;
        Ok(out)
    }
}

/// `RAW` family: stored verbatim, used when a stream is empty/discarded or
/// when the back-end would not help (e.g. already-entropy-coded payloads).
pub struct RawBackend;
impl BackendCodec for RawBackend {
    fn compress(&self, data: &[u8], _level: i32) -> FqcResult<Vec<u8>> {
        Ok(data.to_vec())
    }
    fn decompress(&self, data: &[u8]) -> FqcResult<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Which back-end a `DELTA_ZSTD`/`DELTA_LZMA`/`ZSTD_PLAIN` family member uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Zstd,
    Lzma,
}

impl Backend {
    pub fn codec(self) -> Box<dyn BackendCodec> {
        match self {
            Backend::Zstd => Box::new(ZstdBackend),
            Backend::Lzma => Box::new(LzmaBackend),
        }
    }

    /// The codec family a block-level stream should be tagged with when
    /// this back end is used to compress it.
    pub fn family(self) -> CodecFamily {
        match self {
            Backend::Zstd => CodecFamily::DeltaZstd,
            Backend::Lzma => CodecFamily::DeltaLzma,
        }
    }
}

pub fn backend_for_family(family: CodecFamily) -> FqcResult<Box<dyn BackendCodec>> {
    match family {
        CodecFamily::Raw => Ok(Box::new(RawBackend)),
        CodecFamily::DeltaZstd | CodecFamily::ZstdPlain => Ok(Box::new(ZstdBackend)),
        CodecFamily::DeltaLzma => Ok(Box::new(LzmaBackend)),
        other => Err(FqcError::UnsupportedCodec(other as u8)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zstd_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(20);
        let c = ZstdBackend;
        let compressed = c.compress(&data, 3).unwrap();
        let decompressed = c.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn lzma_roundtrip() {
        let data = b"ACGTACGTACGTACGTACGT".repeat(10);
        let c = LzmaBackend;
        let compressed = c.compress(&data, 0).unwrap();
        let decompressed = c.decompress(&compressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn raw_passthrough() {
        let data = b"anything".to_vec();
        let c = RawBackend;
        assert_eq!(c.compress(&data, 0).unwrap(), data);
        assert_eq!(c.decompress(&data).unwrap(), data);
    }
}
