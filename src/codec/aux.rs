//! Auxiliary codec — read lengths (spec §4.6).
//!
//! If every read in the block shares one length, the block header's
//! `uniform_read_length` carries it and the aux stream is empty. Otherwise
//! the per-read lengths are zigzag-delta-varint encoded (with an implicit
//! `len_{-1} = 0`) and passed through the general-purpose back end.

use crate::codec::backend::Backend;
use crate::error::{FqcError, FqcResult};
use crate::format::CodecFamily;
use crate::varint::{decode_delta_series, encode_delta_series};

pub struct AuxEncoded {
    pub uniform_read_length: u32,
    pub family: CodecFamily,
    pub payload: Vec<u8>,
}

/// Encode the per-read lengths of one block.
///
/// Returns `uniform_read_length = 0` with an empty payload only when lengths
/// vary; callers must populate the header's `uniform_read_length` field with
/// this value and must not omit the aux stream when it is 0 (spec §3: "A
/// block with uniform_read_length=0 ∧ aux_size=0 is malformed").
pub fn encode(lengths: &[usize], backend: Backend, level: i32) -> FqcResult<AuxEncoded> {
    debug_assert!(!lengths.is_empty());
    let first = lengths[0];
    if lengths.iter().all(|&l| l == first) {
        return Ok(AuxEncoded {
            uniform_read_length: first as u32,
            family: CodecFamily::Raw,
            payload: Vec::new(),
        });
    }

    let values: Vec<u64> = lengths.iter().map(|&l| l as u64).collect();
    let delta_bytes = encode_delta_series(&values);
    let payload = backend.codec().compress(&delta_bytes, level)?;
    Ok(AuxEncoded { uniform_read_length: 0, family: backend.family(), payload })
}

/// Decode the per-read lengths of one block; `count` is the block's
/// `uncompressed_count`. When `uniform_read_length != 0`, `payload` must be
/// empty and every length equals it.
pub fn decode(uniform_read_length: u32, family: CodecFamily, payload: &[u8], count: usize) -> FqcResult<Vec<usize>> {
    if uniform_read_length != 0 {
        return Ok(vec![uniform_read_length as usize; count]);
    }
    if payload.is_empty() {
        return Err(FqcError::format("aux stream empty but uniform_read_length is 0"));
    }
    let backend_codec = crate::codec::backend::backend_for_family(family)?;
    let delta_bytes = backend_codec.decompress(payload)?;
    let values = decode_delta_series(&delta_bytes, count)
        .ok_or_else(|| FqcError::format("truncated aux delta-varint stream"))?;
    if values.len() != count {
        return Err(FqcError::format("aux stream length count mismatch"));
    }
    Ok(values.into_iter().map(|v| v as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_lengths_produce_empty_payload() {
        let lengths = vec![100usize; 5];
        let encoded = encode(&lengths, Backend::Zstd, 3).unwrap();
        assert_eq!(encoded.uniform_read_length, 100);
        assert!(encoded.payload.is_empty());
        let decoded = decode(100, CodecFamily::Raw, &[], 5).unwrap();
        assert_eq!(decoded, lengths);
    }

    #[test]
    fn variable_lengths_roundtrip() {
        let lengths = vec![100usize, 120, 95, 95, 300];
        let encoded = encode(&lengths, Backend::Zstd, 3).unwrap();
        assert_eq!(encoded.uniform_read_length, 0);
        let decoded = decode(0, encoded.family, &encoded.payload, lengths.len()).unwrap();
        assert_eq!(decoded, lengths);
    }
}
