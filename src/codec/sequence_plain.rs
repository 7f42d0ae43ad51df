//! Plain length-prefixed sequence codec (spec §4.3), used for the medium
//! and long read-length regimes where ABC's clustering cost isn't repaid by
//! its consensus gains.
//!
//! Payload: `(len:u32, bytes)` repeated once per read in block order, then
//! the whole blob passed through the general-purpose back end. Decode simply
//! walks the same framing back out; read order is preserved exactly (no
//! `original_order` indirection, unlike ABC).

use crate::codec::backend::{backend_for_family, Backend};
use crate::error::{FqcError, FqcResult};
use crate::format::CodecFamily;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

pub struct PlainEncoded {
    pub family: CodecFamily,
    pub payload: Vec<u8>,
}

pub fn encode(sequences: &[Vec<u8>], backend: Backend, level: i32) -> FqcResult<PlainEncoded> {
    let mut blob = Vec::new();
    for seq in sequences {
        blob.write_u32::<LittleEndian>(seq.len() as u32)?;
        blob.extend_from_slice(seq);
    }
    let payload = backend.codec().compress(&blob, level)?;
    Ok(PlainEncoded { family: backend.family(), payload })
}

pub fn decode(family: CodecFamily, payload: &[u8], count: usize) -> FqcResult<Vec<Vec<u8>>> {
    let backend_codec = backend_for_family(family)?;
    let blob = backend_codec.decompress(payload)?;
    let mut cursor = std::io::Cursor::new(&blob[..]);
    let mut sequences = Vec::with_capacity(count);
    for _ in 0..count {
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| FqcError::format("truncated plain sequence stream: missing length"))? as usize;
        let mut buf = vec![0u8; len];
        std::io::Read::read_exact(&mut cursor, &mut buf)
            .map_err(|_| FqcError::format("truncated plain sequence stream: missing bytes"))?;
        sequences.push(buf);
    }
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_preserves_order_and_bytes() {
        let sequences = vec![b"ACGTACGT".to_vec(), b"TTTT".to_vec(), b"GGGGCCCCAAAA".to_vec()];
        let encoded = encode(&sequences, Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, sequences.len()).unwrap();
        assert_eq!(decoded, sequences);
    }

    #[test]
    fn rejects_truncated_payload() {
        let sequences = vec![b"ACGT".to_vec()];
        let encoded = encode(&sequences, Backend::Zstd, 3).unwrap();
        assert!(decode(encoded.family, &encoded.payload, 2).is_err());
    }
}
