//! ABC_V1 — assembly-based sequence codec for short reads (spec §4.2).
//!
//! Reads are clustered by alignment search against a running per-position
//! base-count consensus; each read is then stored as a `(shift, orientation,
//! sparse edit list)` delta against its cluster's finalised consensus. The
//! whole serialised blob is passed through the general-purpose back end.

use crate::codec::backend::{backend_for_family, Backend};
use crate::error::{FqcError, FqcResult};
use crate::format::CodecFamily;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

pub const DEFAULT_MAX_SHIFT: i16 = 15;
pub const DEFAULT_HAMMING_THRESHOLD: u32 = 8;

const REVERSE_COMPLEMENT_FLAG: u8 = 0x01;

fn base_index(b: u8) -> Option<usize> {
    match b {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Fixed ref-major substitution table (spec §4.2): for each reference base,
/// the three non-identity bases in a fixed empirical order map to noise
/// symbols `0,1,2`; `N` always maps to symbol `3`. Frozen as part of
/// `ABC_V1` — changing this table changes the wire format.
const NOISE_TABLE: [[u8; 3]; 4] = [
    [b'G', b'C', b'T'], // ref A: transition (A<->G) first
    [b'T', b'A', b'G'], // ref C: transition (C<->T) first
    [b'A', b'C', b'T'], // ref G: transition (G<->A) first
    [b'C', b'A', b'G'], // ref T: transition (T<->C) first
];

fn noise_symbol(refb: u8, readb: u8) -> Option<u8> {
    if readb == refb {
        return None;
    }
    if readb == b'N' {
        return Some(3);
    }
    let ref_idx = base_index(refb).unwrap_or(0);
    NOISE_TABLE[ref_idx].iter().position(|&b| b == readb).map(|p| p as u8)
}

fn noise_decode(refb: u8, symbol: u8) -> u8 {
    if symbol == 3 {
        return b'N';
    }
    let ref_idx = base_index(refb).unwrap_or(0);
    NOISE_TABLE[ref_idx][symbol as usize]
}

fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter()
        .rev()
        .map(|&b| match b {
            b'A' => b'T',
            b'C' => b'G',
            b'G' => b'C',
            b'T' => b'A',
            _ => b'N',
        })
        .collect()
}

fn consensus_char(counts: &[u16; 4]) -> u8 {
    let mut best = 0usize;
    for i in 1..4 {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    BASES[best]
}

/// A read pending inclusion in a contig: its orientation-applied bases plus
/// its alignment offset, tracked until the cluster closes and the
/// consensus is finalised (additions after this point can still shift it).
struct PendingDelta {
    original_order: u32,
    shift: i32,
    reverse_complement: bool,
    bases: Vec<u8>,
}

struct OpenCluster {
    counts: Vec<[u16; 4]>,
    deltas: Vec<PendingDelta>,
}

impl OpenCluster {
    fn seed(original_order: u32, bases: Vec<u8>) -> Self {
        let mut counts = vec![[0u16; 4]; bases.len()];
        for (i, &b) in bases.iter().enumerate() {
            if let Some(idx) = base_index(b) {
                counts[i][idx] = counts[i][idx].saturating_add(1);
            }
        }
        Self { counts, deltas: vec![PendingDelta { original_order, shift: 0, reverse_complement: false, bases }] }
    }

    /// Hamming distance of `bases` laid out at `shift` against the current
    /// (not yet finalised) consensus, restricted to the overlapping region.
    /// Alignments with zero overlap are never candidates: an empty overlap
    /// trivially has distance zero and would let a cluster absorb
    /// unrelated reads at an arbitrary offset.
    fn distance_at_shift(&self, bases: &[u8], shift: i32) -> Option<u32> {
        let mut mismatches = 0u32;
        let mut overlap = 0u32;
        for (j, &rb) in bases.iter().enumerate() {
            let idx = shift + j as i32;
            if idx < 0 || idx as usize >= self.counts.len() {
                continue;
            }
            overlap += 1;
            let cb = consensus_char(&self.counts[idx as usize]);
            if cb != rb {
                mismatches += 1;
            }
        }
        if overlap == 0 {
            None
        } else {
            Some(mismatches)
        }
    }

    /// Best `(shift, reverse_complement, distance)` over both orientations
    /// within `[-max_shift, max_shift]`, ties broken by smaller `|shift|`
    /// then forward orientation.
    fn best_alignment(&self, fwd: &[u8], rev: &[u8], max_shift: i16) -> Option<(i32, bool, u32)> {
        let mut best: Option<(i32, bool, u32)> = None;
        for shift in -(max_shift as i32)..=(max_shift as i32) {
            for (bases, is_rc) in [(fwd, false), (rev, true)] {
                if let Some(d) = self.distance_at_shift(bases, shift) {
                    let better = match best {
                        None => true,
                        Some((bs, brc, bd)) => {
                            d < bd || (d == bd && (shift.abs() < bs.abs() || (shift.abs() == bs.abs() && !is_rc && brc)))
                        }
                    };
                    if better {
                        best = Some((shift, is_rc, d));
                    }
                }
            }
        }
        best
    }

    /// Add a read at `shift` (already chosen by `best_alignment`), growing
    /// and/or renumbering the consensus coordinate system as needed.
    fn add(&mut self, original_order: u32, shift: i32, reverse_complement: bool, bases: Vec<u8>) {
        let normalized_shift = if shift < 0 {
            let pad = (-shift) as usize;
            let mut grown = vec![[0u16; 4]; pad];
            grown.extend_from_slice(&self.counts);
            self.counts = grown;
            for d in &mut self.deltas {
                d.shift += pad as i32;
            }
            0
        } else {
            shift
        };

        let needed = normalized_shift as usize + bases.len();
        if needed > self.counts.len() {
            self.counts.resize(needed, [0u16; 4]);
        }
        for (j, &b) in bases.iter().enumerate() {
            if let Some(idx) = base_index(b) {
                let pos = normalized_shift as usize + j;
                self.counts[pos][idx] = self.counts[pos][idx].saturating_add(1);
            }
        }
        self.deltas.push(PendingDelta { original_order, shift: normalized_shift, reverse_complement, bases });
    }

    fn finalize(self) -> Contig {
        let consensus: Vec<u8> = self.counts.iter().map(consensus_char).collect();
        let deltas = self
            .deltas
            .into_iter()
            .map(|d| {
                let mut mismatches = Vec::new();
                for (j, &rb) in d.bases.iter().enumerate() {
                    let idx = d.shift + j as i32;
                    let refb = if idx >= 0 && (idx as usize) < consensus.len() { consensus[idx as usize] } else { b'N' };
                    if let Some(sym) = noise_symbol(refb, rb) {
                        mismatches.push((j as u16, sym));
                    }
                }
                Delta {
                    original_order: d.original_order,
                    shift: d.shift as i16,
                    reverse_complement: d.reverse_complement,
                    read_length: d.bases.len() as u16,
                    mismatches,
                }
            })
            .collect();
        Contig { consensus, deltas }
    }
}

struct Delta {
    original_order: u32,
    shift: i16,
    reverse_complement: bool,
    read_length: u16,
    mismatches: Vec<(u16, u8)>,
}

struct Contig {
    consensus: Vec<u8>,
    deltas: Vec<Delta>,
}

pub struct AbcEncoded {
    pub family: CodecFamily,
    pub payload: Vec<u8>,
}

pub fn encode(
    sequences: &[Vec<u8>],
    max_shift: i16,
    hamming_threshold: u32,
    backend: Backend,
    level: i32,
) -> FqcResult<AbcEncoded> {
    let mut contigs = Vec::new();
    let mut current: Option<OpenCluster> = None;

    for (i, seq) in sequences.iter().enumerate() {
        let order = i as u32;
        let fwd = seq.clone();
        let rev = reverse_complement(seq);

        let accepted = if let Some(cluster) = current.as_mut() {
            match cluster.best_alignment(&fwd, &rev, max_shift) {
                Some((shift, is_rc, distance)) if distance <= hamming_threshold => {
                    let bases = if is_rc { rev.clone() } else { fwd.clone() };
                    cluster.add(order, shift, is_rc, bases);
                    true
                }
                _ => false,
            }
        } else {
            false
        };

        if !accepted {
            if let Some(cluster) = current.take() {
                contigs.push(cluster.finalize());
            }
            current = Some(OpenCluster::seed(order, fwd));
        }
    }
    if let Some(cluster) = current {
        contigs.push(cluster.finalize());
    }

    let blob = serialize(&contigs)?;
    let payload = backend.codec().compress(&blob, level)?;
    Ok(AbcEncoded { family: backend.family(), payload })
}

fn serialize(contigs: &[Contig]) -> FqcResult<Vec<u8>> {
    let mut out = Vec::new();
    out.write_u32::<LittleEndian>(contigs.len() as u32)?;
    for contig in contigs {
        out.write_u16::<LittleEndian>(contig.consensus.len() as u16)?;
        out.write_all(&contig.consensus)?;
        out.write_u32::<LittleEndian>(contig.deltas.len() as u32)?;
        for delta in &contig.deltas {
            out.write_u32::<LittleEndian>(delta.original_order)?;
            out.write_i16::<LittleEndian>(delta.shift)?;
            let flags = if delta.reverse_complement { REVERSE_COMPLEMENT_FLAG } else { 0 };
            out.write_u8(flags)?;
            out.write_u16::<LittleEndian>(delta.read_length)?;
            out.write_u16::<LittleEndian>(delta.mismatches.len() as u16)?;
            for &(pos, _) in &delta.mismatches {
                out.write_u16::<LittleEndian>(pos)?;
            }
            for &(_, sym) in &delta.mismatches {
                out.write_u8(sym)?;
            }
        }
    }
    Ok(out)
}

pub fn decode(family: CodecFamily, payload: &[u8], count: usize) -> FqcResult<Vec<Vec<u8>>> {
    let backend_codec = backend_for_family(family)?;
    let blob = backend_codec.decompress(payload)?;
    let mut cursor = Cursor::new(&blob[..]);

    let truncated = || FqcError::format("truncated ABC sequence stream");

    let num_contigs = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
    let mut sequences: Vec<Vec<u8>> = vec![Vec::new(); count];
    let mut filled = vec![false; count];

    for _ in 0..num_contigs {
        let consensus_len = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
        let mut consensus = vec![0u8; consensus_len];
        cursor.read_exact(&mut consensus).map_err(|_| truncated())?;
        let num_deltas = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;

        for _ in 0..num_deltas {
            let original_order = cursor.read_u32::<LittleEndian>().map_err(|_| truncated())?;
            let shift = cursor.read_i16::<LittleEndian>().map_err(|_| truncated())? as i32;
            let flags = cursor.read_u8().map_err(|_| truncated())?;
            let read_length = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;
            let num_mismatches = cursor.read_u16::<LittleEndian>().map_err(|_| truncated())? as usize;

            let mut positions = Vec::with_capacity(num_mismatches);
            for _ in 0..num_mismatches {
                positions.push(cursor.read_u16::<LittleEndian>().map_err(|_| truncated())?);
            }
            let mut symbols = Vec::with_capacity(num_mismatches);
            for _ in 0..num_mismatches {
                symbols.push(cursor.read_u8().map_err(|_| truncated())?);
            }

            let mut bases = vec![0u8; read_length];
            for (j, slot) in bases.iter_mut().enumerate() {
                let idx = shift + j as i32;
                *slot = if idx >= 0 && (idx as usize) < consensus.len() { consensus[idx as usize] } else { b'N' };
            }
            for (pos, sym) in positions.into_iter().zip(symbols) {
                let slot = bases.get_mut(pos as usize).ok_or_else(truncated)?;
                *slot = noise_decode(*slot, sym);
            }

            if flags & REVERSE_COMPLEMENT_FLAG != 0 {
                bases = reverse_complement(&bases);
            }

            let slot = sequences.get_mut(original_order as usize).ok_or_else(truncated)?;
            *slot = bases;
            filled[original_order as usize] = true;
        }
    }

    if filled.iter().any(|&f| !f) {
        return Err(FqcError::format("ABC sequence stream did not cover every original_order slot"));
    }
    Ok(sequences)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // noise_decode/noise_symbol must be exact inverses across the whole
        // fixed substitution table: decoding symbol `s` against reference
        // base `ref_idx` and re-deriving the symbol from the result must
        // recover `s`, for every (ref, symbol) pair the table defines.
        #[test]
        fn noise_table_roundtrip(ref_idx in 0usize..4, symbol in 0u8..4) {
            let refb = BASES[ref_idx];
            let readb = noise_decode(refb, symbol);
            prop_assert_eq!(noise_symbol(refb, readb), Some(symbol));
        }
    }

    #[test]
    fn single_cluster_roundtrip() {
        let sequences = vec![
            b"ACGTACGTACGT".to_vec(),
            b"ACGTACGTACGT".to_vec(),
            b"ACGTACGAACGT".to_vec(), // single mismatch at position 7
        ];
        let encoded = encode(&sequences, DEFAULT_MAX_SHIFT, DEFAULT_HAMMING_THRESHOLD, Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, sequences.len()).unwrap();
        assert_eq!(decoded, sequences);
    }

    #[test]
    fn distant_reads_open_separate_contigs() {
        let sequences = vec![b"AAAAAAAAAAAA".to_vec(), b"GGGGGGGGGGGG".to_vec(), b"AAAAAAAAAAAA".to_vec()];
        let encoded = encode(&sequences, DEFAULT_MAX_SHIFT, DEFAULT_HAMMING_THRESHOLD, Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, sequences.len()).unwrap();
        assert_eq!(decoded, sequences);
    }

    #[test]
    fn n_bases_roundtrip_as_edits() {
        let sequences = vec![b"ACGTACGT".to_vec(), b"ACGTNCGT".to_vec()];
        let encoded = encode(&sequences, DEFAULT_MAX_SHIFT, DEFAULT_HAMMING_THRESHOLD, Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, sequences.len()).unwrap();
        assert_eq!(decoded, sequences);
    }

    #[test]
    fn shifted_read_roundtrip() {
        let sequences = vec![b"NNACGTACGTGG".to_vec()[2..10].to_vec(), b"ACGTACGTGGTT".to_vec()];
        let encoded = encode(&sequences, DEFAULT_MAX_SHIFT, DEFAULT_HAMMING_THRESHOLD, Backend::Zstd, 3).unwrap();
        let decoded = decode(encoded.family, &encoded.payload, sequences.len()).unwrap();
        assert_eq!(decoded, sequences);
    }
}
