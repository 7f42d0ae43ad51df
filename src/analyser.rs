//! Global analyser — Phase 1 (spec §4.8): regime classification,
//! minimizer-based reordering for short reads, and block-boundary
//! computation. Memory-budget-driven divide-and-conquer chunking is
//! implemented as a thin wrapper in [`crate::pipeline`] that re-invokes the
//! analyser and the rest of the pipeline per chunk and shifts each chunk's
//! reorder map by its archive-id offset before concatenation (spec §9).

use crate::format::{ReadLengthClass, ReorderMap};
use crate::record::LengthStats;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Classify the read-length regime from sampled statistics (spec §4.8).
/// Streaming input can't be sampled representatively, so it conservatively
/// classifies as medium (no ABC clustering, no reordering).
pub fn classify_regime(stats: LengthStats, streaming: bool) -> ReadLengthClass {
    if streaming {
        return ReadLengthClass::Medium;
    }
    if stats.max_length >= 10_000 {
        ReadLengthClass::Long
    } else if stats.max_length > 511 {
        ReadLengthClass::Medium
    } else if stats.median_length >= 1_000 {
        ReadLengthClass::Medium
    } else {
        ReadLengthClass::Short
    }
}

pub fn default_reads_per_block(class: ReadLengthClass) -> u32 {
    match class {
        ReadLengthClass::Short => 100_000,
        ReadLengthClass::Medium => 50_000,
        ReadLengthClass::Long => 10_000,
    }
}

/// Reordering only ever runs for the short regime (spec §4.8).
pub fn reordering_enabled(class: ReadLengthClass, reorder_requested: bool) -> bool {
    reorder_requested && class == ReadLengthClass::Short
}

fn base_code(b: u8) -> Option<u64> {
    match b {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' => Some(3),
        _ => None,
    }
}

fn complement_code(c: u64) -> u64 {
    3 - c
}

/// Canonical hash of every valid (N-free) k-mer in `seq`, by starting
/// position. `None` marks a window that straddles an `N`.
fn canonical_kmer_hashes(seq: &[u8], k: usize) -> Vec<Option<u64>> {
    if seq.len() < k {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(seq.len() - k + 1);
    'windows: for start in 0..=seq.len() - k {
        let mut fwd = 0u64;
        let mut rev = 0u64;
        for i in 0..k {
            let code = match base_code(seq[start + i]) {
                Some(c) => c,
                None => {
                    out.push(None);
                    continue 'windows;
                }
            };
            fwd = (fwd << 2) | code;
            rev |= complement_code(code) << (2 * i);
        }
        out.push(Some(fwd.min(rev)));
    }
    out
}

/// For each read, the set of distinct minimizer hashes found by sliding a
/// `w`-wide window of k-mer hashes over it (spec §4.8).
fn minimizers_for_read(seq: &[u8], w: usize, k: usize) -> Vec<u64> {
    let kmers = canonical_kmer_hashes(seq, k);
    if kmers.len() < w {
        return kmers.into_iter().flatten().collect::<std::collections::BTreeSet<_>>().into_iter().collect();
    }
    let mut minimizers = std::collections::BTreeSet::new();
    for window in kmers.windows(w) {
        if let Some(min) = window.iter().flatten().min() {
            minimizers.insert(*min);
        }
    }
    minimizers.into_iter().collect()
}

struct MinimizerIndex {
    per_read: Vec<Vec<u64>>,
    buckets: HashMap<u64, Vec<u32>>,
}

fn build_minimizer_index(sequences: &[Vec<u8>], w: usize, k: usize) -> MinimizerIndex {
    let per_read: Vec<Vec<u64>> = sequences.iter().map(|s| minimizers_for_read(s, w, k)).collect();
    let mut buckets: HashMap<u64, Vec<u32>> = HashMap::new();
    for (read_id, minimizers) in per_read.iter().enumerate() {
        for &m in minimizers {
            buckets.entry(m).or_default().push(read_id as u32);
        }
    }
    MinimizerIndex { per_read, buckets }
}

/// Hamming distance over the overlapping prefix of two sequences; positions
/// beyond the shorter sequence's length don't contribute.
fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b.iter()).filter(|(x, y)| x != y).count() as u32
}

/// Construct an approximate Hamiltonian path over `sequences` that places
/// reads sharing a minimizer next to each other (spec §4.8). Returns the
/// archive-order list of original read indices.
pub fn reorder_short_reads(sequences: &[Vec<u8>], w: usize, k: usize, max_search: usize, cancel: &AtomicBool) -> Option<Vec<u32>> {
    let n = sequences.len();
    if n == 0 {
        return Some(Vec::new());
    }
    let index = build_minimizer_index(sequences, w, k);

    let mut used = vec![false; n];
    let mut ordering = Vec::with_capacity(n);
    let mut tail = 0u32;
    used[0] = true;
    ordering.push(0);

    while ordering.len() < n {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        let mut best: Option<(u32, u32)> = None; // (read_id, distance)
        for &minimizer in &index.per_read[tail as usize] {
            let bucket = match index.buckets.get(&minimizer) {
                Some(b) => b,
                None => continue,
            };
            for &candidate in bucket.iter().take(max_search) {
                if used[candidate as usize] {
                    continue;
                }
                let d = hamming_distance(&sequences[tail as usize], &sequences[candidate as usize]);
                if best.map(|(_, bd)| d < bd).unwrap_or(true) {
                    best = Some((candidate, d));
                }
            }
        }
        let next = match best {
            Some((candidate, _)) => candidate,
            None => (0..n as u32).find(|&i| !used[i as usize]).expect("unused read must exist"),
        };
        used[next as usize] = true;
        ordering.push(next);
        tail = next;
    }
    Some(ordering)
}

/// Build the bijective reorder map from an archive-order list of original
/// indices (spec §4.8: "forward map original → archive; reverse is the
/// inverse").
pub fn reorder_map_from_ordering(ordering: &[u32]) -> ReorderMap {
    let mut forward = vec![0u64; ordering.len()];
    for (archive_pos, &original) in ordering.iter().enumerate() {
        forward[original as usize] = archive_pos as u64;
    }
    ReorderMap::from_forward(forward)
}

/// Contiguous block boundaries over `[0, total_reads)` (spec §4.8).
/// `block_id_offset` lets divide-and-conquer chunks keep globally
/// continuous block ids.
pub fn block_boundaries(total_reads: u64, reads_per_block: u32, block_id_offset: u32) -> Vec<(u32, u64, u64)> {
    let mut blocks = Vec::new();
    let mut start = 0u64;
    let mut block_id = block_id_offset;
    while start < total_reads {
        let count = (reads_per_block as u64).min(total_reads - start);
        blocks.push((block_id, start, count));
        start += count;
        block_id += 1;
    }
    blocks
}

/// Approximate Phase-1 + Phase-2 memory cost in bytes (spec §4.8).
pub fn estimated_memory_bytes(total_reads: u64, reads_per_block: u32, in_flight_blocks: usize) -> u64 {
    let phase1 = 24 * total_reads;
    let phase2 = 50 * reads_per_block as u64 * in_flight_blocks as u64;
    phase1 + phase2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_short() {
        let stats = LengthStats { median_length: 150, max_length: 151 };
        assert_eq!(classify_regime(stats, false), ReadLengthClass::Short);
    }

    #[test]
    fn classify_medium_by_spring_abc_safety_cut() {
        let stats = LengthStats { median_length: 150, max_length: 600 };
        assert_eq!(classify_regime(stats, false), ReadLengthClass::Medium);
    }

    #[test]
    fn classify_long() {
        let stats = LengthStats { median_length: 9000, max_length: 15_000 };
        assert_eq!(classify_regime(stats, false), ReadLengthClass::Long);
    }

    #[test]
    fn streaming_forces_medium() {
        let stats = LengthStats { median_length: 100, max_length: 100 };
        assert_eq!(classify_regime(stats, true), ReadLengthClass::Medium);
    }

    #[test]
    fn block_boundaries_cover_range_contiguously() {
        let blocks = block_boundaries(250_000, 100_000, 0);
        assert_eq!(blocks, vec![(0, 0, 100_000), (1, 100_000, 100_000), (2, 200_000, 50_000)]);
    }

    #[test]
    fn block_boundaries_respect_id_offset() {
        let blocks = block_boundaries(100, 50, 7);
        assert_eq!(blocks, vec![(7, 0, 50), (8, 50, 50)]);
    }

    #[test]
    fn reorder_produces_valid_bijection() {
        let sequences: Vec<Vec<u8>> = (0..20)
            .map(|i| if i % 2 == 0 { b"ACGTACGTACGTACGTACGT".to_vec() } else { b"TTTTACGTACGTACGTACGT".to_vec() })
            .collect();
        let cancel = AtomicBool::new(false);
        let ordering = reorder_short_reads(&sequences, 4, 6, 1000, &cancel).unwrap();
        assert_eq!(ordering.len(), sequences.len());
        let map = reorder_map_from_ordering(&ordering);
        map.validate().unwrap();
    }

    #[test]
    fn reorder_cancellation_returns_none() {
        let sequences: Vec<Vec<u8>> = (0..10).map(|_| b"ACGTACGTACGTACGT".to_vec()).collect();
        let cancel = AtomicBool::new(true);
        assert!(reorder_short_reads(&sequences, 4, 6, 1000, &cancel).is_none());
    }
}
