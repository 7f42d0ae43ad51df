//! Pipeline engine (spec §4.9, §5): reads a chunk of records, compresses its
//! blocks in parallel, writes them to the archive in ascending `block_id`
//! order.
//!
//! The chunk itself *is* the divide-and-conquer unit of spec §4.8's memory
//! budget: rather than track a separate bounded channel of in-flight blocks
//! within an unbounded input, [`compress_to_archive`] sizes each chunk so its
//! own `Phase 1 + Phase 2` cost fits `memory_limit_mb`, reads that many
//! records, reorders and splits them into blocks, and only then hands the
//! whole batch to Rayon. This also resolves the tension between the global
//! header's fixed `total_read_count` field and a forward-only streaming
//! parser: the count isn't known until the last chunk finishes, at which
//! point it's patched into the already-written header the same way
//! `sixcy::io_stream::SixCyWriter` patches its superblock in place on
//! `finalize()`.

use crate::analyser::{
    block_boundaries, classify_regime, default_reads_per_block, reorder_map_from_ordering, reorder_short_reads,
    reordering_enabled,
};
use crate::block_compressor::{global_flags_for, BlockCompressor};
use crate::codec::Backend;
use crate::config::CompressConfig;
use crate::error::{FqcError, FqcResult};
use crate::format::{GlobalHeader, ReadLengthClass, ReorderMap};
use crate::record::{sample_length_stats, FastqParser, ReadRecord};
use crate::writer::Writer;
use log::{debug, info, warn};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const CACHE_LINE: usize = 64;
/// Records sampled for regime classification (spec §4.8: "Sample
/// `min(1000, total_reads)` records").
const REGIME_SAMPLE_SIZE: usize = 1000;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

/// Cache-line-aligned pool of reusable byte buffers (spec §5: "Worker-private
/// buffers are drawn from a cache-line-aligned buffer pool... that serialises
/// acquire/release under a short-held mutex"). Backs [`Writer`]'s per-block
/// scratch buffer, the hottest repeated allocation in the write path.
pub struct BufferPool {
    buffers: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self { buffers: Mutex::new(Vec::new()) }
    }

    /// Take a buffer with at least `min_capacity` bytes of capacity, reusing
    /// a previously released one when one is large enough.
    pub fn acquire(&self, min_capacity: usize) -> Vec<u8> {
        let mut buffers = self.buffers.lock().expect("buffer pool mutex poisoned");
        match buffers.iter().position(|b| b.capacity() >= min_capacity) {
            Some(idx) => {
                let mut buf = buffers.swap_remove(idx);
                buf.clear();
                buf
            }
            None => Vec::with_capacity(align_up(min_capacity, CACHE_LINE)),
        }
    }

    pub fn release(&self, buf: Vec<u8>) {
        self.buffers.lock().expect("buffer pool mutex poisoned").push(buf);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Compress one already-read batch of blocks in parallel and write them to
/// `writer` in ascending `block_id` order (spec §4.9 stages 2–3; stage 1 is
/// the chunk read loop in [`compress_to_archive`]).
///
/// Mirrors `sixcy::perf::compress_chunks_parallel`'s `par_iter().map().collect()`
/// shape: every block is independent, so a plain parallel map followed by an
/// in-order write satisfies "compressors may execute in any order; writer
/// consumes strictly ascending" without a channel of its own.
fn compress_blocks_parallel(
    config: &CompressConfig,
    blocks: Vec<(u32, Vec<ReadRecord>)>,
    regime: ReadLengthClass,
    writer: &mut Writer,
    archive_id_offset: u64,
    cancel: &AtomicBool,
) -> FqcResult<u64> {
    use rayon::prelude::*;

    let worker_count = config.effective_thread_count().max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count)
        .build()
        .map_err(|e| FqcError::Memory(e.to_string()))?;

    let results: Vec<FqcResult<(u32, crate::block_compressor::CompressedBlock)>> = pool.install(|| {
        blocks
            .into_par_iter()
            .map(|(block_id, records)| {
                if cancel.load(Ordering::Relaxed) {
                    return Err(FqcError::Cancelled);
                }
                let mut compressor = BlockCompressor::new(config.clone());
                let block = compressor.compress(&records, block_id, regime)?;
                debug!("compressed block {block_id} ({} reads)", block.header.uncompressed_count);
                Ok((block_id, block))
            })
            .collect()
    });

    let mut ordered = Vec::with_capacity(results.len());
    for r in results {
        ordered.push(r?);
    }
    ordered.sort_unstable_by_key(|(id, _)| *id);

    let mut archive_id_cursor = archive_id_offset;
    for (_, block) in ordered {
        let read_count = block.header.uncompressed_count as u64;
        writer.write_block(&block.header, &block.payload, archive_id_cursor)?;
        archive_id_cursor += read_count;
    }
    Ok(archive_id_cursor - archive_id_offset)
}

fn split_into_blocks(records: Vec<ReadRecord>, reads_per_block: u32, next_block_id: &mut u32) -> Vec<(u32, Vec<ReadRecord>)> {
    records
        .chunks(reads_per_block as usize)
        .map(|batch| {
            let id = *next_block_id;
            *next_block_id += 1;
            (id, batch.to_vec())
        })
        .collect()
}

/// Pack the SCM quality model's archive-wide parameters into the global
/// header's codec-parameters blob (spec §4.1's "optional codec-parameters
/// blob"), since `num_bins`/`dna_context` affect the decoder's context
/// computation but have no other home in the fixed layout.
fn encode_codec_params(config: &CompressConfig) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5);
    buf.extend_from_slice(&config.scm_num_bins.to_le_bytes());
    buf.push(config.scm_dna_context as u8);
    buf
}

pub fn decode_codec_params(params: &[u8]) -> (u32, bool) {
    if params.len() < 5 {
        return (crate::codec::quality_scm::DEFAULT_NUM_BINS, false);
    }
    let num_bins = u32::from_le_bytes([params[0], params[1], params[2], params[3]]);
    let dna_context = params[4] != 0;
    (num_bins, dna_context)
}

/// Read `source` as FASTQ, compress it to a `.fqc` archive at `output_path`
/// (spec §4.8/§4.9/§9 end to end), honoring `config`. `cancel` is polled at
/// chunk and block granularity for cooperative cancellation (spec §5/§9).
///
/// Regime classification samples the literal first `REGIME_SAMPLE_SIZE`
/// records (spec §4.8's streaming case: "the first 1000"), since `R` is not
/// assumed seekable. Callers with a seekable source should prefer
/// [`compress_to_archive_seekable`], which draws its sample evenly across
/// the whole file when `config.streaming` is false, per spec §4.8's other
/// case: "drawn evenly across the file".
pub fn compress_to_archive<R: Read>(
    config: &CompressConfig,
    source: R,
    output_path: &Path,
    original_filename: &str,
    timestamp: u64,
    cancel: &AtomicBool,
) -> FqcResult<()> {
    config.validate()?;
    let mut parser = FastqParser::new(source);
    let first_sample = parser.read_chunk(REGIME_SAMPLE_SIZE)?.unwrap_or_default();
    compress_to_archive_from_sample(config, parser, first_sample, output_path, original_filename, timestamp, cancel)
}

/// Same as [`compress_to_archive`], but for a seekable source: when
/// `config.streaming` is false, the regime-classification sample is drawn
/// evenly across the whole file (spec §4.8) instead of biased toward its
/// head, by counting records with one rewindable forward pass and then
/// taking the first record of every `stride`-sized batch.
pub fn compress_to_archive_seekable<R: Read + Seek>(
    config: &CompressConfig,
    mut source: R,
    output_path: &Path,
    original_filename: &str,
    timestamp: u64,
    cancel: &AtomicBool,
) -> FqcResult<()> {
    config.validate()?;
    let first_sample = if config.streaming {
        let mut parser = FastqParser::new(&mut source);
        parser.read_chunk(REGIME_SAMPLE_SIZE)?.unwrap_or_default()
    } else {
        sample_evenly_spaced(&mut source, REGIME_SAMPLE_SIZE)?
    };
    source.seek(SeekFrom::Start(0))?;
    let parser = FastqParser::new(source);
    compress_to_archive_from_sample(config, parser, first_sample, output_path, original_filename, timestamp, cancel)
}

/// Count `'\n'` bytes in `source` without parsing records, then rewind to
/// the start. Used to size the stride for [`sample_evenly_spaced`] without
/// holding more than one read buffer in memory.
fn count_lines_and_rewind<R: Read + Seek>(source: &mut R) -> FqcResult<u64> {
    let mut buf = [0u8; 64 * 1024];
    let mut count = 0u64;
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        count += buf[..n].iter().filter(|&&b| b == b'\n').count() as u64;
    }
    source.seek(SeekFrom::Start(0))?;
    Ok(count)
}

/// Sample up to `target` records spread evenly across `source` (spec
/// §4.8's non-streaming case), by estimating `total_reads` from a line
/// count and then keeping the first record of every `stride`-sized batch.
/// Leaves `source`'s cursor wherever the last batch left it; callers must
/// rewind before the real compression pass.
fn sample_evenly_spaced<R: Read + Seek>(source: &mut R, target: usize) -> FqcResult<Vec<ReadRecord>> {
    let total_lines = count_lines_and_rewind(source)?;
    let total_reads = total_lines / 4;
    let stride = (total_reads / target as u64).max(1) as usize;

    let mut parser = FastqParser::new(&mut *source);
    let mut sample = Vec::with_capacity(target);
    while sample.len() < target {
        match parser.read_chunk(stride)? {
            Some(mut batch) if !batch.is_empty() => sample.push(batch.remove(0)),
            _ => break,
        }
    }
    Ok(sample)
}

/// Shared tail of [`compress_to_archive`]/[`compress_to_archive_seekable`]:
/// everything past "the regime-classification sample has been drawn".
fn compress_to_archive_from_sample<R: Read>(
    config: &CompressConfig,
    mut parser: FastqParser<R>,
    first_sample: Vec<ReadRecord>,
    output_path: &Path,
    original_filename: &str,
    timestamp: u64,
    cancel: &AtomicBool,
) -> FqcResult<()> {
    let stats = sample_length_stats(&first_sample);
    let regime = classify_regime(stats, config.streaming);
    let reads_per_block = config.block_size.unwrap_or_else(|| default_reads_per_block(regime));
    let reorder_active = reordering_enabled(regime, config.reorder) && !config.streaming;
    info!("regime={regime:?} reads_per_block={reads_per_block} reorder={reorder_active}");

    let budget_bytes = config.memory_limit_mb.saturating_mul(1_000_000);
    let in_flight_cost = 50u64 * reads_per_block as u64 * config.effective_thread_count().max(1) as u64;
    let chunk_reads: u32 = if budget_bytes > in_flight_cost {
        (((budget_bytes - in_flight_cost) / 24).max(reads_per_block as u64)) as u32
    } else {
        warn!("memory-limit too small to honor divide-and-conquer sizing; falling back to one chunk per block batch");
        reads_per_block
    };

    let mut writer = Writer::create(output_path)?;
    let header = GlobalHeader::new(0, original_filename.to_string(), timestamp);
    let mut flags = global_flags_for(config, regime, false)?;
    writer.write_global_header(&header, flags, encode_codec_params(config))?;

    let mut next_block_id = 0u32;
    let mut archive_id_offset = 0u64;
    let mut combined_forward: Vec<u64> = Vec::new();
    let mut combined_reverse: Vec<u64> = Vec::new();
    let mut pending_first_chunk = Some(first_sample);

    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(FqcError::Cancelled);
        }
        let mut chunk_records = pending_first_chunk.take().unwrap_or_default();
        while (chunk_records.len() as u64) < chunk_reads as u64 {
            let remaining = (chunk_reads as usize).saturating_sub(chunk_records.len());
            match parser.read_chunk(remaining)? {
                Some(mut more) => chunk_records.append(&mut more),
                None => break,
            }
        }
        if chunk_records.is_empty() {
            break;
        }
        let chunk_len = chunk_records.len() as u64;
        debug!("chunk of {chunk_len} reads starting at archive id {archive_id_offset}");

        let blocks = if reorder_active {
            let sequences: Vec<Vec<u8>> = chunk_records.iter().map(|r| r.sequence.clone()).collect();
            let ordering = reorder_short_reads(&sequences, config.minimizer_window, config.minimizer_k, config.max_search_reorder, cancel)
                .ok_or(FqcError::Cancelled)?;
            let chunk_map = reorder_map_from_ordering(&ordering);
            let shifted = chunk_map.shifted(archive_id_offset);
            combined_forward.extend_from_slice(&shifted.forward);
            combined_reverse.extend_from_slice(&shifted.reverse);

            let reordered: Vec<ReadRecord> = ordering.iter().map(|&i| chunk_records[i as usize].clone()).collect();
            split_into_blocks(reordered, reads_per_block, &mut next_block_id)
        } else {
            split_into_blocks(chunk_records, reads_per_block, &mut next_block_id)
        };

        compress_blocks_parallel(config, blocks, regime, &mut writer, archive_id_offset, cancel)?;
        archive_id_offset += chunk_len;
    }

    if !combined_forward.is_empty() {
        let reorder_map = ReorderMap { forward: combined_forward, reverse: combined_reverse };
        reorder_map.validate()?;
        writer.write_reorder_map(&reorder_map)?;
        flags.set_reorder_map_present(true);
    }
    flags.validate()?;
    writer.patch_header(flags, archive_id_offset)?;
    writer.finalize()?;
    info!("wrote {archive_id_offset} reads across {next_block_id} blocks to {}", output_path.display());
    Ok(())
}

/// Unused directly by `compress_to_archive` (chunk sizing already bounds
/// in-flight work) but kept available for `analyser::block_boundaries`-driven
/// callers that want pre-computed boundaries instead of the chunked reader
/// loop above — e.g. tests that already hold every record in memory.
pub fn block_boundaries_for(total_reads: u64, reads_per_block: u32) -> Vec<(u32, u64, u64)> {
    block_boundaries(total_reads, reads_per_block, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_pool_reuses_released_capacity() {
        let pool = BufferPool::new();
        let buf = pool.acquire(128);
        assert!(buf.capacity() >= 128);
        let cap = buf.capacity();
        pool.release(buf);
        let reused = pool.acquire(64);
        assert_eq!(reused.capacity(), cap);
    }

    #[test]
    fn codec_params_roundtrip() {
        let mut config = CompressConfig::default();
        config.scm_num_bins = 20;
        config.scm_dna_context = true;
        let params = encode_codec_params(&config);
        let (num_bins, dna_context) = decode_codec_params(&params);
        assert_eq!(num_bins, 20);
        assert!(dna_context);
    }

    #[test]
    fn compresses_small_fastq_end_to_end() {
        let mut fastq = Vec::new();
        for i in 0..10 {
            fastq.extend_from_slice(format!("@r{i}\nACGTACGTAC\n+\nIIIIIIIIII\n").as_bytes());
        }
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.fqc");
        let cancel = AtomicBool::new(false);
        let config = CompressConfig::default();
        compress_to_archive(&config, &fastq[..], &out_path, "reads.fastq", 0, &cancel).unwrap();
        assert!(out_path.exists());
        assert!(std::fs::metadata(&out_path).unwrap().len() > 0);
    }

    #[test]
    fn compresses_small_fastq_via_seekable_entry_point() {
        let mut fastq = Vec::new();
        for i in 0..10 {
            fastq.extend_from_slice(format!("@r{i}\nACGTACGTAC\n+\nIIIIIIIIII\n").as_bytes());
        }
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("out.fqc");
        let cancel = AtomicBool::new(false);
        let config = CompressConfig::default();
        let cursor = std::io::Cursor::new(fastq);
        compress_to_archive_seekable(&config, cursor, &out_path, "reads.fastq", 0, &cancel).unwrap();
        assert!(out_path.exists());
        assert!(std::fs::metadata(&out_path).unwrap().len() > 0);
    }

    #[test]
    fn evenly_spaced_sample_is_not_biased_toward_the_head() {
        // First 4000 reads are short (length 10); the rest are long (length
        // 200). A head-only sample of 1000 records would see only the short
        // regime; an evenly-spaced sample must see both.
        let mut fastq = Vec::new();
        for i in 0..4_000 {
            fastq.extend_from_slice(format!("@r{i}\n{}\n+\n{}\n", "A".repeat(10), "I".repeat(10)).as_bytes());
        }
        for i in 4_000..8_000 {
            fastq.extend_from_slice(format!("@r{i}\n{}\n+\n{}\n", "A".repeat(200), "I".repeat(200)).as_bytes());
        }
        let mut cursor = std::io::Cursor::new(fastq);
        let sample = sample_evenly_spaced(&mut cursor, REGIME_SAMPLE_SIZE).unwrap();
        assert!(sample.iter().any(|r| r.read_length() == 10));
        assert!(sample.iter().any(|r| r.read_length() == 200));
    }
}
