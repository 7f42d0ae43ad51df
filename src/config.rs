//! Every CLI-exposed tunable plus the internal analyser/SCM constants that
//! aren't exposed, gathered into one source of truth (spec §6).
//!
//! `main.rs` builds a [`CompressConfig`] from parsed CLI args and hands it to
//! [`crate::pipeline::Pipeline`]; tests construct one directly with
//! `..Default::default()`.

use crate::codec::Backend;
use crate::format::{IdMode, PeLayout, QualityMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSelector {
    Id,
    Seq,
    Qual,
    All,
}

#[derive(Debug, Clone)]
pub struct CompressConfig {
    /// `--threads`; effective worker count is `min(threads, max_in_flight_blocks)`.
    pub threads: usize,
    /// `--memory-limit` in megabytes; drives the divide-and-conquer fallback.
    pub memory_limit_mb: u64,
    /// `--block-size`; overrides the regime-dependent default when set.
    pub block_size: Option<u32>,
    /// `--compression-level`, 1..9, forwarded to the back-end codec.
    pub compression_level: i32,
    pub quality_mode: QualityMode,
    pub id_mode: IdMode,
    /// `--reorder`/`--no-reorder`; only effective for the short regime.
    pub reorder: bool,
    /// `--streaming`; forces preserve-order and disables the reorder map.
    pub streaming: bool,
    pub paired: bool,
    pub pe_layout: PeLayout,
    /// `--placeholder-qual`, used when `quality_mode == Discard`.
    pub placeholder_qual: u8,
    /// `--id-prefix`, used when `id_mode == Discard`.
    pub id_prefix: String,
    pub backend: Backend,
    pub max_in_flight_blocks: usize,

    // ABC_V1 tuning (spec §4.2); not CLI-exposed.
    pub abc_max_shift: i16,
    pub abc_hamming_threshold: u32,

    // SCM tuning (spec §4.4); not CLI-exposed.
    pub scm_num_bins: u32,
    pub scm_dna_context: bool,

    // Global analyser tuning (spec §4.8); not CLI-exposed.
    pub minimizer_window: usize,
    pub minimizer_k: usize,
    pub max_search_reorder: usize,

    // Identifier tokeniser tuning (spec §4.5); not CLI-exposed.
    pub id_delimiters: Vec<u8>,
    pub id_pattern_sample: usize,
    pub id_min_pattern_match_ratio: f64,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            threads: num_cpus_fallback(),
            memory_limit_mb: 4096,
            block_size: None,
            compression_level: 3,
            quality_mode: QualityMode::Lossless,
            id_mode: IdMode::Exact,
            reorder: true,
            streaming: false,
            paired: false,
            pe_layout: PeLayout::Interleaved,
            placeholder_qual: b'!',
            id_prefix: String::new(),
            backend: Backend::Zstd,
            max_in_flight_blocks: 8,
            abc_max_shift: crate::codec::sequence_abc::DEFAULT_MAX_SHIFT,
            abc_hamming_threshold: crate::codec::sequence_abc::DEFAULT_HAMMING_THRESHOLD,
            scm_num_bins: crate::codec::quality_scm::DEFAULT_NUM_BINS,
            scm_dna_context: false,
            minimizer_window: 12,
            minimizer_k: 23,
            max_search_reorder: 1000,
            id_delimiters: crate::codec::identifier::DEFAULT_DELIMITERS.to_vec(),
            id_pattern_sample: crate::codec::identifier::DEFAULT_PATTERN_SAMPLE,
            id_min_pattern_match_ratio: crate::codec::identifier::DEFAULT_MIN_PATTERN_MATCH_RATIO,
        }
    }
}

impl CompressConfig {
    /// `--compression-level` / `--threads` bounds checking (spec §7's
    /// "invalid configuration" usage-error case).
    pub fn validate(&self) -> crate::error::FqcResult<()> {
        if !(1..=9).contains(&self.compression_level) {
            return Err(crate::error::FqcError::Usage(format!(
                "--compression-level must be in 1..9, got {}",
                self.compression_level
            )));
        }
        if self.threads == 0 {
            return Err(crate::error::FqcError::Usage("--threads must be > 0".into()));
        }
        if self.max_in_flight_blocks == 0 {
            return Err(crate::error::FqcError::Usage("max_in_flight_blocks must be > 0".into()));
        }
        Ok(())
    }

    pub fn effective_thread_count(&self) -> usize {
        self.threads.min(self.max_in_flight_blocks)
    }
}

fn num_cpus_fallback() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

/// `decompress`/`info`/`verify` side tunables (spec §6).
#[derive(Debug, Clone)]
pub struct DecompressConfig {
    /// `--range a:b`, already converted from the CLI's 1-based inclusive
    /// archive IDs to a 0-based inclusive pair.
    pub range: Option<(u64, u64)>,
    /// `--original-order`; reconstructs input order via the reorder map's
    /// reverse permutation, reading the whole archive regardless of `range`.
    pub original_order: bool,
    pub streams: StreamSelector,
    /// `--placeholder-qual`, used when the archive's quality mode is discard.
    pub placeholder_qual: u8,
    /// `--id-prefix`, used when the archive's id mode is discard.
    pub id_prefix: String,
    /// `decompress --skip-corrupted`: log and emit placeholders instead of
    /// failing on a block checksum mismatch.
    pub skip_corrupted: bool,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            range: None,
            original_order: false,
            streams: StreamSelector::All,
            placeholder_qual: b'!',
            id_prefix: String::new(),
            skip_corrupted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_compression_level() {
        let mut config = CompressConfig::default();
        config.compression_level = 0;
        assert!(config.validate().is_err());
        config.compression_level = 10;
        assert!(config.validate().is_err());
        config.compression_level = 9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_threads() {
        let mut config = CompressConfig::default();
        config.threads = 0;
        assert!(config.validate().is_err());
    }
}
