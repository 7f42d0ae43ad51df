//! Block compressor (spec §4.7): assembles one block's four stream payloads
//! and its header.
//!
//! Each compressor-pool worker owns one [`BlockCompressor`] exclusively
//! (spec §5, "mutation discipline") — it carries only configuration and a
//! reusable scratch buffer, no state that would make block order matter.

use crate::checksum::hash_bytes;
use crate::codec::{aux, identifier, quality_scm, sequence_abc, sequence_plain};
use crate::config::CompressConfig;
use crate::error::{FqcError, FqcResult};
use crate::format::{BlockHeader, CodecTag, GlobalFlags, IdMode, QualityMode, ReadLengthClass, StreamRegion};
use crate::record::ReadRecord;
use byteorder::{LittleEndian, WriteBytesExt};

/// Failure categories the block compressor distinguishes (spec §4.7): bad
/// input, back-end codec failure, or resource exhaustion. All three arrive
/// as typed [`FqcError`] variants; this enum only documents the mapping.
pub enum BlockFailure {
    InvalidInput,
    CodecFailure,
    OutOfMemory,
}

pub struct CompressedBlock {
    pub header: BlockHeader,
    pub payload: Vec<u8>,
}

pub struct BlockCompressor {
    config: CompressConfig,
}

impl BlockCompressor {
    pub fn new(config: CompressConfig) -> Self {
        Self { config }
    }

    pub fn compress(
        &mut self,
        records: &[ReadRecord],
        block_id: u32,
        regime: ReadLengthClass,
    ) -> FqcResult<CompressedBlock> {
        if records.is_empty() {
            return Err(FqcError::format_at("block compressor invoked with zero records", block_id));
        }
        for record in records {
            record.validate().map_err(|_| FqcError::format_at("invalid record reached block compressor", block_id))?;
        }

        let lengths: Vec<usize> = records.iter().map(|r| r.read_length()).collect();
        let aux_encoded = aux::encode(&lengths, self.config.backend, self.config.compression_level)?;

        let sequences: Vec<Vec<u8>> = records.iter().map(|r| r.sequence.clone()).collect();
        let (seq_family, seq_version, seq_payload) = match regime {
            ReadLengthClass::Short => {
                let encoded = sequence_abc::encode(
                    &sequences,
                    self.config.abc_max_shift,
                    self.config.abc_hamming_threshold,
                    self.config.backend,
                    self.config.compression_level,
                )?;
                (encoded.family, 1u8, encoded.payload)
            }
            ReadLengthClass::Medium | ReadLengthClass::Long => {
                let encoded = sequence_plain::encode(&sequences, self.config.backend, self.config.compression_level)?;
                (encoded.family, 1u8, encoded.payload)
            }
        };

        let (qual_family, qual_version, qual_payload) = match self.config.quality_mode {
            QualityMode::Discard => (crate::format::CodecFamily::Raw, 0u8, Vec::new()),
            mode => {
                let order = match regime {
                    ReadLengthClass::Short => quality_scm::ContextOrder::Two,
                    ReadLengthClass::Medium | ReadLengthClass::Long => quality_scm::ContextOrder::One,
                };
                let transformed: Vec<Vec<u8>> = records
                    .iter()
                    .map(|r| apply_quality_transform(&r.quality, mode))
                    .collect();
                let seq_ctx = if self.config.scm_dna_context { Some(sequences.as_slice()) } else { None };
                let encoded = quality_scm::encode(&transformed, seq_ctx, order, self.config.scm_num_bins, self.config.scm_dna_context)?;
                (order.family(), 1u8, encoded.payload)
            }
        };

        let (id_family, id_version, id_payload) = match self.config.id_mode {
            IdMode::Discard => (crate::format::CodecFamily::Raw, 0u8, Vec::new()),
            IdMode::Exact | IdMode::Tokenise => {
                let ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
                let id_config = identifier::IdentifierConfig {
                    delimiters: self.config.id_delimiters.clone(),
                    pattern_sample: self.config.id_pattern_sample,
                    min_pattern_match_ratio: if self.config.id_mode == IdMode::Exact {
                        f64::INFINITY // never accept tokenise when exact was requested
                    } else {
                        self.config.id_min_pattern_match_ratio
                    },
                };
                let encoded = identifier::encode(&ids, &id_config, self.config.backend, self.config.compression_level)?;
                (encoded.family, 1u8, encoded.payload)
            }
        };

        let uncompressed_checksum_input = build_checksum_input(records, self.config.quality_mode, self.config.id_mode, &lengths);
        let block_xxhash64 = hash_bytes(&uncompressed_checksum_input);

        let offset_ids = 0u64;
        let offset_seq = offset_ids + id_payload.len() as u64;
        let offset_qual = offset_seq + seq_payload.len() as u64;
        let offset_aux = offset_qual + qual_payload.len() as u64;
        let compressed_size = offset_aux + aux_encoded.payload.len() as u64;

        let mut payload = Vec::with_capacity(compressed_size as usize);
        payload.extend_from_slice(&id_payload);
        payload.extend_from_slice(&seq_payload);
        payload.extend_from_slice(&qual_payload);
        payload.extend_from_slice(&aux_encoded.payload);

        let header = BlockHeader {
            block_id,
            checksum_type: 0,
            codec_ids: CodecTag::new(id_family, id_version),
            codec_seq: CodecTag::new(seq_family, seq_version),
            codec_qual: CodecTag::new(qual_family, qual_version),
            codec_aux: CodecTag::new(aux_encoded.family, 1),
            block_xxhash64,
            uncompressed_count: records.len() as u32,
            uniform_read_length: aux_encoded.uniform_read_length,
            compressed_size,
            ids: StreamRegion { offset: offset_ids, size: id_payload.len() as u64 },
            seq: StreamRegion { offset: offset_seq, size: seq_payload.len() as u64 },
            qual: StreamRegion { offset: offset_qual, size: qual_payload.len() as u64 },
            aux: StreamRegion { offset: offset_aux, size: aux_encoded.payload.len() as u64 },
        };

        Ok(CompressedBlock { header, payload })
    }
}

fn apply_quality_transform(quality: &[u8], mode: QualityMode) -> Vec<u8> {
    match mode {
        QualityMode::Lossless | QualityMode::Qvz => quality.iter().map(|&b| b - b'!').collect(),
        QualityMode::Illumina8Bin => quality.iter().map(|&b| quality_scm::illumina8_bin(b - b'!')).collect(),
        QualityMode::Discard => Vec::new(),
    }
}

fn build_checksum_input(records: &[ReadRecord], quality_mode: QualityMode, id_mode: IdMode, lengths: &[usize]) -> Vec<u8> {
    let mut buf = Vec::new();
    if id_mode != IdMode::Discard {
        for r in records {
            buf.extend_from_slice(r.id.as_bytes());
        }
    }
    for r in records {
        buf.extend_from_slice(&r.sequence);
    }
    if quality_mode != QualityMode::Discard {
        for r in records {
            buf.extend_from_slice(&apply_quality_transform(&r.quality, quality_mode));
        }
    }
    for &len in lengths {
        buf.write_u32::<LittleEndian>(len as u32).expect("writing to Vec never fails");
    }
    buf
}

/// Flags a freshly-opened archive's global header needs, derived from the
/// config and chosen regime (spec §4.1's flag layout).
pub fn global_flags_for(config: &CompressConfig, regime: ReadLengthClass, reorder_map_present: bool) -> FqcResult<GlobalFlags> {
    let mut flags = GlobalFlags::default();
    flags.set_paired_end(config.paired);
    flags.set_preserve_order(config.streaming || !crate::analyser::reordering_enabled(regime, config.reorder));
    flags.set_quality_mode(config.quality_mode);
    flags.set_id_mode(config.id_mode);
    flags.set_reorder_map_present(reorder_map_present);
    flags.set_pe_layout(config.pe_layout);
    flags.set_read_length_class(regime);
    flags.set_streaming_mode(config.streaming);
    flags.validate()?;
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_records(n: usize, len: usize) -> Vec<ReadRecord> {
        (0..n)
            .map(|i| ReadRecord {
                id: format!("read{i}"),
                sequence: b"ACGT".iter().cycle().take(len).copied().collect(),
                quality: b"I".iter().cycle().take(len).copied().collect(),
            })
            .collect()
    }

    #[test]
    fn compresses_short_regime_block() {
        let mut compressor = BlockCompressor::new(CompressConfig::default());
        let records = sample_records(5, 40);
        let block = compressor.compress(&records, 0, ReadLengthClass::Short).unwrap();
        assert_eq!(block.header.uncompressed_count, 5);
        assert_eq!(block.header.uniform_read_length, 40);
        assert_eq!(block.payload.len(), block.header.compressed_size as usize);
    }

    #[test]
    fn compresses_medium_regime_block_with_varying_lengths() {
        let mut compressor = BlockCompressor::new(CompressConfig::default());
        let mut records = sample_records(4, 600);
        records[1].sequence.truncate(590);
        records[1].quality.truncate(590);
        let block = compressor.compress(&records, 1, ReadLengthClass::Medium).unwrap();
        assert_eq!(block.header.uniform_read_length, 0);
        assert!(block.header.aux.size > 0);
    }

    #[test]
    fn discard_modes_skip_quality_and_id_streams() {
        let mut config = CompressConfig::default();
        config.quality_mode = QualityMode::Discard;
        config.id_mode = IdMode::Discard;
        let mut compressor = BlockCompressor::new(config);
        let records = sample_records(3, 20);
        let block = compressor.compress(&records, 0, ReadLengthClass::Short).unwrap();
        assert_eq!(block.header.qual.size, 0);
        assert_eq!(block.header.ids.size, 0);
    }

    #[test]
    fn rejects_empty_batch() {
        let mut compressor = BlockCompressor::new(CompressConfig::default());
        assert!(compressor.compress(&[], 0, ReadLengthClass::Short).is_err());
    }
}
