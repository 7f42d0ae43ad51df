//! Archive reader (spec §4.9 reverse path, §6, §8): opens a `.fqc` archive,
//! verifies it, and decompresses it back to FASTQ text.
//!
//! Every block carries its own checksum and is independently decodable
//! (spec §3), so [`ArchiveReader::verify`] and [`ArchiveReader::decompress`]
//! both work one block at a time; only `--original-order` needs the whole
//! archive decoded before it can re-emit in input order.

use crate::checksum::RollingChecksum;
use crate::codec::{aux, identifier, quality_scm, sequence_abc, sequence_plain};
use crate::config::{DecompressConfig, StreamSelector};
use crate::error::{FqcError, FqcResult};
use crate::format::{
    BlockHeader, BlockIndex, BlockIndexEntry, CodecFamily, FileFooter, GlobalHeader, MagicHeader, PeLayout,
    ReadLengthClass, ReorderMap, FOOTER_SIZE,
};
use crate::pipeline::decode_codec_params;
use crate::record::ReadRecord;
use log::{debug, warn};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Streams decoded from one block, before discard-mode placeholders are
/// filled in. `None` means that stream's codec version tag was 0 (spec
/// §4.7's discard marker).
struct DecodedStreams {
    ids: Option<Vec<String>>,
    sequences: Vec<Vec<u8>>,
    qualities: Option<Vec<Vec<u8>>>,
    lengths: Vec<usize>,
}

pub struct ArchiveReader {
    file: File,
    pub global_header: GlobalHeader,
    footer: FileFooter,
    index: BlockIndex,
    reorder_map: Option<ReorderMap>,
    scm_num_bins: u32,
    scm_dna_context: bool,
}

impl ArchiveReader {
    pub fn open(path: &Path) -> FqcResult<Self> {
        let mut file = File::open(path)?;
        MagicHeader::read(&mut file)?;
        let global_header = GlobalHeader::read(&mut file)?;
        let (scm_num_bins, scm_dna_context) = decode_codec_params(&global_header.codec_params);

        let file_len = file.metadata()?.len();
        if file_len < FOOTER_SIZE as u64 {
            return Err(FqcError::format("archive shorter than a footer"));
        }
        file.seek(SeekFrom::Start(file_len - FOOTER_SIZE as u64))?;
        let footer = FileFooter::read(&mut file)?;

        file.seek(SeekFrom::Start(footer.index_offset))?;
        let index = BlockIndex::read(&mut file)?;
        index.validate_continuity()?;

        let reorder_map = if footer.has_reorder_map() {
            file.seek(SeekFrom::Start(footer.reorder_map_offset))?;
            Some(ReorderMap::read(&mut file)?)
        } else {
            None
        };

        Ok(Self { file, global_header, footer, index, reorder_map, scm_num_bins, scm_dna_context })
    }

    /// The parsed block index, exposed read-only for callers that want to
    /// check the on-disk offset/size invariants of spec §8 directly.
    pub fn block_index(&self) -> &BlockIndex {
        &self.index
    }

    fn regime(&self) -> ReadLengthClass {
        self.global_header.flags.read_length_class()
    }

    /// Recompute the archive-wide checksum over every byte before the
    /// footer and compare against the stored value (spec §8, "Checksum
    /// integrity").
    pub fn verify_global_checksum(&mut self) -> FqcResult<()> {
        let file_len = self.file.metadata()?.len();
        let footer_start = file_len - FOOTER_SIZE as u64;
        self.file.seek(SeekFrom::Start(0))?;
        let mut remaining = footer_start;
        let mut hasher = RollingChecksum::new();
        let mut buf = [0u8; 1 << 16];
        while remaining > 0 {
            let want = (buf.len() as u64).min(remaining) as usize;
            self.file.read_exact(&mut buf[..want])?;
            hasher.update(&buf[..want]);
            remaining -= want as u64;
        }
        if hasher.finish() != self.footer.global_checksum {
            return Err(FqcError::ChecksumMismatch { block_id: None });
        }
        Ok(())
    }

    fn read_block_raw(&mut self, entry: &BlockIndexEntry) -> FqcResult<(BlockHeader, Vec<u8>)> {
        self.file.seek(SeekFrom::Start(entry.offset))?;
        let header = BlockHeader::read(&mut self.file)?;
        let mut payload = vec![0u8; header.compressed_size as usize];
        self.file.read_exact(&mut payload)?;
        Ok((header, payload))
    }

    fn decode_streams(&self, header: &BlockHeader, payload: &[u8]) -> FqcResult<DecodedStreams> {
        let count = header.uncompressed_count as usize;
        let lengths = aux::decode(header.uniform_read_length, header.codec_aux.family, &payload[header.aux.offset as usize..], count)?;

        let seq_payload = &payload[header.seq.offset as usize..(header.seq.offset + header.seq.size) as usize];
        let sequences = match self.regime() {
            ReadLengthClass::Short => sequence_abc::decode(header.codec_seq.family, seq_payload, count)?,
            ReadLengthClass::Medium | ReadLengthClass::Long => sequence_plain::decode(header.codec_seq.family, seq_payload, count)?,
        };

        let qualities = if header.codec_qual.version == 0 {
            None
        } else {
            let qual_payload = &payload[header.qual.offset as usize..(header.qual.offset + header.qual.size) as usize];
            let order = match self.regime() {
                ReadLengthClass::Short => quality_scm::ContextOrder::Two,
                ReadLengthClass::Medium | ReadLengthClass::Long => quality_scm::ContextOrder::One,
            };
            let seq_ctx = if self.scm_dna_context { Some(sequences.as_slice()) } else { None };
            Some(quality_scm::decode(qual_payload, seq_ctx, order, self.scm_num_bins, self.scm_dna_context)?)
        };

        let ids = if header.codec_ids.version == 0 {
            None
        } else {
            let id_payload = &payload[header.ids.offset as usize..(header.ids.offset + header.ids.size) as usize];
            Some(identifier::decode(header.codec_ids.family, id_payload, count)?)
        };

        Ok(DecodedStreams { ids, sequences, qualities, lengths })
    }

    /// Byte layout mirrors `block_compressor::build_checksum_input` exactly,
    /// but starting from already-decoded (already-transformed) streams
    /// rather than re-deriving them from raw records.
    fn checksum_input(decoded: &DecodedStreams) -> Vec<u8> {
        let mut buf = Vec::new();
        if let Some(ids) = &decoded.ids {
            for id in ids {
                buf.extend_from_slice(id.as_bytes());
            }
        }
        for seq in &decoded.sequences {
            buf.extend_from_slice(seq);
        }
        if let Some(qualities) = &decoded.qualities {
            for q in qualities {
                buf.extend_from_slice(q);
            }
        }
        for &len in &decoded.lengths {
            buf.extend_from_slice(&(len as u32).to_le_bytes());
        }
        buf
    }

    fn verify_block(&mut self, entry: &BlockIndexEntry) -> FqcResult<()> {
        let (header, payload) = self.read_block_raw(entry)?;
        let decoded = self.decode_streams(&header, &payload)?;
        let actual = crate::checksum::hash_bytes(&Self::checksum_input(&decoded));
        if actual != header.block_xxhash64 {
            return Err(FqcError::checksum_at(header.block_id));
        }
        Ok(())
    }

    /// Verify every block's checksum (spec §8's `verify` subcommand), failing
    /// at the first mismatch.
    pub fn verify_blocks(&mut self) -> FqcResult<()> {
        let entries: Vec<BlockIndexEntry> = self.index.entries.clone();
        for entry in &entries {
            self.verify_block(entry)?;
            debug!("verified block at archive id {}", entry.archive_id_start);
        }
        Ok(())
    }

    /// Full `verify`: global checksum plus every block.
    pub fn verify(&mut self) -> FqcResult<()> {
        self.verify_global_checksum()?;
        self.verify_blocks()?;
        Ok(())
    }

    fn assemble_records(&self, header: &BlockHeader, decoded: DecodedStreams, archive_id_start: u64, config: &DecompressConfig) -> Vec<ReadRecord> {
        let pe_layout = if self.global_header.flags.paired_end() { Some(self.global_header.flags.pe_layout()) } else { None };
        let count = decoded.sequences.len();

        let ids = decoded.ids.unwrap_or_else(|| identifier::synthesize_discarded(pe_layout, archive_id_start, count, &config.id_prefix));
        // Placeholder quality is filled in the same shifted [0, 93] symbol
        // domain `write_record` expects, so it round-trips to
        // `config.placeholder_qual` once the `+ b'!'` shift is re-applied.
        let placeholder_symbol = config.placeholder_qual.saturating_sub(b'!');
        let qualities = decoded
            .qualities
            .unwrap_or_else(|| decoded.lengths.iter().map(|&len| vec![placeholder_symbol; len]).collect());

        ids.into_iter()
            .zip(decoded.sequences)
            .zip(qualities)
            .map(|((id, sequence), quality)| ReadRecord { id, sequence, quality })
            .take(header.uncompressed_count as usize)
            .collect()
    }

    fn placeholder_records(&self, header: &BlockHeader, archive_id_start: u64, config: &DecompressConfig) -> Vec<ReadRecord> {
        let count = header.uncompressed_count as usize;
        let len = if header.uniform_read_length > 0 { header.uniform_read_length as usize } else { 1 };
        let pe_layout = if self.global_header.flags.paired_end() { Some(self.global_header.flags.pe_layout()) } else { None };
        let ids = identifier::synthesize_discarded(pe_layout, archive_id_start, count, &config.id_prefix);
        let placeholder_symbol = config.placeholder_qual.saturating_sub(b'!');
        ids.into_iter()
            .map(|id| ReadRecord { id, sequence: vec![b'N'; len], quality: vec![placeholder_symbol; len] })
            .collect()
    }

    fn write_record(&self, record: &ReadRecord, streams: StreamSelector, out: &mut impl Write) -> FqcResult<()> {
        match streams {
            StreamSelector::All => {
                writeln!(out, "@{}", record.id)?;
                out.write_all(&record.sequence)?;
                writeln!(out)?;
                writeln!(out, "+")?;
                let quality: Vec<u8> = record.quality.iter().map(|&q| q + b'!').collect();
                out.write_all(&quality)?;
                writeln!(out)?;
            }
            StreamSelector::Id => writeln!(out, "{}", record.id)?,
            StreamSelector::Seq => {
                out.write_all(&record.sequence)?;
                writeln!(out)?;
            }
            StreamSelector::Qual => {
                let quality: Vec<u8> = record.quality.iter().map(|&q| q + b'!').collect();
                out.write_all(&quality)?;
                writeln!(out)?;
            }
        }
        Ok(())
    }

    /// Decompress per `config`, writing FASTQ (or a single selected stream)
    /// to `out`. `--original-order` decodes the whole archive and ignores
    /// `--range`; otherwise only blocks intersecting `--range` are touched.
    pub fn decompress(&mut self, config: &DecompressConfig, out: &mut impl Write) -> FqcResult<()> {
        let total = self.global_header.total_read_count;
        let entries: Vec<BlockIndexEntry> = if config.original_order {
            self.index.entries.clone()
        } else {
            let (a, b) = config.range.unwrap_or((0, total.saturating_sub(1)));
            self.index.blocks_in_range(a, b).into_iter().cloned().collect()
        };

        let mut archive_ordered: Vec<ReadRecord> = Vec::new();
        for entry in &entries {
            let records = match self.read_block_raw(entry).and_then(|(h, p)| self.decode_streams(&h, &p).map(|d| (h, d))) {
                Ok((header, decoded)) => {
                    let actual = crate::checksum::hash_bytes(&Self::checksum_input(&decoded));
                    if actual != header.block_xxhash64 {
                        if config.skip_corrupted {
                            warn!("block {} failed checksum verification, emitting placeholders", header.block_id);
                            self.placeholder_records(&header, entry.archive_id_start, config)
                        } else {
                            return Err(FqcError::checksum_at(header.block_id));
                        }
                    } else {
                        self.assemble_records(&header, decoded, entry.archive_id_start, config)
                    }
                }
                Err(e) if config.skip_corrupted => {
                    warn!("block at archive id {} failed to decode ({e}), emitting placeholders", entry.archive_id_start);
                    let stub = BlockHeader {
                        block_id: 0,
                        checksum_type: 0,
                        codec_ids: header_stub_tag(),
                        codec_seq: header_stub_tag(),
                        codec_qual: header_stub_tag(),
                        codec_aux: header_stub_tag(),
                        block_xxhash64: 0,
                        uncompressed_count: entry.read_count,
                        uniform_read_length: 0,
                        compressed_size: 0,
                        ids: Default::default(),
                        seq: Default::default(),
                        qual: Default::default(),
                        aux: Default::default(),
                    };
                    self.placeholder_records(&stub, entry.archive_id_start, config)
                }
                Err(e) => return Err(e),
            };
            archive_ordered.extend(records);
        }

        if config.original_order {
            let map = self
                .reorder_map
                .as_ref()
                .ok_or_else(|| FqcError::format("--original-order requested but archive carries no reorder map"))?;
            let mut original: Vec<Option<ReadRecord>> = vec![None; archive_ordered.len()];
            for (archive_pos, record) in archive_ordered.into_iter().enumerate() {
                let original_idx = map.reverse[archive_pos] as usize;
                original[original_idx] = Some(record);
            }
            for record in original.into_iter().flatten() {
                self.write_record(&record, config.streams, out)?;
            }
        } else {
            let (a, b) = config.range.unwrap_or((0, total.saturating_sub(1)));
            let mut archive_id = entries.first().map(|e| e.archive_id_start).unwrap_or(0);
            for record in archive_ordered {
                if archive_id >= a && archive_id <= b {
                    self.write_record(&record, config.streams, out)?;
                }
                archive_id += 1;
            }
        }
        Ok(())
    }
}

fn header_stub_tag() -> crate::format::CodecTag {
    crate::format::CodecTag::new(CodecFamily::Raw, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressConfig;
    use crate::pipeline::compress_to_archive;
    use std::sync::atomic::AtomicBool;

    fn build_archive(fastq: &[u8]) -> std::path::PathBuf {
        let dir = tempfile::tempdir().unwrap().into_path();
        let path = dir.join("out.fqc");
        let cancel = AtomicBool::new(false);
        compress_to_archive(&CompressConfig::default(), fastq, &path, "reads.fastq", 0, &cancel).unwrap();
        path
    }

    fn sample_fastq(n: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for i in 0..n {
            data.extend_from_slice(format!("@r{i}\nACGTACGTAC\n+\nIIIIIIIIII\n").as_bytes());
        }
        data
    }

    #[test]
    fn open_and_verify_roundtrip() {
        let path = build_archive(&sample_fastq(50));
        let mut reader = ArchiveReader::open(&path).unwrap();
        assert_eq!(reader.global_header.total_read_count, 50);
        reader.verify().unwrap();
    }

    #[test]
    fn decompress_recovers_all_records() {
        let path = build_archive(&sample_fastq(20));
        let mut reader = ArchiveReader::open(&path).unwrap();
        let config = DecompressConfig::default();
        let mut out = Vec::new();
        reader.decompress(&config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('@').count(), 20);
    }

    #[test]
    fn range_query_selects_subset() {
        let path = build_archive(&sample_fastq(20));
        let mut reader = ArchiveReader::open(&path).unwrap();
        let mut config = DecompressConfig::default();
        config.range = Some((0, 4));
        let mut out = Vec::new();
        reader.decompress(&config, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.matches('@').count(), 5);
    }
}
