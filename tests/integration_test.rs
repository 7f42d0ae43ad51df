use fqc::config::{CompressConfig, DecompressConfig, StreamSelector};
use fqc::format::{IdMode, PeLayout, QualityMode, BLOCK_HEADER_SIZE};
use fqc::{compress_to_archive, ArchiveReader};
use std::sync::atomic::AtomicBool;

fn sample_fastq(n: usize) -> Vec<u8> {
    let mut data = Vec::new();
    for i in 0..n {
        data.extend_from_slice(format!("@read{i}\nACGTACGTACGTACGTACGT\n+\nIIIIIIIIIIIIIIIIIIII\n").as_bytes());
    }
    data
}

fn variable_length_fastq(lengths: &[usize]) -> Vec<u8> {
    let mut data = Vec::new();
    for (i, &len) in lengths.iter().enumerate() {
        let seq: String = "ACGT".chars().cycle().take(len).collect();
        let qual: String = "I".repeat(len);
        data.extend_from_slice(format!("@read{i}\n{seq}\n+\n{qual}\n").as_bytes());
    }
    data
}

fn compress(config: &CompressConfig, fastq: &[u8]) -> std::path::PathBuf {
    let dir = tempfile::tempdir().unwrap().into_path();
    let path = dir.join("out.fqc");
    let cancel = AtomicBool::new(false);
    compress_to_archive(config, fastq, &path, "reads.fastq", 1_700_000_000, &cancel).unwrap();
    path
}

#[test]
fn round_trip_lossless() {
    let fastq = sample_fastq(200);
    let mut config = CompressConfig::default();
    config.reorder = false;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();
    assert_eq!(out, fastq);
}

#[test]
fn lossless_under_reordering_original_order() {
    let fastq = sample_fastq(500);
    let mut config = CompressConfig::default();
    config.reorder = true;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    assert!(reader.global_header.flags.reorder_map_present());

    let mut out = Vec::new();
    let mut decompress_config = DecompressConfig::default();
    decompress_config.original_order = true;
    reader.decompress(&decompress_config, &mut out).unwrap();
    assert_eq!(out, fastq);
}

#[test]
fn reordered_output_is_a_permutation_of_the_input() {
    let fastq = sample_fastq(500);
    let mut config = CompressConfig::default();
    config.reorder = true;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();

    let mut original_ids: Vec<&str> = std::str::from_utf8(&fastq).unwrap().lines().filter(|l| l.starts_with('@')).collect();
    let mut archive_ids: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().filter(|l| l.starts_with('@')).collect();
    original_ids.sort_unstable();
    archive_ids.sort_unstable();
    assert_eq!(original_ids, archive_ids);
    assert_ne!(
        std::str::from_utf8(&fastq).unwrap().lines().filter(|l| l.starts_with('@')).collect::<Vec<_>>(),
        std::str::from_utf8(&out).unwrap().lines().filter(|l| l.starts_with('@')).collect::<Vec<_>>(),
    );
}

#[test]
fn quality_discard_replaces_every_base_with_placeholder() {
    let fastq = sample_fastq(30);
    let mut config = CompressConfig::default();
    config.reorder = false;
    config.quality_mode = QualityMode::Discard;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let expected: String = String::from_utf8(fastq)
        .unwrap()
        .lines()
        .enumerate()
        .map(|(i, line)| if i % 4 == 3 { "!".repeat(line.len()) } else { line.to_string() })
        .collect::<Vec<_>>()
        .join("\n")
        + "\n";
    assert_eq!(text, expected);
}

#[test]
fn id_discard_paired_end_interleaved_synthesizes_pair_ids() {
    let fastq = sample_fastq(10);
    let mut config = CompressConfig::default();
    config.reorder = false;
    config.id_mode = IdMode::Discard;
    config.paired = true;
    config.pe_layout = PeLayout::Interleaved;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();

    let ids: Vec<&str> = std::str::from_utf8(&out).unwrap().lines().filter(|l| l.starts_with('@')).collect();
    for (i, id) in ids.iter().enumerate() {
        let read_num = i + 1;
        let pair_id = (read_num + 1) / 2;
        let mate = ((read_num - 1) % 2) + 1;
        assert_eq!(*id, format!("@{pair_id}/{mate}"));
    }
}

#[test]
fn checksum_integrity_detects_single_byte_flip() {
    let fastq = sample_fastq(100);
    let config = CompressConfig::default();
    let path = compress(&config, &fastq);

    let mut bytes = std::fs::read(&path).unwrap();
    // Flip a byte that lands inside the first block's payload, well past the
    // fixed-size headers so it can't be a header-parsing failure instead.
    let flip_at = bytes.len() / 2;
    bytes[flip_at] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = ArchiveReader::open(&path).unwrap();
    let result = reader.verify();
    assert!(result.is_err(), "flipping a byte must be detected by verify()");
}

#[test]
fn index_consistency_across_blocks() {
    let fastq = sample_fastq(10_000);
    let mut config = CompressConfig::default();
    config.reorder = false;
    config.block_size = Some(1_000);
    let path = compress(&config, &fastq);

    let reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.global_header.total_read_count, 10_000);

    // block_index[i].offset == block_index[i-1].offset + sizeof(BlockHeader)
    // + block_index[i-1].compressed_size, i.e. compressed_size is payload-only
    // and every block immediately follows its predecessor on disk.
    let entries = &reader.block_index().entries;
    assert!(entries.len() > 1, "test needs multiple blocks to be meaningful");
    for w in entries.windows(2) {
        assert_eq!(w[1].offset, w[0].offset + BLOCK_HEADER_SIZE as u64 + w[0].compressed_size);
    }
}

#[test]
fn range_query_selects_exact_subset() {
    let fastq = sample_fastq(1_000);
    let mut config = CompressConfig::default();
    config.reorder = false;
    config.block_size = Some(100);
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut decompress_config = DecompressConfig::default();
    decompress_config.range = Some((150, 249));
    let mut out = Vec::new();
    reader.decompress(&decompress_config, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches('@').count(), 100);
    assert!(text.contains("@read150"));
    assert!(text.contains("@read249"));
    assert!(!text.contains("@read149\n"));
    assert!(!text.contains("@read250\n"));
}

#[test]
fn variable_length_reads_use_aux_stream() {
    let fastq = variable_length_fastq(&[100, 120, 80, 100, 140]);
    let mut config = CompressConfig::default();
    config.reorder = false;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();
    assert_eq!(out, fastq);
}

#[test]
fn empty_input_produces_valid_archive() {
    let path = compress(&CompressConfig::default(), &[]);
    let mut reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.global_header.total_read_count, 0);
    reader.verify().unwrap();
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();
    assert!(out.is_empty());
}

#[test]
fn single_read_round_trips_byte_exact() {
    let fastq = b"@r\nACGT\n+\nIIII\n".to_vec();
    let mut config = CompressConfig::default();
    config.reorder = false;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.global_header.total_read_count, 1);
    let mut out = Vec::new();
    reader.decompress(&DecompressConfig::default(), &mut out).unwrap();
    assert_eq!(out, fastq);
}

#[test]
fn truncated_archive_fails_verification() {
    let fastq = sample_fastq(50);
    let path = compress(&CompressConfig::default(), &fastq);

    let full_len = std::fs::metadata(&path).unwrap().len();
    let bytes = std::fs::read(&path).unwrap();

    // Removing the last 32 bytes destroys the footer sentinel entirely.
    std::fs::write(&path, &bytes[..(full_len - 32) as usize]).unwrap();
    assert!(ArchiveReader::open(&path).is_err());
}

#[test]
fn streams_selector_extracts_only_requested_field() {
    let fastq = sample_fastq(5);
    let mut config = CompressConfig::default();
    config.reorder = false;
    let path = compress(&config, &fastq);

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut decompress_config = DecompressConfig::default();
    decompress_config.streams = StreamSelector::Seq;
    let mut out = Vec::new();
    reader.decompress(&decompress_config, &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(!text.contains('@'));
    assert_eq!(text.lines().count(), 5);
    assert!(text.lines().all(|l| l.chars().all(|c| "ACGT".contains(c))));
}

#[test]
fn skip_corrupted_substitutes_placeholders_for_bad_block() {
    let fastq = sample_fastq(2_000);
    let mut config = CompressConfig::default();
    config.reorder = false;
    config.block_size = Some(500);
    let path = compress(&config, &fastq);

    let mut bytes = std::fs::read(&path).unwrap();
    // Corrupt a byte inside the second block's payload region, after the
    // fixed-size magic + global header.
    let corrupt_at = bytes.len() / 3;
    bytes[corrupt_at] ^= 0x01;
    std::fs::write(&path, &bytes).unwrap();

    let mut reader = ArchiveReader::open(&path).unwrap();
    let mut decompress_config = DecompressConfig::default();
    decompress_config.skip_corrupted = true;
    let mut out = Vec::new();
    // Should not error even though a block is corrupted.
    reader.decompress(&decompress_config, &mut out).unwrap();
    assert_eq!(String::from_utf8(out).unwrap().matches('@').count(), 2_000);
}
