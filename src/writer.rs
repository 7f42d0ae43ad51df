//! Archive writer (spec §4.9 stage 3, §4.1): serialises the magic header,
//! global header, blocks, reorder map, index and footer to a temp file,
//! fsyncs, then renames into place.
//!
//! The global header's `total_read_count` (and the `reorder_map_present` bit)
//! are not known until every chunk has been compressed, but the header's
//! fixed-width prefix must precede the blocks on disk. [`Writer`] resolves
//! this the way `sixcy::io_stream::SixCyWriter::finalize()` resolves its own
//! superblock: a provisional header is written first with those two fields
//! zeroed, and [`Writer::patch_header`] seeks back and overwrites just those
//! fixed-offset bytes once the true values are known — no different in kind
//! from rewriting a superblock in place.

use crate::checksum::RollingChecksum;
use crate::error::FqcResult;
use crate::format::{
    BlockHeader, BlockIndex, BlockIndexEntry, FileFooter, GlobalFlags, GlobalHeader, MagicHeader, ReorderMap,
    BLOCK_HEADER_SIZE, MAGIC_SIZE,
};
use crate::perf::WriteBuffer;
use crate::pipeline::BufferPool;
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Absolute byte offset of `GlobalHeader.flags` — fixed regardless of the
/// variable tail, since it sits in the header's fixed-width prefix.
const FLAGS_OFFSET: u64 = MAGIC_SIZE as u64 + 4;
/// Absolute byte offset of `GlobalHeader.total_read_count`.
const TOTAL_READ_COUNT_OFFSET: u64 = MAGIC_SIZE as u64 + 16;

const WRITE_BUFFER_CAPACITY: usize = 1 << 20;

pub struct Writer {
    buf: WriteBuffer<File>,
    temp_path: PathBuf,
    final_path: PathBuf,
    checksum: RollingChecksum,
    index: BlockIndex,
    reorder_map_offset: Option<u64>,
    pool: BufferPool,
    finalized: bool,
}

impl Writer {
    /// Open `{final_path}.tmp` for writing. The file is renamed over
    /// `final_path` atomically in [`Writer::finalize`]; if finalize is never
    /// reached, [`Drop`] removes the temp file.
    pub fn create(final_path: &Path) -> FqcResult<Self> {
        let temp_path = final_path.with_extension("fqc.tmp");
        let file = OpenOptions::new().write(true).create(true).truncate(true).open(&temp_path)?;
        Ok(Self {
            buf: WriteBuffer::new(file, WRITE_BUFFER_CAPACITY),
            temp_path,
            final_path: final_path.to_path_buf(),
            checksum: RollingChecksum::new(),
            index: BlockIndex::default(),
            reorder_map_offset: None,
            pool: BufferPool::new(),
            finalized: false,
        })
    }

    /// Write `bytes` and fold them into the running global checksum, which
    /// covers everything before the footer (spec §4.1).
    fn emit(&mut self, bytes: &[u8]) -> FqcResult<()> {
        self.buf.write_all(bytes)?;
        self.checksum.update(bytes);
        Ok(())
    }

    /// Write the magic bytes followed by a provisional global header:
    /// `header.total_read_count` is written as given (normally 0) and is
    /// overwritten later by [`Writer::patch_header`].
    pub fn write_global_header(&mut self, header: &GlobalHeader, flags: GlobalFlags, codec_params: Vec<u8>) -> FqcResult<()> {
        let mut header = header.clone();
        header.flags = flags;
        header.codec_params = codec_params;

        let mut scratch = self.pool.acquire(MAGIC_SIZE + 64);
        MagicHeader::default().write(&mut scratch)?;
        header.write(&mut scratch)?;
        self.emit(&scratch)?;
        self.pool.release(scratch);
        Ok(())
    }

    /// Serialise one block (header + payload) and record its index entry.
    /// `archive_id_start` is the block's first read's position in the final
    /// archive-order numbering (post-reorder, post-chunk-offset).
    pub fn write_block(&mut self, header: &BlockHeader, payload: &[u8], archive_id_start: u64) -> FqcResult<()> {
        let block_offset = self.buf.bytes_written;

        let mut scratch = self.pool.acquire(BLOCK_HEADER_SIZE + payload.len());
        header.write(&mut scratch)?;
        scratch.extend_from_slice(payload);
        self.emit(&scratch)?;
        self.pool.release(scratch);

        self.index.entries.push(BlockIndexEntry {
            offset: block_offset,
            compressed_size: payload.len() as u64,
            archive_id_start,
            read_count: header.uncompressed_count,
        });
        Ok(())
    }

    pub fn write_reorder_map(&mut self, map: &ReorderMap) -> FqcResult<()> {
        self.reorder_map_offset = Some(self.buf.bytes_written);
        let mut scratch = self.pool.acquire(map.on_disk_size());
        map.write(&mut scratch)?;
        self.emit(&scratch)?;
        self.pool.release(scratch);
        Ok(())
    }

    /// Overwrite the global header's `flags` and `total_read_count` fields
    /// in place, then restore the write cursor to the end of the stream so
    /// the index/footer continue to append correctly.
    pub fn patch_header(&mut self, flags: GlobalFlags, total_read_count: u64) -> FqcResult<()> {
        flags.validate()?;
        self.buf.flush()?;
        let end_offset = self.buf.bytes_written;
        let file = self.buf.get_mut();

        file.seek(SeekFrom::Start(FLAGS_OFFSET))?;
        file.write_u64::<LittleEndian>(flags.0)?;
        file.seek(SeekFrom::Start(TOTAL_READ_COUNT_OFFSET))?;
        file.write_u64::<LittleEndian>(total_read_count)?;
        file.seek(SeekFrom::Start(end_offset))?;
        Ok(())
    }

    /// Write the block index and footer, flush, and atomically rename the
    /// temp file into place.
    pub fn finalize(mut self) -> FqcResult<()> {
        let index_offset = self.buf.bytes_written;
        let mut scratch = Vec::new();
        self.index.write(&mut scratch)?;
        self.emit(&scratch)?;

        let footer = FileFooter {
            index_offset,
            reorder_map_offset: self.reorder_map_offset.unwrap_or(0),
            global_checksum: std::mem::replace(&mut self.checksum, RollingChecksum::new()).finish(),
        };
        let mut footer_bytes = Vec::new();
        footer.write(&mut footer_bytes)?;
        self.buf.write_all(&footer_bytes)?;
        self.buf.flush()?;

        self.finalized = true;
        fs::rename(&self.temp_path, &self.final_path)?;
        Ok(())
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.finalized {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{CodecFamily, CodecTag, StreamRegion};

    fn sample_block_header(block_id: u32, count: u32) -> BlockHeader {
        BlockHeader {
            block_id,
            checksum_type: 0,
            codec_ids: CodecTag::new(CodecFamily::Raw, 0),
            codec_seq: CodecTag::new(CodecFamily::Raw, 0),
            codec_qual: CodecTag::new(CodecFamily::Raw, 0),
            codec_aux: CodecTag::new(CodecFamily::DeltaVarint, 1),
            block_xxhash64: 0,
            uncompressed_count: count,
            uniform_read_length: 0,
            compressed_size: 4,
            ids: StreamRegion::default(),
            seq: StreamRegion::default(),
            qual: StreamRegion::default(),
            aux: StreamRegion { offset: 0, size: 4 },
        }
    }

    #[test]
    fn writes_patches_and_renames() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("out.fqc");
        let mut writer = Writer::create(&final_path).unwrap();

        let header = GlobalHeader::new(0, "reads.fastq".into(), 42);
        writer.write_global_header(&header, GlobalFlags::new(), Vec::new()).unwrap();
        writer.write_block(&sample_block_header(0, 3), &[1, 2, 3, 4], 0).unwrap();

        let mut flags = GlobalFlags::new();
        flags.set_reorder_map_present(false);
        writer.patch_header(flags, 3).unwrap();
        writer.finalize().unwrap();

        assert!(final_path.exists());
        let mut file = File::open(&final_path).unwrap();
        let magic = MagicHeader::read(&mut file).unwrap();
        assert_eq!(magic, MagicHeader::default());
        let read_header = GlobalHeader::read(&mut file).unwrap();
        assert_eq!(read_header.total_read_count, 3);
    }

    #[test]
    fn drop_without_finalize_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("out.fqc");
        let temp_path = final_path.with_extension("fqc.tmp");
        {
            let _writer = Writer::create(&final_path).unwrap();
            assert!(temp_path.exists());
        }
        assert!(!temp_path.exists());
        assert!(!final_path.exists());
    }
}
