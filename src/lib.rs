//! # fqc — a columnar compressor for FASTQ sequencing reads
//!
//! Format guarantees (frozen in `.fqc` v1):
//! - All numeric fields are little-endian; checksums are xxHash64
//! - Every block is self-describing and independently decodable: its own
//!   header, codec tags, and checksum: no cross-block state
//! - The block index is at the end; archive IDs are globally continuous
//!   across blocks and the reader can seek straight to any archive-ID range
//! - A reorder map, when present, is an exact bijection recoverable with
//!   `--original-order`
//! - Unknown bytes appended to the tail of the global header, a block
//!   header, or the block index are skipped, not rejected (forward
//!   compatibility across minor versions)

pub mod analyser;
pub mod block_compressor;
pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod format;
pub mod perf;
pub mod pipeline;
pub mod reader;
pub mod record;
pub mod varint;
pub mod writer;

pub use checksum::{hash_bytes, RollingChecksum};
pub use codec::{Backend, BackendCodec};
pub use config::{CompressConfig, DecompressConfig, StreamSelector};
pub use error::{FqcError, FqcResult};
pub use format::{
    BlockHeader, BlockIndex, BlockIndexEntry, CodecFamily, CodecTag, FileFooter, GlobalFlags, GlobalHeader, IdMode,
    MagicHeader, PeLayout, QualityMode, ReadLengthClass, ReorderMap, StreamRegion,
};
pub use pipeline::{compress_to_archive, compress_to_archive_seekable};
pub use reader::ArchiveReader;
pub use record::{FastqParser, ReadRecord};
pub use writer::Writer;
