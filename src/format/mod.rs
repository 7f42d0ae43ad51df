//! Fixed binary layouts for the `.fqc` container (spec §4.1).
//!
//! Pure value types with `read`/`write` methods; no I/O beyond the
//! `Read`/`Write` traits themselves, mirroring the `sixcy::superblock` +
//! `sixcy::block` + `sixcy::index` split this crate's container layer is
//! grounded on. All integers are little-endian; every checksum in this
//! module is xxHash64 (see `crate::checksum`).

pub mod block_header;
pub mod block_index;
pub mod footer;
pub mod global_header;
pub mod magic;
pub mod reorder_map;

pub use block_header::{BlockHeader, CodecFamily, CodecTag, StreamRegion, BLOCK_HEADER_SIZE};
pub use block_index::{BlockIndex, BlockIndexEntry};
pub use footer::{FileFooter, FOOTER_SIZE};
pub use global_header::{
    GlobalFlags, GlobalHeader, IdMode, PeLayout, QualityMode, ReadLengthClass,
};
pub use magic::{MagicHeader, MAGIC_SIZE};
pub use reorder_map::ReorderMap;
