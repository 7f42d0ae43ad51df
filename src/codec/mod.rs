//! The four per-stream codecs plus the shared general-purpose back end
//! (spec §4.2–§4.6). Each submodule takes one block's worth of data for a
//! single stream and returns an opaque payload plus the codec family it
//! used, to be written into that stream's `BlockHeader` region.

pub mod aux;
pub mod backend;
pub mod identifier;
pub mod quality_scm;
pub mod sequence_abc;
pub mod sequence_plain;

pub use backend::{Backend, BackendCodec};
