//! Typed error taxonomy (spec §7) and its mapping to process exit codes (§6).
//!
//! Every fallible operation in the crate returns `FqcError` (via `FqcResult`).
//! The CLI is the only place that turns a variant into an `i32` exit code —
//! library callers match on the enum directly.

use thiserror::Error;

pub type FqcResult<T> = Result<T, FqcError>;

#[derive(Error, Debug)]
pub enum FqcError {
    /// Invalid configuration: bad compression level, thread count <= 0, etc.
    #[error("usage error: {0}")]
    Usage(String),

    /// Operating-system read/write/rename failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Magic mismatch, incompatible major version, truncated header,
    /// unknown checksum algorithm, reserved bits non-zero, etc.
    #[error("format error: {detail}{}", block_id.map(|b| format!(" (block {b})")).unwrap_or_default())]
    Format {
        detail: String,
        block_id: Option<u32>,
    },

    /// Per-block or global checksum verification failed.
    #[error("checksum mismatch{}", block_id.map(|b| format!(" (block {b})")).unwrap_or_default())]
    ChecksumMismatch { block_id: Option<u32> },

    /// Back-end codec rejected input or produced an unusable frame.
    #[error("compression failure: {0}")]
    Compression(String),

    /// Memory budget exceeded or the OS allocator failed.
    #[error("memory error: {0}")]
    Memory(String),

    /// Cooperative cancellation observed.
    #[error("operation cancelled")]
    Cancelled,

    /// The codec family byte named a family this build does not implement.
    #[error("unsupported codec family {0}")]
    UnsupportedCodec(u8),
}

impl FqcError {
    pub fn format(detail: impl Into<String>) -> Self {
        FqcError::Format { detail: detail.into(), block_id: None }
    }

    pub fn format_at(detail: impl Into<String>, block_id: u32) -> Self {
        FqcError::Format { detail: detail.into(), block_id: Some(block_id) }
    }

    pub fn checksum_at(block_id: u32) -> Self {
        FqcError::ChecksumMismatch { block_id: Some(block_id) }
    }

    /// Exit status table of spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            FqcError::Usage(_) => 1,
            FqcError::Io(_) => 2,
            FqcError::Format { .. } => 3,
            FqcError::ChecksumMismatch { .. } => 4,
            FqcError::UnsupportedCodec(_) => 5,
            FqcError::Compression(_) => 2,
            FqcError::Memory(_) => 2,
            FqcError::Cancelled => 1,
        }
    }
}
