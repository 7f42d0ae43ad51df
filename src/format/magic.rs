//! Magic header — the first 9 bytes of every archive (spec §4.1).
//!
//! ```text
//! Offset  Size  Field
//!    0      8   magic bytes {0x89,'F','Q','C',0x0D,0x0A,0x1A,0x0A}
//!    8      1   version     (major<<4)|minor
//! ```

use crate::error::{FqcError, FqcResult};
use std::io::{Read, Write};

pub const MAGIC_BYTES: [u8; 8] = [0x89, b'F', b'Q', b'C', 0x0D, 0x0A, 0x1A, 0x0A];
pub const MAGIC_SIZE: usize = 9;

pub const CURRENT_MAJOR: u8 = 1;
pub const CURRENT_MINOR: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicHeader {
    pub major: u8,
    pub minor: u8,
}

impl Default for MagicHeader {
    fn default() -> Self {
        Self { major: CURRENT_MAJOR, minor: CURRENT_MINOR }
    }
}

impl MagicHeader {
    pub fn write<W: Write>(&self, mut w: W) -> FqcResult<()> {
        w.write_all(&MAGIC_BYTES)?;
        w.write_all(&[(self.major << 4) | (self.minor & 0x0f)])?;
        Ok(())
    }

    /// Read and validate the magic bytes. Fails with a format error if the
    /// major version exceeds what this build understands (spec §4.1).
    pub fn read<R: Read>(mut r: R) -> FqcResult<Self> {
        let mut buf = [0u8; MAGIC_SIZE];
        r.read_exact(&mut buf)?;
        if buf[..8] != MAGIC_BYTES {
            return Err(FqcError::format("magic bytes do not match a .fqc archive"));
        }
        let major = buf[8] >> 4;
        let minor = buf[8] & 0x0f;
        if major > CURRENT_MAJOR {
            return Err(FqcError::format(format!(
                "unsupported major version {major} (this build understands up to {CURRENT_MAJOR})"
            )));
        }
        Ok(Self { major, minor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut buf = Vec::new();
        MagicHeader::default().write(&mut buf).unwrap();
        assert_eq!(buf.len(), MAGIC_SIZE);
        let read = MagicHeader::read(&buf[..]).unwrap();
        assert_eq!(read, MagicHeader::default());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = vec![0u8; MAGIC_SIZE];
        assert!(MagicHeader::read(&buf[..]).is_err());
        buf[..8].copy_from_slice(&MAGIC_BYTES);
        buf[8] = 0xF0; // major = 15
        assert!(MagicHeader::read(&buf[..]).is_err());
    }
}
