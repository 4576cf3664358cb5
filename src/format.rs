//! Physical layout of the ASDF container.
//!
//! An ASDF file is a text header, one YAML document, and an optional
//! sequence of binary blocks:
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │ #ASDF <semver>\n                 │
//! │ #ASDF_STANDARD <semver>\n        │
//! ├──────────────────────────────────┤
//! │ YAML document                    │
//! ├──────────────────────────────────┤
//! │ ...\n            (border mark)   │
//! ├──────────────────────────────────┤
//! │ Block 0 │ Block 1 │ ...          │
//! └──────────────────────────────────┘
//! ```
//!
//! The border mark is the YAML end-of-document marker immediately followed
//! by the first block's magic; it is absent when the file carries no
//! blocks. Each block starts with a header, all integers big-endian:
//!
//! ```text
//! Offset | Size | Field
//! -------|------|---------------------------------------------
//! 0      | 4    | magic: 0xD3 'B' 'L' 'K'
//! 4      | 2    | header_size (bytes following this field)
//! 6      | 4    | flags (bit 0: streamed; unsupported)
//! 10     | 4    | compression code (4 ASCII bytes)
//! 14     | 8    | allocated_size
//! 22     | 8    | used_size
//! 30     | 8    | data_size (ignored)
//! 38     | 16   | MD5 of the uncompressed payload, or all zero
//! ```
//!
//! `header_size` counts everything after itself, so headers larger than
//! the 48 known bytes are tolerated: the surplus is read and discarded.
//! The payload is `used_size` bytes followed by `allocated_size -
//! used_size` bytes of padding.

use crate::error::{AsdfError, Result};

/// Magic bytes opening every binary block.
pub const BLOCK_MAGIC: [u8; 4] = [0xd3, b'B', b'L', b'K'];

/// The size of the block header fields counted by `header_size`.
pub const BLOCK_HEADER_SIZE: usize = 48;

/// Border marks separating the YAML tree from the block region. The CRLF
/// variant exists because some writers end the YAML document with `\r\n`.
pub(crate) const BORDER_MARKS: [&[u8]; 2] = [
    b"...\n\xd3BLK",
    b"...\r\n\xd3BLK",
];

/// Block flag bit 0: the block is streamed to the end of the file.
/// Recognized but unsupported.
pub const FLAG_STREAMED: u32 = 1;

/// Block compression type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// No compression.
    None,
    /// zlib: balanced speed, moderate ratio.
    Zlib,
    /// bzip2: slow, good ratio.
    Bzip2,
    /// lz4: very fast, modest ratio.
    Lz4,
}

impl Compression {
    /// Decodes the 4-ASCII-byte compression field of a block header.
    pub fn from_code(code: &[u8; 4]) -> Result<Self> {
        match code {
            b"\0\0\0\0" => Ok(Self::None),
            b"zlib" => Ok(Self::Zlib),
            b"bzp2" => Ok(Self::Bzip2),
            b"lz4\0" => Ok(Self::Lz4),
            other => Err(AsdfError::Format(format!(
                "unsupported block compression: {}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    /// Human-readable codec name, used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Zlib => "zlib",
            Self::Bzip2 => "bzip2",
            Self::Lz4 => "lz4",
        }
    }
}

/// Parsed block header (everything between the magic and the payload).
#[derive(Debug, Clone, Copy)]
pub struct BlockHeader {
    /// Block flags; only [`FLAG_STREAMED`] is defined by the standard.
    pub flags: u32,
    /// Payload compression.
    pub compression: Compression,
    /// Bytes reserved for the payload in the file.
    pub allocated_size: u64,
    /// Bytes of the payload actually written.
    pub used_size: u64,
    /// Declared MD5 of the uncompressed payload; all zero means
    /// "unverified".
    pub checksum: [u8; 16],
}

impl BlockHeader {
    /// Parses the header fields that follow the `header_size` field. The
    /// slice must contain at least the 48 known bytes; trailing bytes from
    /// future revisions are ignored.
    pub fn from_bytes(buffer: &[u8]) -> Result<Self> {
        let field = |range: std::ops::Range<usize>| {
            buffer
                .get(range)
                .ok_or_else(|| AsdfError::Format("block header is truncated".into()))
        };
        let flags = u32::from_be_bytes(
            field(0..4)?
                .try_into()
                .map_err(|_| AsdfError::Format("invalid flags field".into()))?,
        );
        let code: [u8; 4] = field(4..8)?
            .try_into()
            .map_err(|_| AsdfError::Format("invalid compression field".into()))?;
        let allocated_size = u64::from_be_bytes(
            field(8..16)?
                .try_into()
                .map_err(|_| AsdfError::Format("invalid allocated_size field".into()))?,
        );
        let used_size = u64::from_be_bytes(
            field(16..24)?
                .try_into()
                .map_err(|_| AsdfError::Format("invalid used_size field".into()))?,
        );
        // data_size at 24..32 is ignored.
        let checksum: [u8; 16] = field(32..48)?
            .try_into()
            .map_err(|_| AsdfError::Format("invalid checksum field".into()))?;
        if allocated_size < used_size {
            return Err(AsdfError::Format(format!(
                "block allocated_size {allocated_size} is smaller than used_size {used_size}"
            )));
        }
        Ok(Self {
            flags,
            compression: Compression::from_code(&code)?,
            allocated_size,
            used_size,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(code: &[u8; 4], allocated: u64, used: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(code);
        buf.extend_from_slice(&allocated.to_be_bytes());
        buf.extend_from_slice(&used.to_be_bytes());
        buf.extend_from_slice(&used.to_be_bytes()); // data_size, ignored
        buf.extend_from_slice(&[0u8; 16]);
        buf
    }

    #[test]
    fn parses_known_fields() {
        let header = BlockHeader::from_bytes(&header_bytes(b"zlib", 24, 12)).expect("parse");
        assert_eq!(header.compression, Compression::Zlib);
        assert_eq!(header.allocated_size, 24);
        assert_eq!(header.used_size, 12);
        assert_eq!(header.checksum, [0u8; 16]);
    }

    #[test]
    fn rejects_unknown_compression_code() {
        let err = BlockHeader::from_bytes(&header_bytes(b"zstd", 8, 8)).unwrap_err();
        assert!(matches!(err, AsdfError::Format(_)));
    }

    #[test]
    fn rejects_allocation_smaller_than_used() {
        let err = BlockHeader::from_bytes(&header_bytes(b"\0\0\0\0", 4, 8)).unwrap_err();
        assert!(matches!(err, AsdfError::Format(_)));
    }

    #[test]
    fn tolerates_trailing_header_bytes() {
        let mut bytes = header_bytes(b"\0\0\0\0", 8, 8);
        bytes.extend_from_slice(&[0xab; 6]);
        assert!(BlockHeader::from_bytes(&bytes).is_ok());
    }
}
