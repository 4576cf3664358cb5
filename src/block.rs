//! Binary block reading and decompression.
//!
//! Blocks are read strictly in file order by the resolution pipeline in
//! [`crate::file`]. Reading a block consumes its header, `used_size`
//! payload bytes and the `allocated_size - used_size` padding that
//! follows, so the reader is always positioned at the next block's magic.
//!
//! Decompression is a separate step: orphan blocks (not referenced by any
//! array) are consumed but never decompressed or verified.

use std::io::Read;

use flate2::read::ZlibDecoder;
use md5::{Digest, Md5};

use crate::error::{AsdfError, Result};
use crate::format::{BlockHeader, Compression, BLOCK_HEADER_SIZE, BLOCK_MAGIC};

/// One ASDF binary block.
#[derive(Debug, Clone)]
pub struct Block {
    /// Block flags; only the streamed bit is defined, and unsupported.
    pub flags: u32,
    /// Compression of `data`. Becomes [`Compression::None`] after
    /// [`Block::uncompress`].
    pub compression: Compression,
    /// The payload. Compressed until [`Block::uncompress`] runs.
    pub data: Vec<u8>,
    /// Declared MD5 of the uncompressed payload; all zero = unverified.
    checksum: [u8; 16],
}

impl Block {
    /// Reads the next block from `reader`, which must be positioned at a
    /// block magic. The payload may still be compressed afterwards; call
    /// [`Block::uncompress`] to obtain the original bytes.
    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| AsdfError::io("failed to read the block magic", e))?;
        if magic != BLOCK_MAGIC {
            return Err(AsdfError::Format(format!(
                "block magic does not match: {magic:02x?}"
            )));
        }
        let mut size = [0u8; 2];
        reader
            .read_exact(&mut size)
            .map_err(|e| AsdfError::io("failed to read the block header size", e))?;
        let header_size = u16::from_be_bytes(size) as usize;
        if header_size < BLOCK_HEADER_SIZE {
            return Err(AsdfError::Format(format!(
                "block header size {header_size} is smaller than the required {BLOCK_HEADER_SIZE}"
            )));
        }
        let mut header_bytes = vec![0u8; header_size];
        reader
            .read_exact(&mut header_bytes)
            .map_err(|e| AsdfError::io("failed to read the block header", e))?;
        let header = BlockHeader::from_bytes(&header_bytes)?;

        let used = usize::try_from(header.used_size)
            .map_err(|_| AsdfError::Format("block used_size exceeds the address space".into()))?;
        let mut data = vec![0u8; used];
        reader
            .read_exact(&mut data)
            .map_err(|e| AsdfError::io("failed to read the block payload", e))?;
        // Consume the padding so the reader lands on the next block.
        let padding = header.allocated_size - header.used_size;
        std::io::copy(&mut reader.take(padding), &mut std::io::sink())
            .map_err(|e| AsdfError::io("failed to read the block padding", e))
            .and_then(|skipped| {
                if skipped == padding {
                    Ok(())
                } else {
                    Err(AsdfError::Format(
                        "block is truncated inside its padding".into(),
                    ))
                }
            })?;

        Ok(Self {
            flags: header.flags,
            compression: header.compression,
            data,
            checksum: header.checksum,
        })
    }

    /// Switches the block's compression to "none", decompressing `data` as
    /// needed, and verifies the MD5 checksum when one is declared.
    pub fn uncompress(&mut self) -> Result<()> {
        let data = match self.compression {
            Compression::None => std::mem::take(&mut self.data),
            Compression::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(self.data.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| self.codec_error(&e))?;
                out
            }
            Compression::Bzip2 => {
                let mut out = Vec::new();
                bzip2::read::BzDecoder::new(self.data.as_slice())
                    .read_to_end(&mut out)
                    .map_err(|e| self.codec_error(&e))?;
                out
            }
            Compression::Lz4 => uncompress_lz4(&self.data)?,
        };
        self.data = data;
        self.compression = Compression::None;
        if self.checksum != [0u8; 16] {
            let actual = Md5::digest(&self.data);
            if actual[..] != self.checksum {
                return Err(AsdfError::Integrity(format!(
                    "block checksum mismatch: actual {:02x?} vs declared {:02x?}",
                    &actual[..],
                    self.checksum
                )));
            }
        }
        Ok(())
    }

    fn codec_error(&self, err: &dyn std::fmt::Display) -> AsdfError {
        AsdfError::Integrity(format!(
            "failed to decompress {} bytes with {}: {err}",
            self.data.len(),
            self.compression.name()
        ))
    }
}

/// Decompresses an lz4-coded payload: a sequence of LZ4 blocks, each
/// framed as a big-endian `block_size` (counting the uncompressed-size
/// field that follows), a little-endian `uncompressed_size`, and
/// `block_size - 4` bytes of compressed data.
fn uncompress_lz4(payload: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut rest = payload;
    while !rest.is_empty() {
        let (head, tail) = split_u32(rest, "lz4 block size")?;
        let block_size = u32::from_be_bytes(head) as usize;
        if block_size < 4 {
            return Err(AsdfError::Integrity(format!(
                "invalid lz4 block size: {block_size}"
            )));
        }
        let (head, tail) = split_u32(tail, "lz4 uncompressed size")?;
        let uncompressed_size = u32::from_le_bytes(head) as usize;
        let compressed = tail.get(..block_size - 4).ok_or_else(|| {
            AsdfError::Integrity("lz4 block is larger than the remaining payload".into())
        })?;
        rest = &tail[block_size - 4..];
        let chunk = lz4_flex::block::decompress(compressed, uncompressed_size)
            .map_err(|e| AsdfError::Integrity(format!("lz4 error: {e}")))?;
        if chunk.len() != uncompressed_size {
            return Err(AsdfError::Integrity(format!(
                "uncompressed LZ4 size mismatch: {} != {uncompressed_size}",
                chunk.len()
            )));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

fn split_u32<'a>(data: &'a [u8], what: &str) -> Result<([u8; 4], &'a [u8])> {
    let head = data
        .get(..4)
        .and_then(|s| <[u8; 4]>::try_from(s).ok())
        .ok_or_else(|| AsdfError::Integrity(format!("truncated {what} field")))?;
    Ok((head, &data[4..]))
}
