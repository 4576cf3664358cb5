//! Streaming byte search.
//!
//! [`grep`] finds the first occurrence of a byte sequence in a reader
//! without loading the stream into memory, the same way `grep -m1` would.
//! The file module uses it to locate the `...` / block-magic border that
//! separates the YAML tree from the binary block region.

use std::io::Read;

use crate::error::{AsdfError, Result};

/// Size of the sliding read window.
pub(crate) const BUFFER_SIZE: usize = 1 << 16;

/// Searches `reader` for the first occurrence of `needle` and returns its
/// absolute stream offset, or `None` when the stream ends without a match.
///
/// The reader is consumed up to (at least) the end of the match. Matches
/// that straddle an internal buffer boundary are found: the last
/// `needle.len() - 1` bytes of each window are carried over to the head of
/// the next one. Only a non-EOF I/O failure produces an error.
pub fn grep<R: Read>(reader: &mut R, needle: &[u8]) -> Result<Option<u64>> {
    if needle.is_empty() {
        return Ok(Some(0));
    }
    let tail = needle.len() - 1;
    let mut buffer = vec![0u8; BUFFER_SIZE + tail];
    // Bytes consumed from the stream before the current window.
    let mut total: u64 = 0;
    // Valid carry-over bytes sitting in buffer[tail - carried .. tail].
    let mut carried = 0usize;
    loop {
        let n = read_full(reader, &mut buffer[tail..])?;
        let window = &buffer[tail - carried..tail + n];
        if let Some(pos) = find(window, needle) {
            return Ok(Some(total - carried as u64 + pos as u64));
        }
        if n < BUFFER_SIZE {
            return Ok(None);
        }
        total += n as u64;
        buffer.copy_within(n..n + tail, 0);
        carried = tail.min(carried + n);
    }
}

/// Reads until `buf` is full or the stream ends; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .map_err(|e| AsdfError::io("reading the input stream", e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
