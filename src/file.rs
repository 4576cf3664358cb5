//! The read pipeline: open an ASDF container and resolve its blocks.
//!
//! Opening proceeds in four steps:
//!
//! 1. Parse the two `#ASDF` / `#ASDF_STANDARD` header comment lines.
//! 2. Locate the border between the YAML tree and the block region (the
//!    `...` end-of-document mark followed by the first block magic).
//! 3. Parse the YAML region and unmarshal its root through the schema
//!    registry, producing a [`Document`] whose array descriptors still
//!    hold pending block references.
//! 4. Stream the blocks in file order, decompressing and verifying each
//!    referenced one and rewriting every array that draws from it.
//!
//! The whole pipeline is synchronous and single-threaded; the only side
//! channel is an optional progress callback.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

#[cfg(feature = "mmap")]
use memmap2::Mmap;
use semver::Version;

use crate::block::Block;
use crate::error::{AsdfError, Result};
use crate::format::{BLOCK_MAGIC, BORDER_MARKS};
use crate::node;
use crate::scan::grep;
use crate::schema::core::{Document, NdArray};
use crate::schema::{find_definition, Tag};

/// Tracks loading progress as `(done, total)` pairs. `done` is monotone
/// within one open; `total` is revised upward as more work is discovered.
pub type ProgressCallback<'a> = &'a mut dyn FnMut(usize, usize);

/// An open ASDF file.
#[derive(Debug, Clone)]
pub struct AsdfFile {
    /// The version from the `#ASDF` header comment.
    pub format_version: Version,
    /// The version from the `#ASDF_STANDARD` header comment.
    pub standard_version: Version,
    /// The document tree with all block references resolved.
    pub document: Document,
}

/// Reads an ASDF file from the file system.
///
/// With the default `mmap` feature the file is memory-mapped; otherwise it
/// is read into RAM. Both paths hand a seekable view to [`open_reader`].
pub fn open<P: AsRef<Path>>(path: P, progress: Option<ProgressCallback<'_>>) -> Result<AsdfFile> {
    let path = path.as_ref();

    #[cfg(feature = "mmap")]
    {
        let file = std::fs::File::open(path)
            .map_err(|e| AsdfError::io(format!("failed to open {}", path.display()), e))?;
        // The map is read-only and private to this call; the file is
        // assumed immutable while it is open.
        #[allow(unsafe_code)]
        let map = unsafe { Mmap::map(&file) }
            .map_err(|e| AsdfError::io(format!("failed to map {}", path.display()), e))?;
        open_reader(std::io::Cursor::new(&map[..]), progress)
    }

    #[cfg(not(feature = "mmap"))]
    {
        let data = std::fs::read(path)
            .map_err(|e| AsdfError::io(format!("failed to open {}", path.display()), e))?;
        open_reader(std::io::Cursor::new(data.as_slice()), progress)
    }
}

/// Reads an ASDF file from any seekable byte stream.
pub fn open_reader<R: Read + Seek>(
    mut reader: R,
    progress: Option<ProgressCallback<'_>>,
) -> Result<AsdfFile> {
    let mut ignore = |_done: usize, _total: usize| {};
    let progress: ProgressCallback<'_> = match progress {
        Some(callback) => callback,
        None => &mut ignore,
    };
    progress(0, 2);

    let (format_version, standard_version) = parse_header(&mut reader)?;
    let (root, block_offset) = parse_tree(&mut reader)?;
    progress(1, 2);

    let tag_text = root
        .tag
        .as_deref()
        .ok_or_else(|| AsdfError::Format("the root document carries no tag".into()))?;
    let tag = Tag::parse(tag_text)
        .map_err(|e| e.with_context("invalid top level tag"))?;
    let definition = find_definition(&tag)
        .ok_or_else(|| AsdfError::Format(format!("unknown top level tag: {tag}")))?;
    let mut document = definition
        .unmarshal(&root)?
        .into_document()
        .ok_or_else(|| {
            AsdfError::Format(format!("top level tag {tag} did not produce a document"))
        })?;
    progress(2, 2);

    if let Some(offset) = block_offset {
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| AsdfError::io("seeking to the block region", e))?;
    }
    read_and_resolve_blocks(&mut document, &mut reader, progress)?;

    Ok(AsdfFile {
        format_version,
        standard_version,
        document,
    })
}

/// Parses the two header comment lines and rewinds the reader.
fn parse_header<R: Read + Seek>(reader: &mut R) -> Result<(Version, Version)> {
    let first = read_line(reader)?;
    let format_version = header_version(&first, "#ASDF ", "first")?;
    let second = read_line(reader)?;
    let standard_version = header_version(&second, "#ASDF_STANDARD ", "second")?;
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| AsdfError::io("rewinding after the file header", e))?;
    Ok((format_version, standard_version))
}

fn header_version(line: &str, prefix: &str, which: &str) -> Result<Version> {
    let rest = line.strip_prefix(prefix).ok_or_else(|| {
        AsdfError::Format(format!(
            "invalid ASDF file header, the {which} line must start with \"{}\": {line}",
            prefix.trim_end()
        ))
    })?;
    Version::parse(rest.trim_end()).map_err(|_| {
        AsdfError::Format(format!(
            "invalid ASDF file header, cannot parse semver from \"{rest}\""
        ))
    })
}

/// Reads one `\n`-terminated line byte by byte, so nothing past the header
/// is consumed. The trailing newline (and an optional `\r`) is stripped.
fn read_line<R: Read>(reader: &mut R) -> Result<String> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        let n = reader
            .read(&mut byte)
            .map_err(|e| AsdfError::io("failed to read the file header", e))?;
        if n == 0 {
            return Err(AsdfError::Format(
                "invalid ASDF file header: unexpected end of file".into(),
            ));
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > 512 {
            return Err(AsdfError::Format(
                "invalid ASDF file header: line too long".into(),
            ));
        }
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    String::from_utf8(line)
        .map_err(|_| AsdfError::Format("invalid ASDF file header: not UTF-8".into()))
}

/// Locates the YAML / block border. Returns the border offset and the
/// length of the matched mark, or `None` when the file has no blocks.
fn find_border<R: Read + Seek>(reader: &mut R) -> Result<Option<(u64, usize)>> {
    for mark in BORDER_MARKS {
        let position = grep(reader, mark)
            .map_err(|e| e.with_context("while searching for the first binary block"))?;
        reader
            .seek(SeekFrom::Start(0))
            .map_err(|e| AsdfError::io("while searching for the first binary block", e))?;
        if let Some(at) = position {
            return Ok(Some((at, mark.len())));
        }
    }
    Ok(None)
}

/// Parses the YAML region into its root node. Returns the node and the
/// offset of the block region (positioned exactly at the first block's
/// magic), or `None` when there are no blocks.
fn parse_tree<R: Read + Seek>(reader: &mut R) -> Result<(node::Node, Option<u64>)> {
    let border = find_border(reader)?;
    let mut text = Vec::new();
    let block_offset = match border {
        Some((at, mark_len)) => {
            // The YAML region ends after the `...` of the border mark.
            let yaml_len = usize::try_from(at + 3)
                .map_err(|_| AsdfError::Format("YAML region exceeds the address space".into()))?;
            text.resize(yaml_len, 0);
            reader
                .read_exact(&mut text)
                .map_err(|e| AsdfError::io("reading the YAML document", e))?;
            Some(at + mark_len as u64 - BLOCK_MAGIC.len() as u64)
        }
        None => {
            reader
                .read_to_end(&mut text)
                .map_err(|e| AsdfError::io("reading the YAML document", e))?;
            None
        }
    };
    let text = String::from_utf8(text)
        .map_err(|_| AsdfError::Format("the YAML document is not valid UTF-8".into()))?;
    let root = node::parse_document(&text)?;
    Ok((root, block_offset))
}

/// Streams blocks in file order and rewrites every pending array.
fn read_and_resolve_blocks<R: Read>(
    document: &mut Document,
    reader: &mut R,
    progress: ProgressCallback<'_>,
) -> Result<()> {
    let mut max_index: Option<u32> = None;
    document.iter_arrays(&mut |arr| {
        if let Some(index) = arr.pending_block() {
            max_index = Some(max_index.map_or(index, |max| max.max(index)));
        }
    });
    let Some(max_index) = max_index else {
        return Ok(());
    };

    let total = max_index as usize + 3;
    progress(2, total);
    for index in 0..=max_index {
        let mut block = Block::read(reader)
            .map_err(|e| e.with_context(&format!("reading block #{index}")))?;
        let mut referenced = false;
        document.iter_arrays(&mut |arr| {
            referenced |= arr.pending_block() == Some(index);
        });
        if referenced {
            block
                .uncompress()
                .map_err(|e| e.with_context(&format!("uncompressing block #{index}")))?;
            document.tree.try_for_each_array_mut(&mut |arr| {
                if arr.pending_block() != Some(index) {
                    return Ok(());
                }
                resolve_array(arr, &block.data)
                    .map_err(|e| e.with_context(&format!("resolving block #{index}")))
            })?;
        }
        progress(2 + index as usize + 1, total);
    }
    Ok(())
}

/// Replaces one array's pending descriptor with its materialized payload.
fn resolve_array(arr: &mut NdArray, payload: &[u8]) -> Result<()> {
    let descriptor = std::mem::take(&mut arr.data);
    arr.pending = false;
    let count_bytes = arr.count_bytes();

    // Source only: the array covers the whole block.
    if descriptor.len() == 4 {
        arr.data = if arr.shape.is_empty() {
            payload.to_vec()
        } else {
            payload
                .get(..count_bytes)
                .ok_or_else(|| {
                    AsdfError::Format(format!(
                        "block holds {} bytes but the array needs {count_bytes}",
                        payload.len()
                    ))
                })?
                .to_vec()
        };
        return Ok(());
    }

    let offset = descriptor
        .get(4..8)
        .and_then(|b| <[u8; 4]>::try_from(b).ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| AsdfError::Format("malformed pending array descriptor".into()))?
        as usize;
    let strides: Vec<usize> = descriptor[8..]
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
        .collect();

    // Offset but no strides: a contiguous slice of the block.
    if strides.is_empty() {
        arr.data = payload
            .get(offset..offset + count_bytes)
            .ok_or_else(|| {
                AsdfError::Format(format!(
                    "array slice [{offset}, {}) is outside the block payload",
                    offset + count_bytes
                ))
            })?
            .to_vec();
        return Ok(());
    }

    // Strided: gather row-major chunks into a fresh contiguous buffer.
    let ndim = arr.shape.len();
    if ndim == 0 {
        return Err(AsdfError::Schema(
            "strided array descriptor without a shape".into(),
        ));
    }
    let element_size = arr.datatype.element_size();
    let chunk = arr.shape[ndim - 1] * element_size;
    let mut data = vec![0u8; count_bytes];

    if ndim == 1 {
        // Degenerate case: a single chunk at the given offset.
        let source = payload.get(offset..offset + chunk).ok_or_else(|| {
            AsdfError::Format("strided array read is outside the block payload".into())
        })?;
        data.copy_from_slice(source);
        arr.data = data;
        return Ok(());
    }

    if strides.len() < ndim - 1 {
        return Err(AsdfError::Schema(format!(
            "array declares {ndim} dimensions but only {} strides",
            strides.len()
        )));
    }
    let outer = &arr.shape[..ndim - 1];
    let mut cursor = vec![0usize; outer.len()];
    let chunks: usize = outer.iter().product();
    for chunk_index in 0..chunks {
        let mut source_offset = offset;
        for (dim, &position) in cursor.iter().enumerate() {
            source_offset += position * strides[dim] * element_size;
        }
        let source = payload
            .get(source_offset..source_offset + chunk)
            .ok_or_else(|| {
                AsdfError::Format(format!(
                    "strided chunk [{source_offset}, {}) is outside the block payload",
                    source_offset + chunk
                ))
            })?;
        data[chunk_index * chunk..(chunk_index + 1) * chunk].copy_from_slice(source);
        // Advance the odometer over the outer dimensions.
        for dim in (0..cursor.len()).rev() {
            cursor[dim] += 1;
            if cursor[dim] < outer[dim] {
                break;
            }
            cursor[dim] = 0;
        }
    }
    arr.data = data;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::core::{ByteOrder, DataType};

    fn array(shape: &[usize], dtype: DataType, descriptor: Vec<u8>) -> NdArray {
        NdArray {
            datatype: dtype,
            shape: shape.to_vec(),
            byte_order: ByteOrder::host(),
            data: descriptor,
            pending: true,
        }
    }

    fn descriptor(index: u32, offset: u32, strides: &[u32]) -> Vec<u8> {
        let mut data = index.to_le_bytes().to_vec();
        data.extend_from_slice(&offset.to_le_bytes());
        for stride in strides {
            data.extend_from_slice(&stride.to_le_bytes());
        }
        data
    }

    #[test]
    fn whole_block_is_sliced_to_the_declared_shape() {
        let mut arr = array(&[3], DataType::U8, 0u32.to_le_bytes().to_vec());
        resolve_array(&mut arr, &[9, 8, 7, 6]).expect("resolve");
        assert_eq!(arr.data, [9, 8, 7]);
        assert!(!arr.pending);
    }

    #[test]
    fn short_block_is_rejected() {
        let mut arr = array(&[8], DataType::U8, 0u32.to_le_bytes().to_vec());
        assert!(resolve_array(&mut arr, &[1, 2, 3]).is_err());
    }

    #[test]
    fn offset_without_strides_takes_a_contiguous_slice() {
        let payload: Vec<u8> = (0..16).collect();
        let mut arr = array(&[4], DataType::U8, descriptor(0, 8, &[]));
        resolve_array(&mut arr, &payload).expect("resolve");
        assert_eq!(arr.data, [8, 9, 10, 11]);
    }

    #[test]
    fn strided_gather_walks_outer_dimensions() {
        // payload 00..0F; shape [2,2], strides [4,1], offset 8; rows
        // start at 8 and 12.
        let payload: Vec<u8> = (0..16).collect();
        let mut arr = array(&[2, 2], DataType::U8, descriptor(0, 8, &[4, 1]));
        resolve_array(&mut arr, &payload).expect("resolve");
        assert_eq!(arr.data, [8, 9, 12, 13]);
    }

    #[test]
    fn three_dimensional_gather_copies_each_row() {
        // shape [2,2,2] over a 3x3x2 source laid out with strides [6,2].
        let payload: Vec<u8> = (0..18).collect();
        let mut arr = array(&[2, 2, 2], DataType::U8, descriptor(0, 0, &[6, 2, 1]));
        resolve_array(&mut arr, &payload).expect("resolve");
        assert_eq!(arr.data, [0, 1, 2, 3, 6, 7, 8, 9]);
    }

    #[test]
    fn one_dimensional_strided_array_is_a_single_chunk() {
        let payload: Vec<u8> = (0..8).collect();
        let mut arr = array(&[4], DataType::U8, descriptor(0, 2, &[1]));
        resolve_array(&mut arr, &payload).expect("resolve");
        assert_eq!(arr.data, [2, 3, 4, 5]);
    }
}
