//! # asdf
//!
//! A reader for the Advanced Scientific Data Format (ASDF): a hybrid
//! container that stores a human-readable YAML tree next to an appended
//! sequence of opaque binary blocks. Scientific tooling uses ASDF to keep
//! tensor data and rich metadata in one file.
//!
//! ## File anatomy
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │ #ASDF 1.0.0                               │  two comment lines carrying
//! │ #ASDF_STANDARD 1.1.0                      │  format + standard versions
//! ├───────────────────────────────────────────┤
//! │ %YAML 1.1                                 │
//! │ --- !core/asdf-1.1.0                      │  one YAML document; tagged
//! │ data: !core/ndarray-1.0.0                 │  nodes dispatch to schema
//! │   source: 0                               │  definitions; arrays point
//! │   datatype: float64                       │  into blocks by index
//! │   shape: [128, 128]                       │
//! │ ...                                       │  end-of-document border
//! ├───────────────────────────────────────────┤
//! │ Block 0 │ Block 1 │ ...                   │  length-framed, optionally
//! └───────────────────────────────────────────┘  compressed, checksummed
//! ```
//!
//! Three subsystems compose:
//!
//! - **The container parser** finds the border between YAML and blocks in
//!   a single seekable stream, then reads block headers and payloads under
//!   four codecs (none, zlib, bzip2, lz4) with MD5 verification.
//! - **The schema layer** routes tagged YAML nodes through a registry of
//!   versioned definitions (lookup is least-upper-bound over registered
//!   versions) and lowers everything untagged into a JSON-shaped dynamic
//!   tree.
//! - **Array resolution** links every `ndarray` descriptor to its block
//!   and reassembles a contiguous row-major buffer, honoring offsets and
//!   per-dimension strides, with on-demand endianness normalization.
//!
//! ## Reading a file
//!
//! ```rust,ignore
//! let file = asdf::open("observation.asdf", None)?;
//! println!("standard {}", file.standard_version);
//!
//! let mut arrays = Vec::new();
//! file.document.iter_arrays(&mut |arr| arrays.push(arr.clone()));
//! for mut arr in arrays {
//!     arr.ensure_host_endianness();
//!     println!("{arr}: {} bytes", arr.data.len());
//! }
//! # Ok::<(), asdf::AsdfError>(())
//! ```
//!
//! Progress can be observed with a callback receiving `(done, total)`
//! pairs; `total` grows as the reader discovers how many blocks the tree
//! references.
//!
//! ## Scope
//!
//! This crate reads ASDF; it does not write it. External ("exploded")
//! block files are rejected, and streamed blocks of unknown length are
//! recognized but unsupported. Schema handling is tag dispatch, not
//! validation: unknown tags are kept as their raw YAML shape so the rest
//! of the tree stays usable.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

pub mod block;
pub mod error;
pub mod file;
pub mod format;
pub mod node;
pub mod scan;
pub mod schema;
pub mod value;

pub use block::Block;
pub use error::{AsdfError, Result};
pub use file::{open, open_reader, AsdfFile, ProgressCallback};
pub use format::Compression;
pub use schema::core::{
    ByteOrder, DataType, Document, ExtensionMetadata, History, HistoryEntry, NdArray, Software,
};
pub use schema::{SchemaValue, Tag};
pub use value::Value;
