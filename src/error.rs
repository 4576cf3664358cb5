//! Centralized error handling for the ASDF reader.
//!
//! All failure conditions are represented as `Result` values; the library
//! contains no panicking paths (enforced by `#![deny(clippy::panic)]` and
//! `#![deny(clippy::unwrap_used)]`). Errors are grouped by failure domain
//! and carry human-readable context describing where in the pipeline they
//! occurred (e.g. "reading block #3").
//!
//! ## Error Categories
//!
//! - **I/O** ([`AsdfError::Io`]): the underlying stream failed to read or
//!   seek.
//! - **Format** ([`AsdfError::Format`]): the container violates the ASDF
//!   file layout: bad header lines, missing root document, block magic
//!   mismatch, unsupported compression code.
//! - **Schema** ([`AsdfError::Schema`]): the YAML tree violates a schema
//!   definition: wrong node kind for a tag, unknown field, external block
//!   reference.
//! - **Integrity** ([`AsdfError::Integrity`]): payload corruption: MD5
//!   checksum mismatch, decompression failure, LZ4 size mismatch.
//!
//! The type is `Clone` so errors can be stored or reported from multiple
//! places; the wrapped `io::Error` lives behind an `Arc` for this reason.

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for ASDF operations.
pub type Result<T> = std::result::Result<T, AsdfError>;

/// The master error enum covering all failure domains of the reader.
#[derive(Debug, Clone)]
pub enum AsdfError {
    /// Low-level I/O failure while reading or seeking the input stream.
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to keep the error
    /// type `Clone`. The string carries pipeline context.
    Io(String, Arc<io::Error>),

    /// The byte stream is not a well-formed ASDF container.
    Format(String),

    /// A tagged YAML node does not satisfy its schema definition.
    Schema(String),

    /// A block payload failed checksum verification or decompression.
    Integrity(String),
}

impl AsdfError {
    /// Wraps an `io::Error` with a description of the failing operation.
    pub(crate) fn io(context: impl Into<String>, err: io::Error) -> Self {
        Self::Io(context.into(), Arc::new(err))
    }

    /// Prepends pipeline context to the error message, keeping the domain.
    pub(crate) fn with_context(self, context: &str) -> Self {
        match self {
            Self::Io(msg, e) if msg.is_empty() => Self::Io(context.to_string(), e),
            Self::Io(msg, e) => Self::Io(format!("{context}: {msg}"), e),
            Self::Format(msg) => Self::Format(format!("{context}: {msg}")),
            Self::Schema(msg) => Self::Schema(format!("{context}: {msg}")),
            Self::Integrity(msg) => Self::Integrity(format!("{context}: {msg}")),
        }
    }
}

impl fmt::Display for AsdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg, e) if msg.is_empty() => write!(f, "I/O error: {e}"),
            Self::Io(msg, e) => write!(f, "I/O error: {msg}: {e}"),
            Self::Format(msg) => write!(f, "format error: {msg}"),
            Self::Schema(msg) => write!(f, "schema error: {msg}"),
            Self::Integrity(msg) => write!(f, "integrity error: {msg}"),
        }
    }
}

impl std::error::Error for AsdfError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(_, e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for AsdfError {
    fn from(err: io::Error) -> Self {
        Self::Io(String::new(), Arc::new(err))
    }
}
