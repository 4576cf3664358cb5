//! The schema definition registry.
//!
//! Every recognized tag name maps to a version-sorted list of handlers.
//! Lookup is least-upper-bound: the definition with the smallest version
//! `>=` the requested one wins, because schemas evolve monotonically: a
//! consumer that understands `ndarray-1.2.0` should also handle a
//! `ndarray-1.1.0` file through the newer definition.
//!
//! The process-wide instance holds the builtin `core/` handlers and is
//! built once, on first use; after that it is read-only.

use std::collections::HashMap;
use std::sync::LazyLock;

use semver::Version;

use crate::error::Result;
use crate::node::Node;
use crate::schema::core::{
    Document, ExtensionMetadata, History, HistoryEntry, NdArray, Software,
};
use crate::schema::Tag;

/// A handler that turns a tagged YAML node into a typed schema object.
pub trait Definition: Send + Sync {
    /// The schema version this handler implements.
    fn version(&self) -> Version;

    /// Converts the node into the handler's object type.
    fn unmarshal(&self, node: &Node) -> Result<SchemaValue>;
}

/// The closed set of objects schema definitions can produce.
///
/// Reflection is deliberately avoided: callers match on the variant they
/// expect (or use the accessors) and treat anything else as a schema
/// violation.
#[derive(Debug, Clone)]
pub enum SchemaValue {
    /// A top-level document.
    Document(Box<Document>),
    /// A software description record.
    Software(Software),
    /// Extension metadata.
    ExtensionMetadata(ExtensionMetadata),
    /// A document history.
    History(History),
    /// One history entry.
    HistoryEntry(HistoryEntry),
    /// An n-dimensional array descriptor.
    Array(NdArray),
}

impl SchemaValue {
    /// Extracts a document, if that is what this value holds.
    pub fn into_document(self) -> Option<Document> {
        match self {
            Self::Document(doc) => Some(*doc),
            _ => None,
        }
    }

    /// Extracts a software record.
    pub fn into_software(self) -> Option<Software> {
        match self {
            Self::Software(s) => Some(s),
            _ => None,
        }
    }

    /// Extracts extension metadata.
    pub fn into_extension_metadata(self) -> Option<ExtensionMetadata> {
        match self {
            Self::ExtensionMetadata(em) => Some(em),
            _ => None,
        }
    }

    /// Extracts a history.
    pub fn into_history(self) -> Option<History> {
        match self {
            Self::History(h) => Some(h),
            _ => None,
        }
    }

    /// Extracts a history entry.
    pub fn into_history_entry(self) -> Option<HistoryEntry> {
        match self {
            Self::HistoryEntry(he) => Some(he),
            _ => None,
        }
    }
}

/// Maps tag names to version-sorted definition lists.
#[derive(Default)]
pub struct Registry {
    definitions: HashMap<String, Vec<Box<dyn Definition>>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding all builtin `core/` definitions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::schema::core::register_builtins(&mut registry);
        registry
    }

    /// Registers a definition under `name`, keeping the list sorted by
    /// version so registration order never matters.
    pub fn register(&mut self, name: &str, definition: Box<dyn Definition>) {
        let defs = self.definitions.entry(name.to_string()).or_default();
        let at = defs.partition_point(|d| d.version() < definition.version());
        defs.insert(at, definition);
    }

    /// Returns the definition with the smallest version `>= tag.version`,
    /// or `None` when the name is unknown or every registered version is
    /// older than the requested one.
    pub fn find(&self, tag: &Tag) -> Option<&dyn Definition> {
        let defs = self.definitions.get(&tag.name)?;
        let at = defs.partition_point(|d| d.version() < tag.version);
        defs.get(at).map(AsRef::as_ref)
    }
}

static BUILTINS: LazyLock<Registry> = LazyLock::new(Registry::with_builtins);

/// The process-wide registry of builtin definitions.
pub fn definitions() -> &'static Registry {
    &BUILTINS
}

/// Looks a tag up in the process-wide registry.
pub fn find_definition(tag: &Tag) -> Option<&'static dyn Definition> {
    definitions().find(tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AsdfError;

    struct Probe(Version);

    impl Definition for Probe {
        fn version(&self) -> Version {
            self.0.clone()
        }

        fn unmarshal(&self, _node: &Node) -> Result<SchemaValue> {
            Err(AsdfError::Schema("probe".into()))
        }
    }

    fn probe(major: u64, minor: u64, patch: u64) -> Box<dyn Definition> {
        Box::new(Probe(Version::new(major, minor, patch)))
    }

    fn lookup(registry: &Registry, v: Version) -> Option<Version> {
        registry
            .find(&Tag::new("x", v))
            .map(|d| d.version())
    }

    #[test]
    fn finds_smallest_version_at_least_requested() {
        let mut registry = Registry::new();
        registry.register("x", probe(1, 0, 0));
        registry.register("x", probe(1, 2, 0));
        registry.register("x", probe(2, 0, 0));

        assert_eq!(lookup(&registry, Version::new(1, 1, 0)), Some(Version::new(1, 2, 0)));
        assert_eq!(lookup(&registry, Version::new(1, 2, 0)), Some(Version::new(1, 2, 0)));
        assert_eq!(lookup(&registry, Version::new(0, 9, 0)), Some(Version::new(1, 0, 0)));
        assert_eq!(lookup(&registry, Version::new(2, 0, 1)), None);
        assert!(registry.find(&Tag::new("y", Version::new(1, 0, 0))).is_none());
    }

    #[test]
    fn registration_order_is_irrelevant() {
        let mut shuffled = Registry::new();
        shuffled.register("x", probe(2, 0, 0));
        shuffled.register("x", probe(1, 0, 0));
        shuffled.register("x", probe(1, 2, 0));

        let expected = [
            ((0, 5), (1, 0)),
            ((1, 0), (1, 0)),
            ((1, 1), (1, 2)),
            ((1, 2), (1, 2)),
            ((2, 0), (2, 0)),
        ];
        for ((major, minor), (want_major, want_minor)) in expected {
            assert_eq!(
                lookup(&shuffled, Version::new(major, minor, 0)),
                Some(Version::new(want_major, want_minor, 0)),
                "requested {major}.{minor}.0"
            );
        }
    }

    #[test]
    fn builtins_cover_the_core_tags() {
        let registry = definitions();
        for name in [
            "stsci.edu:asdf/core/asdf",
            "stsci.edu:asdf/core/software",
            "stsci.edu:asdf/core/extension_metadata",
            "stsci.edu:asdf/core/history/sequence",
            "stsci.edu:asdf/core/history/mapping",
            "stsci.edu:asdf/core/history_entry",
            "stsci.edu:asdf/core/ndarray",
        ] {
            assert!(
                registry.find(&Tag::new(name, Version::new(1, 0, 0))).is_some(),
                "missing builtin: {name}"
            );
        }
    }
}
