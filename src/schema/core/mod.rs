//! The builtin `core/` schema definitions of the ASDF standard.

mod document;
mod extension_metadata;
mod history;
mod history_entry;
mod ndarray;
mod software;

pub use document::Document;
pub use extension_metadata::ExtensionMetadata;
pub use history::History;
pub use history_entry::HistoryEntry;
pub use ndarray::{ByteOrder, DataType, NdArray};
pub use software::Software;

use crate::schema::Registry;

/// Registers every builtin definition. Called once while building the
/// process-wide registry, before any parse can run.
pub(crate) fn register_builtins(registry: &mut Registry) {
    registry.register(
        "stsci.edu:asdf/core/asdf",
        Box::new(document::DocumentDefinition),
    );
    registry.register(
        "stsci.edu:asdf/core/software",
        Box::new(software::SoftwareDefinition),
    );
    registry.register(
        "stsci.edu:asdf/core/extension_metadata",
        Box::new(extension_metadata::ExtensionMetadataDefinition),
    );
    registry.register(
        "stsci.edu:asdf/core/history/sequence",
        Box::new(history::HistorySequenceDefinition),
    );
    registry.register(
        "stsci.edu:asdf/core/history/mapping",
        Box::new(history::HistoryMappingDefinition),
    );
    registry.register(
        "stsci.edu:asdf/core/history_entry",
        Box::new(history_entry::HistoryEntryDefinition),
    );
    registry.register(
        "stsci.edu:asdf/core/ndarray",
        Box::new(ndarray::NdArrayDefinition),
    );
}
