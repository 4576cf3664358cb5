//! The `core/history` definitions.
//!
//! The standard allows two shapes for a document's `history` key: a bare
//! sequence of history entries (the older form) and a mapping with
//! `extensions` and `entries` lists. Each shape has its own definition;
//! the document handler picks one by node kind.

use semver::Version;

use crate::error::{AsdfError, Result};
use crate::node::{Node, NodeKind};
use crate::schema::core::{ExtensionMetadata, HistoryEntry};
use crate::schema::registry::{find_definition, Definition, SchemaValue};
use crate::schema::Tag;

/// The change history of a document.
#[derive(Debug, Clone, Default)]
pub struct History {
    /// Extensions used to create the file.
    pub extensions: Vec<ExtensionMetadata>,
    /// Recorded transformations.
    pub entries: Vec<HistoryEntry>,
}

/// Resolves the definition selected by the tag of a sequence's first
/// element and unmarshals every element with it.
fn unmarshal_tagged_sequence(node: &Node, context: &str) -> Result<Vec<SchemaValue>> {
    let Some(first) = node.children.first() else {
        return Ok(Vec::new());
    };
    let tag_text = first.tag.as_deref().ok_or_else(|| {
        AsdfError::Schema(format!("{context}: sequence elements must be tagged"))
    })?;
    let tag = Tag::parse(tag_text)?;
    let def =
        find_definition(&tag).ok_or_else(|| AsdfError::Schema(format!("unsupported tag: {tag}")))?;
    let mut values = Vec::with_capacity(node.children.len());
    for (i, child) in node.children.iter().enumerate() {
        values.push(
            def.unmarshal(child)
                .map_err(|e| e.with_context(&format!("{context}[{i}]")))?,
        );
    }
    Ok(values)
}

/// Handler for the sequence shape, `core/history/sequence-1.1.0`.
pub(crate) struct HistorySequenceDefinition;

impl Definition for HistorySequenceDefinition {
    fn version(&self) -> Version {
        Version::new(1, 1, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        if node.kind != NodeKind::Sequence {
            return Err(AsdfError::Schema(format!(
                "tag core/history-{} requires a sequence node",
                self.version()
            )));
        }
        let mut history = History::default();
        let context = format!("while parsing core/history-{}", self.version());
        for value in unmarshal_tagged_sequence(node, &context)? {
            let entry = value.into_history_entry().ok_or_else(|| {
                AsdfError::Schema(format!("{context}: element is not a history entry"))
            })?;
            history.entries.push(entry);
        }
        Ok(SchemaValue::History(history))
    }
}

/// Handler for the mapping shape, `core/history/mapping-1.1.0`.
pub(crate) struct HistoryMappingDefinition;

impl Definition for HistoryMappingDefinition {
    fn version(&self) -> Version {
        Version::new(1, 1, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        if node.kind != NodeKind::Mapping {
            return Err(AsdfError::Schema(format!(
                "tag core/history-{} requires a mapping node",
                self.version()
            )));
        }
        let mut history = History::default();
        for (key, child) in node.entries() {
            let known = key == "extensions" || key == "entries";
            if !known
                || child.kind != NodeKind::Sequence
                || child.children.is_empty()
                || child.children[0].tag.is_none()
            {
                return Err(AsdfError::Schema(format!(
                    "invalid key in a core/history-{} element: {key}",
                    self.version()
                )));
            }
            let context = format!("while parsing core/history-{}/{key}", self.version());
            for value in unmarshal_tagged_sequence(child, &context)? {
                match key {
                    "extensions" => {
                        let metadata = value.into_extension_metadata().ok_or_else(|| {
                            AsdfError::Schema(format!(
                                "{context}: element is not extension metadata"
                            ))
                        })?;
                        history.extensions.push(metadata);
                    }
                    _ => {
                        let entry = value.into_history_entry().ok_or_else(|| {
                            AsdfError::Schema(format!(
                                "{context}: element is not a history entry"
                            ))
                        })?;
                        history.entries.push(entry);
                    }
                }
            }
        }
        Ok(SchemaValue::History(history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    fn history_of(definition: &dyn Definition, yaml: &str) -> Result<History> {
        let node = parse_document(yaml).expect("yaml");
        definition.unmarshal(&node).map(|v| {
            v.into_history().expect("history")
        })
    }

    #[test]
    fn sequence_shape_collects_entries() {
        let history = history_of(
            &HistorySequenceDefinition,
            "- !core/history_entry-1.0.0 {description: one}\n\
             - !core/history_entry-1.0.0 {description: two}\n",
        )
        .expect("unmarshal");
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[1].description, "two");
        assert!(history.extensions.is_empty());
    }

    #[test]
    fn empty_sequence_is_an_empty_history() {
        let history = history_of(&HistorySequenceDefinition, "[]").expect("unmarshal");
        assert!(history.entries.is_empty());
    }

    #[test]
    fn mapping_shape_collects_extensions_and_entries() {
        let history = history_of(
            &HistoryMappingDefinition,
            "extensions:\n\
             - !core/extension_metadata-1.0.0 {extension_class: c, \
               software: {name: asdf, version: 2.3.1}}\n\
             entries:\n\
             - !core/history_entry-1.0.0 {description: converted}\n",
        )
        .expect("unmarshal");
        assert_eq!(history.extensions.len(), 1);
        assert_eq!(history.extensions[0].package.name, "asdf");
        assert_eq!(history.entries.len(), 1);
    }

    #[test]
    fn mapping_shape_rejects_unknown_or_untagged_content() {
        assert!(history_of(&HistoryMappingDefinition, "notes: []").is_err());
        assert!(history_of(
            &HistoryMappingDefinition,
            "entries:\n- {description: untagged}\n"
        )
        .is_err());
    }
}
