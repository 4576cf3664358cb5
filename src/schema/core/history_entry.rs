//! The `core/history_entry` definition: one recorded transformation.

use semver::Version;

use crate::error::{AsdfError, Result};
use crate::node::{Node, NodeKind};
use crate::schema::registry::{find_definition, Definition, SchemaValue};
use crate::schema::core::Software;
use crate::schema::Tag;

/// One entry of a file's change history.
#[derive(Debug, Clone, Default)]
pub struct HistoryEntry {
    /// Description of the transformation performed.
    pub description: String,
    /// Timestamp of the transformation, as written in the file.
    pub time: String,
    /// The software involved; one or more elements.
    pub software: Vec<Software>,
}

/// Handler for `core/history_entry-1.0.0`.
pub(crate) struct HistoryEntryDefinition;

impl Definition for HistoryEntryDefinition {
    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        if node.kind != NodeKind::Mapping {
            return Err(AsdfError::Schema(format!(
                "node type must be a mapping for core/history_entry-{}",
                self.version()
            )));
        }
        let mut entry = HistoryEntry::default();
        for (key, child) in node.entries() {
            match key {
                "description" => entry.description = child.value.clone(),
                "time" => entry.time = child.value.clone(),
                "software" => {
                    // Either a single tagged mapping or a sequence of them.
                    let children: Vec<&Node> = if child.kind == NodeKind::Sequence {
                        child.children.iter().collect()
                    } else {
                        vec![child]
                    };
                    for item in children {
                        let tag_text = item.tag.as_deref().ok_or_else(|| {
                            AsdfError::Schema(format!(
                                "while parsing core/history_entry-{}/software: missing tag",
                                self.version()
                            ))
                        })?;
                        let tag = Tag::parse(tag_text)?;
                        let def = find_definition(&tag).ok_or_else(|| {
                            AsdfError::Schema(format!("unsupported tag: {tag}"))
                        })?;
                        let software = def
                            .unmarshal(item)
                            .map_err(|e| {
                                e.with_context(&format!(
                                    "while parsing core/history_entry-{}/software",
                                    self.version()
                                ))
                            })?
                            .into_software()
                            .ok_or_else(|| {
                                AsdfError::Schema(format!(
                                    "tag {tag} did not produce a software record"
                                ))
                            })?;
                        entry.software.push(software);
                    }
                }
                other => {
                    return Err(AsdfError::Schema(format!(
                        "invalid key in a core/history_entry-{}: {other}",
                        self.version()
                    )))
                }
            }
        }
        Ok(SchemaValue::HistoryEntry(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    #[test]
    fn unmarshals_single_and_sequence_software() {
        let single = parse_document(
            "description: initial import\ntime: 2019-05-01T12:00:00\n\
             software: !core/software-1.0.0 {name: foo, version: 1.2.3}\n",
        )
        .expect("yaml");
        let entry = HistoryEntryDefinition
            .unmarshal(&single)
            .expect("unmarshal")
            .into_history_entry()
            .expect("entry");
        assert_eq!(entry.description, "initial import");
        assert_eq!(entry.software.len(), 1);
        assert_eq!(entry.software[0].name, "foo");
        assert_eq!(entry.software[0].version, Version::new(1, 2, 3));

        let listed = parse_document(
            "description: edit\nsoftware:\n\
             - !core/software-1.0.0 {name: a, version: 0.1.0}\n\
             - !core/software-1.0.0 {name: b, version: 0.2.0}\n",
        )
        .expect("yaml");
        let entry = HistoryEntryDefinition
            .unmarshal(&listed)
            .expect("unmarshal")
            .into_history_entry()
            .expect("entry");
        assert_eq!(entry.software.len(), 2);
        assert_eq!(entry.software[1].name, "b");
    }

    #[test]
    fn rejects_untagged_software_and_unknown_keys() {
        let node = parse_document("software: {name: a, version: 0.1.0}").expect("yaml");
        assert!(HistoryEntryDefinition.unmarshal(&node).is_err());
        let node = parse_document("{description: x, reason: y}").expect("yaml");
        assert!(HistoryEntryDefinition.unmarshal(&node).is_err());
    }
}
