//! The `core/asdf` definition: the top-level document.
//!
//! The document handler extracts the two structured keys it knows about
//! (`asdf_library`, `history`) and lowers every other key into the open
//! dynamic tree, where tag dispatch continues recursively.

use semver::Version;

use crate::error::{AsdfError, Result};
use crate::node::{Node, NodeKind};
use crate::schema::core::{History, NdArray, Software};
use crate::schema::lower::lower;
use crate::schema::registry::{find_definition, Definition, SchemaValue};
use crate::schema::Tag;

/// The ASDF object tree with its metadata.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// The software library that created the file (`asdf_library`).
    pub library: Option<Software>,
    /// The file's history (`history`).
    pub history: Option<History>,
    /// Everything else, as a dynamic tree.
    pub tree: crate::value::Value,
}

impl Document {
    /// Visits every array descriptor in the tree.
    pub fn iter_arrays<'a>(&'a self, visit: &mut impl FnMut(&'a NdArray)) {
        self.tree.for_each_array(visit);
    }
}

/// Handler for `core/asdf-1.1.0`.
pub(crate) struct DocumentDefinition;

impl Definition for DocumentDefinition {
    fn version(&self) -> Version {
        Version::new(1, 1, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        if node.kind != NodeKind::Mapping {
            return Err(AsdfError::Schema(format!(
                "tag core/asdf-{} requires a mapping node",
                self.version()
            )));
        }
        let mut document = Document {
            tree: crate::value::Value::Map(Vec::new()),
            ..Document::default()
        };
        for (key, child) in node.entries() {
            match key {
                "asdf_library" => {
                    let tag_text = child.tag.as_deref().ok_or_else(|| {
                        AsdfError::Schema(format!(
                            "while parsing core/asdf-{}/asdf_library: missing tag",
                            self.version()
                        ))
                    })?;
                    let tag = Tag::parse(tag_text)?;
                    let def = find_definition(&tag)
                        .ok_or_else(|| AsdfError::Schema(format!("unsupported tag: {tag}")))?;
                    let software = def
                        .unmarshal(child)
                        .map_err(|e| {
                            e.with_context(&format!(
                                "while parsing core/asdf-{}/{key}",
                                self.version()
                            ))
                        })?
                        .into_software()
                        .ok_or_else(|| {
                            AsdfError::Schema(format!(
                                "tag {tag} did not produce a software record"
                            ))
                        })?;
                    document.library = Some(software);
                }
                "history" => {
                    let name = match child.kind {
                        NodeKind::Sequence => "stsci.edu:asdf/core/history/sequence",
                        NodeKind::Mapping => "stsci.edu:asdf/core/history/mapping",
                        NodeKind::Scalar => {
                            return Err(AsdfError::Schema(format!(
                                "invalid history value kind: {:?}",
                                child.kind
                            )))
                        }
                    };
                    let tag = Tag::new(name, Version::new(1, 1, 0));
                    let def = find_definition(&tag)
                        .ok_or_else(|| AsdfError::Schema(format!("unsupported tag: {tag}")))?;
                    let history = def
                        .unmarshal(child)?
                        .into_history()
                        .ok_or_else(|| {
                            AsdfError::Schema(format!("tag {tag} did not produce a history"))
                        })?;
                    document.history = Some(history);
                }
                other => {
                    lower(&mut document.tree, child, &[other.to_string()]).map_err(|e| {
                        e.with_context(&format!(
                            "while transforming core/asdf-{}",
                            self.version()
                        ))
                    })?;
                }
            }
        }
        Ok(SchemaValue::Document(Box::new(document)))
    }
}
