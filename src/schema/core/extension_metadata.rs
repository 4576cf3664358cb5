//! The `core/extension_metadata` definition.

use semver::Version;

use crate::error::{AsdfError, Result};
use crate::node::{Node, NodeKind};
use crate::schema::registry::{Definition, SchemaValue};
use crate::schema::Tag;

/// Metadata of an extension used to create a file.
#[derive(Debug, Clone)]
pub struct ExtensionMetadata {
    /// The value of the `extension_class` property.
    pub class: String,
    /// Name and version of the extension package.
    pub package: Tag,
}

/// Handler for `core/extension_metadata-1.0.0`.
pub(crate) struct ExtensionMetadataDefinition;

impl Definition for ExtensionMetadataDefinition {
    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        if node.kind != NodeKind::Mapping {
            return Err(AsdfError::Schema(format!(
                "node type must be a mapping for core/extension_metadata-{}",
                self.version()
            )));
        }
        let mut metadata = ExtensionMetadata {
            class: String::new(),
            package: Tag::new("", Version::new(0, 0, 0)),
        };
        for (key, child) in node.entries() {
            match key {
                "extension_class" => metadata.class = child.value.clone(),
                // The software value is a plain mapping here, not a tagged
                // core/software node.
                "software" => {
                    for (prop, value) in child.entries() {
                        match prop {
                            "name" => metadata.package.name = value.value.clone(),
                            "version" => {
                                metadata.package.version =
                                    Version::parse(&value.value).map_err(|e| {
                                        AsdfError::Schema(format!(
                                            "while parsing core/extension_metadata-{}: {e}",
                                            self.version()
                                        ))
                                    })?;
                            }
                            _ => {}
                        }
                    }
                }
                other => {
                    return Err(AsdfError::Schema(format!(
                        "invalid key in a core/extension_metadata-{} element: {other}",
                        self.version()
                    )))
                }
            }
        }
        Ok(SchemaValue::ExtensionMetadata(metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    #[test]
    fn unmarshals_class_and_package() {
        let node = parse_document(
            "{extension_class: asdf.extension.BuiltinExtension, \
             software: {name: asdf, version: 2.3.1}}",
        )
        .expect("yaml");
        let metadata = ExtensionMetadataDefinition
            .unmarshal(&node)
            .expect("unmarshal")
            .into_extension_metadata()
            .expect("metadata");
        assert_eq!(metadata.class, "asdf.extension.BuiltinExtension");
        assert_eq!(metadata.package.name, "asdf");
        assert_eq!(metadata.package.version, Version::new(2, 3, 1));
    }

    #[test]
    fn rejects_unknown_keys() {
        let node = parse_document("{extension_class: x, vendor: y}").expect("yaml");
        assert!(ExtensionMetadataDefinition.unmarshal(&node).is_err());
    }
}
