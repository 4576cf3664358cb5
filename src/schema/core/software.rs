//! The `core/software` definition: which library or tool produced a file.

use std::fmt;

use semver::Version;

use crate::error::{AsdfError, Result};
use crate::node::{Node, NodeKind};
use crate::schema::registry::{Definition, SchemaValue};

/// Information about a library or a tool.
#[derive(Debug, Clone)]
pub struct Software {
    /// The software name.
    pub name: String,
    /// The software version.
    pub version: Version,
    /// The author of the software.
    pub author: String,
    /// The URL of the software.
    pub homepage: String,
}

impl Default for Software {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: Version::new(0, 0, 0),
            author: String::new(),
            homepage: String::new(),
        }
    }
}

impl fmt::Display for Software {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{} [{}]({})",
            self.name, self.version, self.author, self.homepage
        )
    }
}

/// Handler for `core/software-1.0.0`.
pub(crate) struct SoftwareDefinition;

impl Definition for SoftwareDefinition {
    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        if node.kind != NodeKind::Mapping {
            return Err(AsdfError::Schema(format!(
                "tag core/software-{} requires a mapping node",
                self.version()
            )));
        }
        let mut software = Software::default();
        for (key, child) in node.entries() {
            match key {
                "name" => software.name = child.value.clone(),
                "author" => software.author = child.value.clone(),
                "homepage" => software.homepage = child.value.clone(),
                "version" => {
                    software.version = Version::parse(&child.value).map_err(|e| {
                        AsdfError::Schema(format!(
                            "invalid version in a core/software-{} element: {e}",
                            self.version()
                        ))
                    })?;
                }
                other => {
                    return Err(AsdfError::Schema(format!(
                        "invalid key in a core/software-{} element: {other}",
                        self.version()
                    )))
                }
            }
        }
        Ok(SchemaValue::Software(software))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    #[test]
    fn unmarshals_all_fields() {
        let node = parse_document(
            "{name: asdf, version: 2.3.1, author: Space Telescope, homepage: https://example.org}",
        )
        .expect("yaml");
        let software = SoftwareDefinition
            .unmarshal(&node)
            .expect("unmarshal")
            .into_software()
            .expect("software");
        assert_eq!(software.name, "asdf");
        assert_eq!(software.version, Version::new(2, 3, 1));
        assert_eq!(software.author, "Space Telescope");
        assert_eq!(software.homepage, "https://example.org");
    }

    #[test]
    fn rejects_unknown_keys_and_non_mappings() {
        let node = parse_document("{name: x, vendor: y}").expect("yaml");
        assert!(SoftwareDefinition.unmarshal(&node).is_err());
        let node = parse_document("[1, 2]").expect("yaml");
        assert!(SoftwareDefinition.unmarshal(&node).is_err());
    }
}
