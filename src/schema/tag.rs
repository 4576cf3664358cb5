//! ASDF tag parsing.
//!
//! A tag names a versioned entity: `tag:stsci.edu:asdf/core/ndarray-1.0.0`
//! splits into the name `stsci.edu:asdf/core/ndarray` and the semver
//! `1.0.0`. Tags select schema definitions in the registry.

use std::fmt;

use semver::Version;

use crate::error::{AsdfError, Result};

/// A versioned entity name, as attached to YAML nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The entity name, without the `tag:` URI prefix.
    pub name: String,
    /// The entity version.
    pub version: Version,
}

impl Tag {
    /// Creates a tag from its parts.
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Parses a tag from its string form. The version separator is the
    /// first `-`; a leading `tag:` is stripped from the name.
    pub fn parse(s: &str) -> Result<Self> {
        let dash = s.find('-').ok_or_else(|| {
            AsdfError::Schema(format!(
                "cannot parse tag: \"{s}\": no version separator (dash)"
            ))
        })?;
        let mut name = &s[..dash];
        if let Some(stripped) = name.strip_prefix("tag:") {
            name = stripped;
        }
        let version = Version::parse(&s[dash + 1..]).map_err(|e| {
            AsdfError::Schema(format!("cannot parse tag: \"{s}\": invalid version: {e}"))
        })?;
        Ok(Self::new(name, version))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_the_first_dash() {
        let tag = Tag::parse("tag:stsci.edu:asdf/core/ndarray-1.0.0").expect("parse");
        assert_eq!(tag.name, "stsci.edu:asdf/core/ndarray");
        assert_eq!(tag.version, Version::new(1, 0, 0));
    }

    #[test]
    fn keeps_underscored_names_whole() {
        let tag = Tag::parse("stsci.edu:asdf/core/extension_metadata-1.0.0").expect("parse");
        assert_eq!(tag.name, "stsci.edu:asdf/core/extension_metadata");
    }

    #[test]
    fn rejects_missing_separator_and_bad_versions() {
        assert!(Tag::parse("noversion").is_err());
        assert!(Tag::parse("name-not.a.version").is_err());
    }

    #[test]
    fn round_trips_through_display() {
        let tag = Tag::parse("core/software-1.2.3").expect("parse");
        assert_eq!(tag.to_string(), "core/software-1.2.3");
    }
}
