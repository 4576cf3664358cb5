//! Owned YAML node tree.
//!
//! The YAML tokenizer is an external collaborator: it produces an event
//! stream carrying node kinds, tag handles, scalar styles and anchor ids.
//! This module assembles those events into an owned [`Node`] tree that the
//! schema layer can walk repeatedly.
//!
//! Two things happen at build time rather than later:
//!
//! - **Tag resolution.** Event-level tokenizers do not expose `%TAG`
//!   directives, so the builder prescans the document's directive lines
//!   itself. The primary handle `!` defaults to `tag:stsci.edu:asdf/`
//!   (the prefix the ASDF standard fixes for its files) and `!!` to the
//!   YAML core schema namespace; explicit directives override both.
//! - **Alias substitution.** Anchored nodes are remembered and aliases are
//!   replaced by a clone of the anchored subtree, so consumers never see
//!   an alias kind.

use yaml_rust2::parser::{Event, EventReceiver, Parser, Tag as YamlTag};
use yaml_rust2::scanner::TScalarStyle;

use crate::error::{AsdfError, Result};

/// The YAML core schema tag prefix; nodes under it are "builtin" and take
/// the generic lowering path.
pub const YAML_CORE_PREFIX: &str = "tag:yaml.org,2002:";

/// Default prefix of the primary tag handle in ASDF files.
const ASDF_TAG_PREFIX: &str = "tag:stsci.edu:asdf/";

/// Node kind as reported by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A scalar leaf.
    Scalar,
    /// A mapping; children are interleaved key/value nodes.
    Mapping,
    /// A sequence.
    Sequence,
}

/// One node of the parsed YAML document.
#[derive(Debug, Clone)]
pub struct Node {
    /// The node kind.
    pub kind: NodeKind,
    /// Resolved tag, when the node carries one.
    pub tag: Option<String>,
    /// Scalar text; empty for collections.
    pub value: String,
    /// `true` when the scalar was written plain (unquoted), which makes it
    /// eligible for type narrowing.
    pub plain: bool,
    /// Children: interleaved key/value pairs for mappings, elements for
    /// sequences.
    pub children: Vec<Node>,
}

impl Node {
    fn scalar(value: String, plain: bool, tag: Option<String>) -> Self {
        Self {
            kind: NodeKind::Scalar,
            tag,
            value,
            plain,
            children: Vec::new(),
        }
    }

    fn collection(kind: NodeKind, tag: Option<String>) -> Self {
        Self {
            kind,
            tag,
            value: String::new(),
            plain: false,
            children: Vec::new(),
        }
    }

    /// Iterates a mapping's `(key, value)` pairs. Keys are the scalar text
    /// of the key nodes.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.children
            .chunks_exact(2)
            .map(|pair| (pair[0].value.as_str(), &pair[1]))
    }
}

/// Parses YAML text into the root node of its single document.
///
/// Fails when the text holds no document or more than one, mirroring the
/// container rule that an ASDF file is exactly one YAML document with one
/// root.
pub fn parse_document(text: &str) -> Result<Node> {
    let handles = scan_tag_directives(text);
    let mut builder = TreeBuilder::new(handles);
    let mut parser = Parser::new_from_str(text);
    parser
        .load(&mut builder, true)
        .map_err(|e| AsdfError::Format(format!("failed to decode YAML: {e}")))?;
    if let Some(err) = builder.error.take() {
        return Err(err);
    }
    let mut docs = builder.documents;
    match docs.len() {
        0 => Err(AsdfError::Format(
            "invalid format: the document must contain exactly one root element".into(),
        )),
        1 => docs.pop().ok_or_else(|| {
            AsdfError::Format("invalid format: empty YAML document".into())
        }),
        n => Err(AsdfError::Format(format!(
            "invalid format: expected one YAML document, found {n}"
        ))),
    }
}

/// Extracts `%TAG <handle> <prefix>` directives. Directives may only
/// appear before a document starts, so scanning stops at the first `---`.
fn scan_tag_directives(text: &str) -> Vec<(String, String)> {
    let mut handles = vec![
        ("!!".to_string(), YAML_CORE_PREFIX.to_string()),
        ("!".to_string(), ASDF_TAG_PREFIX.to_string()),
    ];
    for line in text.lines() {
        if line.starts_with("---") {
            break;
        }
        let Some(rest) = line.strip_prefix("%TAG ") else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        if let (Some(handle), Some(prefix)) = (parts.next(), parts.next()) {
            handles.retain(|(h, _)| h != handle);
            handles.push((handle.to_string(), prefix.to_string()));
        }
    }
    handles
}

/// Assembles parser events into [`Node`] trees, one per document.
struct TreeBuilder {
    /// Tag handle → prefix substitutions.
    handles: Vec<(String, String)>,
    /// Finished document roots.
    documents: Vec<Node>,
    /// Open collections being filled, innermost last.
    stack: Vec<(Node, Option<usize>)>,
    /// Anchor id → finished subtree, for alias substitution.
    anchors: Vec<(usize, Node)>,
    /// First structural error; the parser API has no early exit.
    error: Option<AsdfError>,
}

impl TreeBuilder {
    fn new(handles: Vec<(String, String)>) -> Self {
        Self {
            handles,
            documents: Vec::new(),
            stack: Vec::new(),
            anchors: Vec::new(),
            error: None,
        }
    }

    fn resolve_tag(&self, tag: Option<&YamlTag>) -> Option<String> {
        let tag = tag?;
        let resolved = self
            .handles
            .iter()
            .find(|(handle, _)| *handle == tag.handle)
            .map_or_else(
                || format!("{}{}", tag.handle, tag.suffix),
                |(_, prefix)| format!("{prefix}{}", tag.suffix),
            );
        Some(resolved)
    }

    fn push_finished(&mut self, node: Node, anchor: Option<usize>) {
        if let Some(id) = anchor {
            self.anchors.push((id, node.clone()));
        }
        match self.stack.last_mut() {
            Some((parent, _)) => parent.children.push(node),
            None => self.documents.push(node),
        }
    }

    fn close_collection(&mut self) {
        if let Some((node, anchor)) = self.stack.pop() {
            self.push_finished(node, anchor);
        } else if self.error.is_none() {
            self.error = Some(AsdfError::Format(
                "unbalanced YAML collection events".into(),
            ));
        }
    }
}

impl EventReceiver for TreeBuilder {
    fn on_event(&mut self, ev: Event) {
        if self.error.is_some() {
            return;
        }
        match ev {
            Event::Scalar(value, style, anchor, tag) => {
                let plain = matches!(style, TScalarStyle::Plain);
                let tag = self.resolve_tag(tag.as_ref());
                let anchor = (anchor != 0).then_some(anchor);
                self.push_finished(Node::scalar(value, plain, tag), anchor);
            }
            Event::SequenceStart(anchor, tag) => {
                let tag = self.resolve_tag(tag.as_ref());
                let anchor = (anchor != 0).then_some(anchor);
                self.stack
                    .push((Node::collection(NodeKind::Sequence, tag), anchor));
            }
            Event::MappingStart(anchor, tag) => {
                let tag = self.resolve_tag(tag.as_ref());
                let anchor = (anchor != 0).then_some(anchor);
                self.stack
                    .push((Node::collection(NodeKind::Mapping, tag), anchor));
            }
            Event::SequenceEnd | Event::MappingEnd => self.close_collection(),
            Event::Alias(id) => {
                let resolved = self
                    .anchors
                    .iter()
                    .rev()
                    .find(|(anchor, _)| *anchor == id)
                    .map(|(_, node)| node.clone());
                match resolved {
                    Some(node) => self.push_finished(node, None),
                    None => {
                        self.error = Some(AsdfError::Format(format!(
                            "alias references unknown anchor #{id}"
                        )));
                    }
                }
            }
            Event::Nothing
            | Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_mapping_with_resolved_tags() {
        let root = parse_document("--- !core/asdf-1.1.0\nkey: 7\n").expect("parse");
        assert_eq!(root.kind, NodeKind::Mapping);
        assert_eq!(
            root.tag.as_deref(),
            Some("tag:stsci.edu:asdf/core/asdf-1.1.0")
        );
        let (key, value) = root.entries().next().expect("entry");
        assert_eq!(key, "key");
        assert_eq!(value.value, "7");
        assert!(value.plain);
    }

    #[test]
    fn honors_explicit_tag_directive() {
        let text = "%TAG ! tag:example.org:demo/\n--- !core/thing-1.0.0\n{}\n";
        let root = parse_document(text).expect("parse");
        assert_eq!(
            root.tag.as_deref(),
            Some("tag:example.org:demo/core/thing-1.0.0")
        );
    }

    #[test]
    fn quoted_scalars_are_not_plain() {
        let root = parse_document("a: \"17\"\nb: 17\n").expect("parse");
        let values: Vec<_> = root.entries().collect();
        assert!(!values[0].1.plain);
        assert!(values[1].1.plain);
    }

    #[test]
    fn aliases_substitute_the_anchored_subtree() {
        let root = parse_document("first: &a [1, 2]\nsecond: *a\n").expect("parse");
        let entries: Vec<_> = root.entries().collect();
        assert_eq!(entries[1].1.kind, NodeKind::Sequence);
        assert_eq!(entries[1].1.children.len(), 2);
    }

    #[test]
    fn rejects_multiple_documents() {
        let err = parse_document("--- {}\n--- {}\n").unwrap_err();
        assert!(matches!(err, AsdfError::Format(_)));
    }

    #[test]
    fn rejects_empty_stream() {
        assert!(parse_document("").is_err());
    }
}
