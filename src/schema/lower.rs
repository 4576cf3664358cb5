//! Generic YAML → [`Value`] lowering.
//!
//! Everything outside the structured document keys lands here. The walk is
//! a depth-first worklist over `(path, node)` pairs. A node carrying a
//! known non-builtin tag is handed to its registry definition and the
//! result is embedded opaquely; the definition owns its whole subtree.
//! Unknown but well-formed tags are logged and lowered generically so the
//! rest of the tree stays usable.
//!
//! Plain scalars are narrowed in the order int → bool → float; anything
//! quoted stays a string.

use log::warn;

use crate::error::Result;
use crate::node::{Node, NodeKind, YAML_CORE_PREFIX};
use crate::schema::registry::find_definition;
use crate::schema::Tag;
use crate::value::Value;

/// Lowers `node` into `container` at `path`. Intermediate containers along
/// `path` must already exist; the worklist guarantees that for its own
/// descendants.
pub(crate) fn lower(container: &mut Value, node: &Node, path: &[String]) -> Result<()> {
    let mut worklist: Vec<(Vec<String>, &Node)> = vec![(path.to_vec(), node)];
    while let Some((path, node)) = worklist.pop() {
        if let Some(tag) = non_builtin_tag(node) {
            let parsed = Tag::parse(tag)
                .map_err(|e| e.with_context(&format!("while converting {}", path.join("."))))?;
            match find_definition(&parsed) {
                Some(def) => {
                    let object = def.unmarshal(node).map_err(|e| {
                        e.with_context(&format!("while converting {}", path.join(".")))
                    })?;
                    set(container, &path, Value::Schema(object));
                    continue;
                }
                None => {
                    warn!("unsupported tag at {}: {parsed}", path.join("."));
                }
            }
        }
        match node.kind {
            NodeKind::Scalar => {
                set(container, &path, narrow_scalar(node));
            }
            NodeKind::Mapping => {
                set(container, &path, Value::Map(Vec::new()));
                // The worklist is a stack, so push in reverse to keep
                // document order in the pair list.
                for (key, child) in node.entries().collect::<Vec<_>>().into_iter().rev() {
                    let mut child_path = path.clone();
                    child_path.push(key.to_string());
                    worklist.push((child_path, child));
                }
            }
            NodeKind::Sequence => {
                set(
                    container,
                    &path,
                    Value::Seq(vec![Value::Null; node.children.len()]),
                );
                for (i, child) in node.children.iter().enumerate() {
                    let mut child_path = path.clone();
                    child_path.push(i.to_string());
                    worklist.push((child_path, child));
                }
            }
        }
    }
    Ok(())
}

fn set(container: &mut Value, path: &[String], value: Value) {
    // Parents are created before children are enqueued, so this only
    // fails on a ragged path we built ourselves.
    let stored = container.set_path(path, value);
    debug_assert!(stored, "lowering produced an unreachable path: {path:?}");
}

fn non_builtin_tag(node: &Node) -> Option<&str> {
    node.tag
        .as_deref()
        .filter(|tag| !tag.starts_with(YAML_CORE_PREFIX) && !tag.starts_with("!!"))
}

/// Narrows a scalar: plain scalars try int, then bool, then float; quoted
/// scalars, explicitly tagged scalars and failed parses stay strings.
fn narrow_scalar(node: &Node) -> Value {
    if node.plain && node.tag.is_none() {
        if let Ok(int) = node.value.parse::<i64>() {
            return Value::Int(int);
        }
        if let Some(boolean) = parse_bool(&node.value) {
            return Value::Bool(boolean);
        }
        if let Ok(float) = node.value.parse::<f64>() {
            return Value::Float(float);
        }
    }
    Value::Str(node.value.clone())
}

fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "true" | "True" | "TRUE" => Some(true),
        "false" | "False" | "FALSE" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    fn lowered(yaml: &str) -> Value {
        let node = parse_document(yaml).expect("yaml");
        let mut root = Value::Map(Vec::new());
        lower(&mut root, &node, &["doc".to_string()]).expect("lower");
        root.get("doc").cloned().expect("doc")
    }

    #[test]
    fn narrows_plain_scalars_in_order() {
        let value = lowered(
            "int: 42\nnegative: -7\nboolean: true\nfloat: 2.5\n\
             exp: 1e3\ntext: hello\nquoted: \"42\"\n",
        );
        assert_eq!(value.get("int").and_then(Value::as_int), Some(42));
        assert_eq!(value.get("negative").and_then(Value::as_int), Some(-7));
        assert_eq!(value.get("boolean").and_then(Value::as_bool), Some(true));
        assert_eq!(value.get("float").and_then(Value::as_float), Some(2.5));
        assert_eq!(value.get("exp").and_then(Value::as_float), Some(1000.0));
        assert_eq!(value.get("text").and_then(Value::as_str), Some("hello"));
        // Quoted scalars never narrow.
        assert_eq!(value.get("quoted").and_then(Value::as_str), Some("42"));
    }

    #[test]
    fn preserves_mapping_order_and_sequence_slots() {
        let value = lowered("b: 1\na: 2\nlist: [10, 20, 30]\n");
        match &value {
            Value::Map(entries) => {
                let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, ["b", "a", "list"]);
            }
            other => panic!("not a map: {other:?}"),
        }
        assert_eq!(
            value.get_path(&["list", "2"]).and_then(Value::as_int),
            Some(30)
        );
    }

    #[test]
    fn dispatches_known_tags_to_the_registry() {
        let value = lowered("arr: !core/ndarray-1.0.0 {source: 2, datatype: uint16, shape: [4]}\n");
        let arr = value.get("arr").and_then(Value::as_array).expect("array");
        assert_eq!(arr.shape, [4]);
    }

    #[test]
    fn unknown_tags_fall_through_to_generic_lowering() {
        let value = lowered("weird: !custom/thing-1.0.0 {a: 1}\n");
        assert_eq!(
            value.get_path(&["weird", "a"]).and_then(Value::as_int),
            Some(1)
        );
    }

    #[test]
    fn builtin_tags_do_not_hit_the_registry() {
        let value = lowered("num: !!str 17\n");
        assert_eq!(value.get("num").and_then(Value::as_str), Some("17"));
    }
}
