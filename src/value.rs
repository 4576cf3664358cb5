//! The dynamic tree container.
//!
//! ASDF schemas are open: user data can appear at arbitrary paths with
//! arbitrary shapes, so the YAML branch of a document is kept as a
//! JSON-shaped dynamic value rather than a typed struct. Schema objects
//! produced by tag dispatch (arrays, software records, …) are embedded
//! through the [`Value::Schema`] variant and downcast explicitly.
//!
//! Mappings preserve document order as a pair list; sequences are
//! pre-sized by the lowering pass and filled slot by slot.

use crate::error::Result;
use crate::schema::core::NdArray;
use crate::schema::SchemaValue;

/// A recursively-typed dynamic value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absent / YAML null. Also the placeholder in pre-sized sequences.
    #[default]
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Sequence of values.
    Seq(Vec<Value>),
    /// Ordered mapping from string keys to values.
    Map(Vec<(String, Value)>),
    /// An embedded schema object (NDArray, Software, …).
    Schema(SchemaValue),
}

impl Value {
    /// Returns the child under `key`, whether this is a mapping (by name)
    /// or a sequence (by decimal index).
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            Self::Seq(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Returns the value at a `/`-free path of segment strings.
    pub fn get_path(&self, path: &[&str]) -> Option<&Value> {
        path.iter().try_fold(self, |value, key| value.get(key))
    }

    /// Places `value` at `path`, creating nothing: every intermediate
    /// container must already exist (the lowering worklist guarantees
    /// parents are created before their children are visited). Returns
    /// `false` when the path cannot be resolved.
    pub(crate) fn set_path(&mut self, path: &[String], value: Value) -> bool {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return true;
        };
        let mut target = self;
        for key in parents {
            target = match target.get_mut(key) {
                Some(child) => child,
                None => return false,
            };
        }
        match target {
            Value::Map(entries) => {
                if let Some(slot) = entries.iter_mut().find(|(k, _)| k == last) {
                    slot.1 = value;
                } else {
                    entries.push((last.clone(), value));
                }
                true
            }
            Value::Seq(items) => match last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Self::Map(entries) => entries
                .iter_mut()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v),
            Self::Seq(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        }
    }

    /// Shallow iteration over the direct children of a container; scalars
    /// yield nothing.
    pub fn children(&self) -> impl Iterator<Item = &Value> {
        let slice: &[Value] = match self {
            Self::Seq(items) => items,
            _ => &[],
        };
        let pairs: &[(String, Value)] = match self {
            Self::Map(entries) => entries,
            _ => &[],
        };
        slice.iter().chain(pairs.iter().map(|(_, v)| v))
    }

    /// Visits every [`NdArray`] reachable from this value, depth-first.
    pub fn for_each_array<'a>(&'a self, visit: &mut impl FnMut(&'a NdArray)) {
        match self {
            Self::Schema(SchemaValue::Array(arr)) => visit(arr),
            Self::Seq(items) => {
                for item in items {
                    item.for_each_array(visit);
                }
            }
            Self::Map(entries) => {
                for (_, item) in entries {
                    item.for_each_array(visit);
                }
            }
            _ => {}
        }
    }

    /// Mutable, fallible variant of [`Value::for_each_array`]; stops at
    /// the first error.
    pub fn try_for_each_array_mut(
        &mut self,
        visit: &mut impl FnMut(&mut NdArray) -> Result<()>,
    ) -> Result<()> {
        match self {
            Self::Schema(SchemaValue::Array(arr)) => visit(arr),
            Self::Seq(items) => {
                for item in items {
                    item.try_for_each_array_mut(visit)?;
                }
                Ok(())
            }
            Self::Map(entries) => {
                for (_, item) in entries {
                    item.try_for_each_array_mut(visit)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Downcast to a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Downcast to an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Downcast to a float. Integers are not coerced.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Downcast to a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Downcast to an embedded array descriptor.
    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Self::Schema(SchemaValue::Array(arr)) => Some(arr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Map(vec![
            ("a".into(), Value::Int(1)),
            (
                "b".into(),
                Value::Seq(vec![Value::Null, Value::Str("x".into())]),
            ),
        ])
    }

    #[test]
    fn path_get_traverses_maps_and_sequences() {
        let v = sample();
        assert_eq!(v.get_path(&["a"]).and_then(Value::as_int), Some(1));
        assert_eq!(v.get_path(&["b", "1"]).and_then(Value::as_str), Some("x"));
        assert!(v.get_path(&["b", "2"]).is_none());
        assert!(v.get_path(&["c"]).is_none());
    }

    #[test]
    fn set_path_fills_existing_containers() {
        let mut v = sample();
        assert!(v.set_path(&["b".into(), "0".into()], Value::Bool(true)));
        assert_eq!(v.get_path(&["b", "0"]).and_then(Value::as_bool), Some(true));
        // New mapping keys are appended in order.
        assert!(v.set_path(&["c".into()], Value::Int(9)));
        match &v {
            Value::Map(entries) => assert_eq!(entries.last().map(|(k, _)| k.as_str()), Some("c")),
            _ => panic!("not a map"),
        }
        // Out-of-range sequence slots are rejected.
        assert!(!v.set_path(&["b".into(), "5".into()], Value::Null));
    }

    #[test]
    fn children_iterates_both_container_kinds() {
        let v = sample();
        assert_eq!(v.children().count(), 2);
        let seq = v.get("b").expect("seq");
        assert_eq!(seq.children().count(), 2);
        assert_eq!(Value::Int(3).children().count(), 0);
    }
}
