//! The `core/ndarray` definition: n-dimensional array descriptors.
//!
//! An array's bytes normally live in a binary block referenced by integer
//! index; until the block-resolution pipeline runs, `data` holds a small
//! pending descriptor (see [`NdArray::data`]) instead of the payload.
//! Arrays can also carry their data inline as nested YAML sequences.

use log::warn;
use semver::Version;

use crate::error::{AsdfError, Result};
use crate::node::{Node, NodeKind};
use crate::schema::lower::lower;
use crate::schema::registry::{Definition, SchemaValue};
use crate::value::Value;

/// Element type of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DataType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    C64,
    C128,
}

impl DataType {
    /// Size in bytes of a single element.
    pub fn element_size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 | Self::C64 => 8,
            Self::C128 => 16,
        }
    }

    /// `true` for the complex types, whose elements are two floats of
    /// half the element size.
    pub fn is_complex(self) -> bool {
        matches!(self, Self::C64 | Self::C128)
    }

    /// Looks up a `datatype` name from the standard's vocabulary.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int8" => Some(Self::I8),
            "int16" => Some(Self::I16),
            "int32" => Some(Self::I32),
            "int64" => Some(Self::I64),
            "uint8" => Some(Self::U8),
            "uint16" => Some(Self::U16),
            "uint32" => Some(Self::U32),
            "uint64" => Some(Self::U64),
            "float32" => Some(Self::F32),
            "float64" => Some(Self::F64),
            "complex64" => Some(Self::C64),
            "complex128" => Some(Self::C128),
            _ => None,
        }
    }

    /// The standard's name for this type.
    pub fn name(self) -> &'static str {
        match self {
            Self::I8 => "int8",
            Self::I16 => "int16",
            Self::I32 => "int32",
            Self::I64 => "int64",
            Self::U8 => "uint8",
            Self::U16 => "uint16",
            Self::U32 => "uint32",
            Self::U64 => "uint64",
            Self::F32 => "float32",
            Self::F64 => "float64",
            Self::C64 => "complex64",
            Self::C128 => "complex128",
        }
    }
}

/// Byte order of an array's elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl ByteOrder {
    /// The byte order of the machine running this code.
    pub const fn host() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// An n-dimensional array descriptor, similar to `numpy.ndarray`.
#[derive(Debug, Clone)]
pub struct NdArray {
    /// The element type.
    pub datatype: DataType,
    /// The tensor shape; the element count is the product.
    pub shape: Vec<usize>,
    /// Byte order of the elements.
    pub byte_order: ByteOrder,
    /// The raw tensor buffer.
    ///
    /// While the YAML tree is being parsed this holds a pending block
    /// reference instead: a 4-byte little-endian block index, optionally
    /// followed by a 4-byte offset and 4 bytes per stride. The resolution
    /// pipeline replaces it with the materialized payload exactly once.
    pub data: Vec<u8>,
    /// `true` while `data` holds a pending block reference.
    pub(crate) pending: bool,
}

impl NdArray {
    /// Total number of elements.
    pub fn count_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Total payload size in bytes.
    pub fn count_bytes(&self) -> usize {
        self.count_elements() * self.datatype.element_size()
    }

    /// The block index this descriptor is waiting on, if unresolved.
    pub(crate) fn pending_block(&self) -> Option<u32> {
        if !self.pending {
            return None;
        }
        self.data
            .get(..4)
            .and_then(|b| <[u8; 4]>::try_from(b).ok())
            .map(u32::from_le_bytes)
    }

    /// Converts the buffer to host byte order if needed.
    ///
    /// Always allocates a fresh buffer: several arrays may share one
    /// block's bytes, so swapping in place is never safe. Idempotent: once
    /// the byte order is host, further calls are no-ops.
    pub fn ensure_host_endianness(&mut self) {
        if self.byte_order == ByteOrder::host() {
            return;
        }
        let width = if self.datatype.is_complex() {
            self.datatype.element_size() / 2
        } else {
            self.datatype.element_size()
        };
        if width == 1 {
            return;
        }
        let mut fixed = self.data.clone();
        for chunk in fixed.chunks_exact_mut(width) {
            chunk.reverse();
        }
        self.data = fixed;
        self.byte_order = ByteOrder::host();
    }
}

impl std::fmt::Display for NdArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dims: Vec<String> = self.shape.iter().map(ToString::to_string).collect();
        write!(
            f,
            "array<{}, {}> of shape [{}]",
            self.datatype.name(),
            match self.byte_order {
                ByteOrder::Little => "little",
                ByteOrder::Big => "big",
            },
            dims.join(", ")
        )
    }
}

/// Handler for `core/ndarray-1.0.0`.
pub(crate) struct NdArrayDefinition;

impl Definition for NdArrayDefinition {
    fn version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn unmarshal(&self, node: &Node) -> Result<SchemaValue> {
        let context = format!("while parsing core/ndarray-{}", self.version());
        let mut arr = NdArray {
            datatype: DataType::U8,
            shape: Vec::new(),
            byte_order: ByteOrder::host(),
            data: vec![0u8; 4],
            pending: true,
        };
        let mut offset: Option<u32> = None;
        let mut strides: Vec<u32> = Vec::new();
        let mut inline: Option<Value> = None;
        let mut datatype_declared = false;

        match node.kind {
            // A bare sequence is the inline-only form.
            NodeKind::Sequence => inline = Some(lower_inline(node, &context)?),
            NodeKind::Mapping => {
                for (key, child) in node.entries() {
                    match key {
                        "datatype" => {
                            datatype_declared = true;
                            arr.datatype = DataType::from_name(&child.value).unwrap_or_else(|| {
                                warn!(
                                    "unsupported dtype {} - falling back to uint8",
                                    child.value
                                );
                                DataType::U8
                            });
                        }
                        "byteorder" => {
                            arr.byte_order = match child.value.as_str() {
                                "little" => ByteOrder::Little,
                                "big" => ByteOrder::Big,
                                other => {
                                    return Err(AsdfError::Schema(format!(
                                        "{context}: unknown byte order: {other}"
                                    )))
                                }
                            };
                        }
                        "shape" => {
                            arr.shape = parse_dims(child, "shape", &context, 0)?;
                        }
                        "source" => {
                            let index: u32 = child.value.parse().map_err(|_| {
                                AsdfError::Schema(format!(
                                    "{context}/source: external blocks are not supported: {}",
                                    child.value
                                ))
                            })?;
                            arr.data = index.to_le_bytes().to_vec();
                        }
                        "strides" => {
                            strides = parse_dims(child, "strides", &context, 1)?
                                .into_iter()
                                .map(|s| s as u32)
                                .collect();
                        }
                        "offset" => {
                            offset = Some(child.value.parse().map_err(|_| {
                                AsdfError::Schema(format!(
                                    "{context}: offset must be a non-negative integer, got {}",
                                    child.value
                                ))
                            })?);
                        }
                        "data" => inline = Some(lower_inline(child, &context)?),
                        other => {
                            return Err(AsdfError::Schema(format!(
                                "unknown property of core/ndarray-{}: {other}",
                                self.version()
                            )))
                        }
                    }
                }
                if offset.is_some() || !strides.is_empty() {
                    let mut data = arr.data.clone();
                    data.extend_from_slice(&offset.unwrap_or(0).to_le_bytes());
                    for stride in &strides {
                        data.extend_from_slice(&stride.to_le_bytes());
                    }
                    arr.data = data;
                }
            }
            NodeKind::Scalar => {
                return Err(AsdfError::Schema(format!(
                    "node type must be a sequence or a mapping for core/ndarray-{}",
                    self.version()
                )))
            }
        }

        if let Some(tree) = inline {
            apply_inline_data(&mut arr, &tree, datatype_declared)
                .map_err(|e| e.with_context(&format!("{context}/data")))?;
        }
        Ok(SchemaValue::Array(arr))
    }
}

/// Parses a sequence of integer dimensions (`shape` or `strides`).
fn parse_dims(node: &Node, what: &str, context: &str, min: usize) -> Result<Vec<usize>> {
    if node.kind != NodeKind::Sequence {
        return Err(AsdfError::Schema(format!(
            "{context}: {what} must be a sequence"
        )));
    }
    let mut dims = Vec::with_capacity(node.children.len());
    for (i, child) in node.children.iter().enumerate() {
        let dim: usize = child.value.parse().map_err(|_| {
            AsdfError::Schema(format!(
                "{context}: {what}[{i}] must be an integer, got {}",
                child.value
            ))
        })?;
        if dim < min {
            return Err(AsdfError::Schema(format!(
                "{context}: {what}[{i}] must be greater than 0, got {dim}"
            )));
        }
        dims.push(dim);
    }
    Ok(dims)
}

/// Lowers an inline-data node into a dynamic tree, ignoring the ndarray
/// tag it may carry.
fn lower_inline(node: &Node, context: &str) -> Result<Value> {
    let mut untagged = node.clone();
    untagged.tag = None;
    let mut root = Value::Map(Vec::new());
    lower(&mut root, &untagged, &["data".to_string()])
        .map_err(|e| e.with_context(&format!("{context}: failed to process the inline data")))?;
    root.get("data").cloned().ok_or_else(|| {
        AsdfError::Schema(format!("{context}: failed to process the inline data"))
    })
}

/// Materializes inline data: infers shape and dtype from the lowered tree
/// and serializes the elements row-major in host byte order.
fn apply_inline_data(arr: &mut NdArray, data: &Value, dtype_declared: bool) -> Result<()> {
    // A leaf scalar is a one-element array.
    if data.children().count() == 0 {
        if !arr.shape.is_empty() && arr.shape != [1] {
            return Err(AsdfError::Schema(format!(
                "overridden shape is incompatible with the inline data: {:?}",
                arr.shape
            )));
        }
        arr.shape = vec![1];
        if !dtype_declared {
            arr.datatype = infer_scalar_type(data)?;
        }
        let mut out = vec![0u8; arr.datatype.element_size()];
        element_to_bytes(data, arr.datatype, &mut out)?;
        arr.data = out;
        arr.pending = false;
        return Ok(());
    }

    // Shape from the nesting depth and first-child counts.
    let mut shape = Vec::new();
    let mut elem = data;
    while let Some(first) = elem.children().next() {
        shape.push(elem.children().count());
        elem = first;
    }
    arr.shape = shape;

    if !dtype_declared {
        arr.datatype = if contains_float(data) {
            DataType::F64
        } else {
            DataType::I64
        };
    }

    let mut out = vec![0u8; arr.count_bytes()];
    let size = arr.datatype.element_size();
    let mut offset = 0usize;
    serialize_row_major(data, arr.datatype, size, &mut out, &mut offset)?;
    if offset != out.len() {
        return Err(AsdfError::Schema(format!(
            "inline data is ragged: serialized {offset} of {} bytes",
            out.len()
        )));
    }
    arr.data = out;
    arr.pending = false;
    Ok(())
}

fn serialize_row_major(
    value: &Value,
    dtype: DataType,
    size: usize,
    out: &mut [u8],
    offset: &mut usize,
) -> Result<()> {
    if value.children().count() == 0 {
        let slot = out.get_mut(*offset..*offset + size).ok_or_else(|| {
            AsdfError::Schema("inline data does not match the declared shape".into())
        })?;
        element_to_bytes(value, dtype, slot)?;
        *offset += size;
        return Ok(());
    }
    for child in value.children() {
        serialize_row_major(child, dtype, size, out, offset)?;
    }
    Ok(())
}

fn contains_float(value: &Value) -> bool {
    match value {
        Value::Float(_) => true,
        Value::Seq(items) => items.iter().any(contains_float),
        _ => false,
    }
}

fn infer_scalar_type(value: &Value) -> Result<DataType> {
    match value {
        Value::Int(_) => Ok(DataType::I64),
        Value::Float(_) => Ok(DataType::F64),
        other => Err(AsdfError::Schema(format!(
            "unexpected array element type: {other:?}"
        ))),
    }
}

/// Writes one inline element in host byte order.
fn element_to_bytes(value: &Value, dtype: DataType, out: &mut [u8]) -> Result<()> {
    let as_int = || {
        value.as_int().ok_or_else(|| {
            AsdfError::Schema(format!(
                "inline element {value:?} is not an integer (dtype {})",
                dtype.name()
            ))
        })
    };
    let as_float = || match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        other => Err(AsdfError::Schema(format!(
            "inline element {other:?} is not a number (dtype {})",
            dtype.name()
        ))),
    };
    match dtype {
        DataType::I8 | DataType::U8 => out.copy_from_slice(&(as_int()? as u8).to_ne_bytes()),
        DataType::I16 | DataType::U16 => out.copy_from_slice(&(as_int()? as u16).to_ne_bytes()),
        DataType::I32 | DataType::U32 => out.copy_from_slice(&(as_int()? as u32).to_ne_bytes()),
        DataType::I64 | DataType::U64 => out.copy_from_slice(&(as_int()? as u64).to_ne_bytes()),
        DataType::F32 => out.copy_from_slice(&(as_float()? as f32).to_ne_bytes()),
        DataType::F64 => out.copy_from_slice(&as_float()?.to_ne_bytes()),
        DataType::C64 | DataType::C128 => {
            return Err(AsdfError::Schema(
                "inline data cannot express complex elements".into(),
            ))
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::parse_document;

    fn unmarshal(yaml: &str) -> Result<NdArray> {
        let root = parse_document(yaml).expect("yaml");
        NdArrayDefinition.unmarshal(&root).map(|v| match v {
            SchemaValue::Array(arr) => arr,
            other => panic!("not an array: {other:?}"),
        })
    }

    #[test]
    fn source_only_descriptor_is_a_block_index() {
        let arr = unmarshal("{source: 3, datatype: int32, shape: [2, 5], byteorder: big}")
            .expect("unmarshal");
        assert_eq!(arr.datatype, DataType::I32);
        assert_eq!(arr.shape, [2, 5]);
        assert_eq!(arr.byte_order, ByteOrder::Big);
        assert_eq!(arr.data, 3u32.to_le_bytes());
        assert_eq!(arr.pending_block(), Some(3));
        assert_eq!(arr.count_bytes(), 40);
    }

    #[test]
    fn offset_and_strides_extend_the_descriptor() {
        let arr = unmarshal("{source: 0, datatype: uint8, shape: [2, 2], offset: 8, strides: [4, 1]}")
            .expect("unmarshal");
        let mut expected = Vec::new();
        expected.extend_from_slice(&0u32.to_le_bytes());
        expected.extend_from_slice(&8u32.to_le_bytes());
        expected.extend_from_slice(&4u32.to_le_bytes());
        expected.extend_from_slice(&1u32.to_le_bytes());
        assert_eq!(arr.data, expected);
        assert_eq!(arr.pending_block(), Some(0));
    }

    #[test]
    fn external_source_is_rejected() {
        let err = unmarshal("{source: ../blocks/0.bin}").unwrap_err();
        match err {
            AsdfError::Schema(msg) => assert!(msg.contains("external blocks are not supported")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_dtype_falls_back_to_uint8() {
        let arr = unmarshal("{source: 0, datatype: float128, shape: [4]}").expect("unmarshal");
        assert_eq!(arr.datatype, DataType::U8);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(unmarshal("{source: 0, sturdiness: 3}").is_err());
    }

    #[test]
    fn inline_sequence_infers_shape_and_dtype() {
        let arr = unmarshal("[[1, 2, 3], [4, 5, 6]]").expect("unmarshal");
        assert!(!arr.pending);
        assert_eq!(arr.shape, [2, 3]);
        assert_eq!(arr.datatype, DataType::I64);
        let values: Vec<i64> = arr
            .data
            .chunks_exact(8)
            .map(|c| i64::from_ne_bytes(c.try_into().expect("chunk")))
            .collect();
        assert_eq!(values, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn any_float_promotes_inline_data_to_f64() {
        let arr = unmarshal("{data: [[1, 2], [3, 4.5]]}").expect("unmarshal");
        assert_eq!(arr.datatype, DataType::F64);
        let values: Vec<f64> = arr
            .data
            .chunks_exact(8)
            .map(|c| f64::from_ne_bytes(c.try_into().expect("chunk")))
            .collect();
        assert_eq!(values, [1.0, 2.0, 3.0, 4.5]);
    }

    #[test]
    fn inline_scalar_has_unit_shape() {
        let arr = unmarshal("{data: 12}").expect("unmarshal");
        assert_eq!(arr.shape, [1]);
        assert_eq!(arr.datatype, DataType::I64);
        assert_eq!(arr.data.len(), 8);
    }

    #[test]
    fn incompatible_shape_override_is_rejected() {
        assert!(unmarshal("{shape: [2], data: 12}").is_err());
    }

    #[test]
    fn endianness_swap_is_idempotent_and_reversible() {
        let mut arr = NdArray {
            datatype: DataType::I32,
            shape: vec![2],
            byte_order: if ByteOrder::host() == ByteOrder::Little {
                ByteOrder::Big
            } else {
                ByteOrder::Little
            },
            data: vec![0, 0, 0, 1, 0, 0, 0, 2],
            pending: false,
        };
        let original = arr.data.clone();
        arr.ensure_host_endianness();
        assert_eq!(arr.byte_order, ByteOrder::host());
        let swapped = arr.data.clone();
        assert_ne!(swapped, original);
        // Swapping twice restores the original bytes.
        let mut double: Vec<u8> = swapped.clone();
        for chunk in double.chunks_exact_mut(4) {
            chunk.reverse();
        }
        assert_eq!(double, original);
        // Further calls are no-ops.
        arr.ensure_host_endianness();
        assert_eq!(arr.data, swapped);
    }

    #[test]
    fn complex_elements_swap_as_two_halves() {
        let mut arr = NdArray {
            datatype: DataType::C64,
            shape: vec![1],
            byte_order: if ByteOrder::host() == ByteOrder::Little {
                ByteOrder::Big
            } else {
                ByteOrder::Little
            },
            data: vec![1, 2, 3, 4, 5, 6, 7, 8],
            pending: false,
        };
        arr.ensure_host_endianness();
        assert_eq!(arr.data, [4, 3, 2, 1, 8, 7, 6, 5]);
    }
}
