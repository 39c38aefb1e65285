//! Declarative structure schemas
//!
//! A [`Schema`] is an ordered list of named nodes describing the byte layout
//! of one structure: scalars, nested groups, or a repeated group. The codec
//! walks the schema recursively in both directions, so adding a field to a
//! structure means adding one line to its schema. A [`Repeated`] node has no
//! item-count prefix on the wire; it greedily consumes whatever remains of
//! the enclosing slice and therefore must be the last node of its schema.
//!
//! [`Repeated`]: SchemaNode::Repeated

use std::collections::BTreeMap;

use bytes::BytesMut;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::field::{Field, FieldValue};

/// One layout node of a schema
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Scalar(Field),
    Object(Schema),
    Repeated(Schema),
}

/// Ordered field layout of a structure
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entries: Vec<(&'static str, SchemaNode)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scalar(mut self, field: Field) -> Self {
        self.entries.push((field.name, SchemaNode::Scalar(field)));
        self
    }

    pub fn object(mut self, name: &'static str, schema: Schema) -> Self {
        self.entries.push((name, SchemaNode::Object(schema)));
        self
    }

    pub fn repeated(mut self, name: &'static str, item: Schema) -> Self {
        self.entries.push((name, SchemaNode::Repeated(item)));
        self
    }

    pub fn entries(&self) -> &[(&'static str, SchemaNode)] {
        &self.entries
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| *n == name)
    }

    /// Byte width of the layout ignoring repeated groups (their width is
    /// data-dependent).
    pub fn fixed_width(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, node)| match node {
                SchemaNode::Scalar(field) => field.width,
                SchemaNode::Object(schema) => schema.fixed_width(),
                SchemaNode::Repeated(_) => 0,
            })
            .sum()
    }

    /// Byte size of this layout for the given data. Absent repeated groups
    /// contribute zero bytes; absent scalars still occupy their width.
    pub fn byte_size(&self, data: &DataMap) -> usize {
        self.entries
            .iter()
            .map(|(name, node)| match node {
                SchemaNode::Scalar(field) => field.width,
                SchemaNode::Object(schema) => match data.get(name) {
                    Some(DataValue::Object(nested)) => schema.byte_size(nested),
                    _ => schema.fixed_width(),
                },
                SchemaNode::Repeated(item) => match data.get(name) {
                    Some(DataValue::Items(items)) => items.len() * item.fixed_width(),
                    _ => 0,
                },
            })
            .sum()
    }

    /// Serialize `data` in schema order. Absent scalar fields encode as zero
    /// bytes so a partially populated structure still has a stable layout.
    pub fn encode(&self, data: &DataMap, out: &mut BytesMut) -> Result<()> {
        for (name, node) in &self.entries {
            match node {
                SchemaNode::Scalar(field) => match data.get(name) {
                    Some(DataValue::Scalar(value)) => field.encode(value, out)?,
                    Some(other) => {
                        return Err(Error::WrongKind {
                            field: (*name).to_string(),
                            expected: "scalar",
                            actual: other.kind_name(),
                        })
                    }
                    None => field.encode_empty(out),
                },
                SchemaNode::Object(schema) => match data.get(name) {
                    Some(DataValue::Object(nested)) => schema.encode(nested, out)?,
                    Some(other) => {
                        return Err(Error::WrongKind {
                            field: (*name).to_string(),
                            expected: "object",
                            actual: other.kind_name(),
                        })
                    }
                    None => schema.encode(&DataMap::new(), out)?,
                },
                SchemaNode::Repeated(item) => match data.get(name) {
                    Some(DataValue::Items(items)) => {
                        for entry in items {
                            item.encode(entry, out)?;
                        }
                    }
                    Some(other) => {
                        return Err(Error::WrongKind {
                            field: (*name).to_string(),
                            expected: "items",
                            actual: other.kind_name(),
                        })
                    }
                    None => {}
                },
            }
        }
        Ok(())
    }

    /// Decode a slice bounded to exactly this structure's byte region.
    /// Returns the populated data and the number of bytes consumed.
    pub fn decode(&self, src: &[u8]) -> Result<(DataMap, usize)> {
        let mut data = DataMap::new();
        let mut cursor = 0usize;
        self.decode_walk(src, &mut cursor, &mut data)?;
        Ok((data, cursor))
    }

    fn decode_walk(&self, src: &[u8], cursor: &mut usize, data: &mut DataMap) -> Result<()> {
        for (name, node) in &self.entries {
            match node {
                SchemaNode::Scalar(field) => {
                    if src.len() < *cursor + field.width {
                        return Err(Error::BufferTooSmall {
                            needed: *cursor + field.width,
                            have: src.len(),
                        });
                    }
                    let value = field.decode(&src[*cursor..*cursor + field.width])?;
                    *cursor += field.width;
                    data.insert(name, DataValue::Scalar(value));
                }
                SchemaNode::Object(schema) => {
                    let mut nested = DataMap::new();
                    schema.decode_walk(src, cursor, &mut nested)?;
                    data.insert(name, DataValue::Object(nested));
                }
                SchemaNode::Repeated(item) => {
                    let width = item.fixed_width();
                    let mut items = Vec::new();
                    while *cursor < src.len() {
                        if src.len() < *cursor + width {
                            return Err(Error::Decode(format!(
                                "repeated group {name}: {} trailing byte(s) do not fit an item of {width}",
                                src.len() - *cursor
                            )));
                        }
                        let mut entry = DataMap::new();
                        item.decode_walk(src, cursor, &mut entry)?;
                        items.push(entry);
                    }
                    data.insert(name, DataValue::Items(items));
                }
            }
        }
        Ok(())
    }
}

/// One value slot in structure data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataValue {
    Scalar(FieldValue),
    Object(DataMap),
    Items(Vec<DataMap>),
}

impl DataValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            DataValue::Scalar(_) => "scalar",
            DataValue::Object(_) => "object",
            DataValue::Items(_) => "items",
        }
    }
}

/// Field name to value mapping for one structure instance
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct DataMap {
    values: BTreeMap<String, DataValue>,
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&DataValue> {
        self.values.get(name)
    }

    pub fn insert(&mut self, name: &str, value: DataValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn set_uint(&mut self, name: &str, value: u64) {
        self.insert(name, DataValue::Scalar(FieldValue::Uint(value)));
    }

    pub fn set_text(&mut self, name: &str, value: &str) {
        self.insert(name, DataValue::Scalar(FieldValue::Text(value.to_string())));
    }

    pub fn uint(&self, name: &str) -> Result<u64> {
        match self.get(name) {
            Some(DataValue::Scalar(FieldValue::Uint(v))) => Ok(*v),
            Some(other) => Err(Error::WrongKind {
                field: name.to_string(),
                expected: "uint",
                actual: other.kind_name(),
            }),
            None => Err(Error::MissingField(name.to_string())),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str> {
        match self.get(name) {
            Some(DataValue::Scalar(FieldValue::Text(v))) => Ok(v),
            Some(other) => Err(Error::WrongKind {
                field: name.to_string(),
                expected: "text",
                actual: other.kind_name(),
            }),
            None => Err(Error::MissingField(name.to_string())),
        }
    }

    pub fn items(&self, name: &str) -> Option<&[DataMap]> {
        match self.get(name) {
            Some(DataValue::Items(items)) => Some(items),
            _ => None,
        }
    }

    pub fn push_item(&mut self, name: &str, item: DataMap) {
        match self.values.get_mut(name) {
            Some(DataValue::Items(items)) => items.push(item),
            _ => {
                self.insert(name, DataValue::Items(vec![item]));
            }
        }
    }
}
