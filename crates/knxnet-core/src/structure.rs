//! Named message structures
//!
//! A [`Structure`] is one self-describing chunk of a wire message: the
//! header, an HPAI, a DIB, a connection block. It pairs a schema with the
//! data decoded from or destined for the wire. Fixed-layout structures
//! (header, HPAI, connection base) declare a constant size; everything else
//! derives its size from the data. A raw structure is an opaque byte tail
//! with no schema at all, used to keep trailing DIBs a decoder does not
//! interpret.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::schema::{DataMap, Schema};

const STRUCTURE_LENGTH: &str = "StructureLength";

#[derive(Debug, Clone)]
pub struct Structure {
    name: &'static str,
    id: &'static str,
    schema: Arc<Schema>,
    fixed_size: Option<usize>,
    raw: Option<Bytes>,
    data: DataMap,
}

impl Structure {
    pub fn new(name: &'static str, id: &'static str, schema: Schema) -> Self {
        Self {
            name,
            id,
            schema: Arc::new(schema),
            fixed_size: None,
            raw: None,
            data: DataMap::new(),
        }
    }

    /// A structure whose layout never varies; `size` overrides the computed
    /// buffer size.
    pub fn with_fixed_size(mut self, size: usize) -> Self {
        self.fixed_size = Some(size);
        self
    }

    /// An opaque byte tail. Consumes whatever the caller hands it and plays
    /// it back verbatim on encode.
    pub fn raw(name: &'static str, id: &'static str) -> Self {
        Self {
            name,
            id,
            schema: Arc::new(Schema::new()),
            fixed_size: None,
            raw: Some(Bytes::new()),
            data: DataMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn data(&self) -> &DataMap {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut DataMap {
        &mut self.data
    }

    pub fn raw_bytes(&self) -> Option<&Bytes> {
        self.raw.as_ref()
    }

    pub fn set_raw_bytes(&mut self, bytes: Bytes) {
        self.raw = Some(bytes);
    }

    /// Byte size this structure occupies on the wire, always recomputable
    /// from the current data.
    pub fn buffer_size(&self) -> usize {
        if let Some(raw) = &self.raw {
            return raw.len();
        }
        match self.fixed_size {
            Some(size) => size,
            None => self.schema.byte_size(&self.data),
        }
    }

    /// Serialize to exactly `buffer_size()` bytes. Writes the computed size
    /// into the `StructureLength` field first when the schema carries one.
    pub fn to_buffer(&mut self) -> Result<Bytes> {
        if let Some(raw) = &self.raw {
            return Ok(raw.clone());
        }
        let size = self.buffer_size();
        if self.schema.contains(STRUCTURE_LENGTH) {
            self.data.set_uint(STRUCTURE_LENGTH, size as u64);
        }
        let mut out = BytesMut::with_capacity(size);
        self.schema.encode(&self.data, &mut out)?;
        if out.len() != size {
            return Err(Error::Decode(format!(
                "structure {} produced {} bytes, layout says {}",
                self.name,
                out.len(),
                size
            )));
        }
        Ok(out.freeze())
    }

    /// Replace the data by decoding `source`, which must be bounded to this
    /// structure's byte region. Returns the bytes consumed.
    pub fn from_buffer(&mut self, source: &[u8]) -> Result<usize> {
        if self.raw.is_some() {
            self.raw = Some(Bytes::copy_from_slice(source));
            return Ok(source.len());
        }
        let (data, consumed) = self.schema.decode(source)?;
        self.data = data;
        Ok(consumed)
    }

    /// Debug projection of the data.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        if let Some(raw) = &self.raw {
            let hex: String = raw.iter().map(|b| format!("{b:02x}")).collect();
            return Ok(serde_json::json!({ "buffer": hex }));
        }
        Ok(serde_json::to_value(&self.data)?)
    }

    // Scalar accessors, delegating to the data map.

    pub fn uint(&self, field: &str) -> Result<u64> {
        self.data.uint(field)
    }

    pub fn text(&self, field: &str) -> Result<&str> {
        self.data.text(field)
    }

    pub fn set_uint(&mut self, field: &str, value: u64) {
        self.data.set_uint(field, value);
    }

    pub fn set_text(&mut self, field: &str, value: &str) {
        self.data.set_text(field, value);
    }
}
