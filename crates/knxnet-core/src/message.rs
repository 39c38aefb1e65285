//! Wire messages
//!
//! A [`Message`] is an ordered sequence of structures, header first. The
//! header must declare the total message length including itself yet appears
//! first on the wire, so encoding is two-pass: serialize the payload
//! structures, write the summed size into the header, then serialize the
//! header and concatenate.

use bytes::{Bytes, BytesMut};
use serde_json::json;

use crate::error::{Error, Result};
use crate::protocol::ServiceType;
use crate::structure::Structure;
use crate::structures;

#[derive(Debug, Clone)]
pub struct Message {
    service_type: ServiceType,
    structures: Vec<Structure>,
}

impl Message {
    /// A message holding only its header, stamped with `service_type`.
    /// Concrete constructors in [`crate::messages`] push the body structures.
    pub fn new(service_type: ServiceType) -> Self {
        let mut header = structures::header();
        header.set_uint("ServiceType", service_type.code() as u64);
        Self {
            service_type,
            structures: vec![header],
        }
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    pub fn push(&mut self, structure: Structure) {
        self.structures.push(structure);
    }

    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    pub fn header(&self) -> &Structure {
        &self.structures[0]
    }

    /// Look up a structure by its id, e.g. `"hpai"` or `"dib_hardware"`.
    pub fn structure(&self, id: &str) -> Option<&Structure> {
        self.structures.iter().find(|s| s.id() == id)
    }

    pub fn structure_mut(&mut self, id: &str) -> Option<&mut Structure> {
        self.structures.iter_mut().find(|s| s.id() == id)
    }

    /// Total byte size of the serialized message.
    pub fn buffer_size(&self) -> usize {
        self.structures.iter().map(Structure::buffer_size).sum()
    }

    /// Serialize all structures, fixing up the header's total length first.
    pub fn to_buffer(&mut self) -> Result<Bytes> {
        let mut payloads = Vec::with_capacity(self.structures.len() - 1);
        let mut total = self.structures[0].buffer_size();
        for structure in self.structures.iter_mut().skip(1) {
            let buffer = structure.to_buffer()?;
            total += buffer.len();
            payloads.push(buffer);
        }

        let header = &mut self.structures[0];
        header.set_uint("ServiceType", self.service_type.code() as u64);
        header.set_uint("TotalLength", total as u64);

        let mut out = BytesMut::with_capacity(total);
        out.extend_from_slice(&header.to_buffer()?);
        for payload in payloads {
            out.extend_from_slice(&payload);
        }
        Ok(out.freeze())
    }

    /// Decode structures in order, each consuming exactly its own byte
    /// region. Decoding stops once the buffer is exhausted, so messages whose
    /// trailing structures are optional (an error-status ConnectResponse is
    /// just header plus base block) decode without them. Returns the bytes
    /// consumed; trailing bytes beyond the last structure are ignored unless
    /// a raw tail structure captures them.
    pub fn from_buffer(&mut self, buffer: &[u8]) -> Result<usize> {
        let mut cursor = 0usize;
        for structure in self.structures.iter_mut() {
            if cursor >= buffer.len() {
                break;
            }
            if structure.is_raw() {
                cursor += structure.from_buffer(&buffer[cursor..])?;
                continue;
            }
            let size = structure.buffer_size();
            if buffer.len() < cursor + size {
                return Err(Error::BufferTooSmall {
                    needed: cursor + size,
                    have: buffer.len(),
                });
            }
            structure.from_buffer(&buffer[cursor..cursor + size])?;
            cursor += size;
        }
        Ok(cursor)
    }

    /// Debug projection; not used for wire compatibility.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut structures = serde_json::Map::new();
        for structure in &self.structures {
            structures.insert(structure.id().to_string(), structure.to_json()?);
        }
        Ok(json!({
            "serviceType": self.service_type.name(),
            "structures": structures,
        }))
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_json()?)?)
    }
}
