//! Scalar field codecs
//!
//! Every wire value in a KNXnet/IP structure is one of three scalar shapes:
//! a fixed-width big-endian unsigned integer, a dot-separated byte tuple
//! (IP/MAC/serial addresses, individual addresses), or fixed-length text
//! padded with zero bytes. A [`Field`] pairs one of those codecs with a name
//! and a declared byte width; encode output is always exactly that wide.

use bytes::{BufMut, BytesMut};
use serde::Serialize;

use crate::error::{Error, Result};

/// A decoded scalar value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Uint(u64),
    Text(String),
}

impl FieldValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            FieldValue::Uint(_) => "uint",
            FieldValue::Text(_) => "text",
        }
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Uint(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

/// Which scalar codec a field uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Big-endian unsigned integer, 1-2 bytes on this protocol
    Uint,
    /// One decimal token per byte, joined with `.` (e.g. "192.168.1.1")
    DotBytes,
    /// Zero-padded text, zero bytes stripped on decode
    Text,
}

/// A named scalar codec with a fixed byte width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub width: usize,
}

impl Field {
    pub const fn uint(name: &'static str, width: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Uint,
            width,
        }
    }

    pub const fn dot_bytes(name: &'static str, width: usize) -> Self {
        Self {
            name,
            kind: FieldKind::DotBytes,
            width,
        }
    }

    pub const fn text(name: &'static str, width: usize) -> Self {
        Self {
            name,
            kind: FieldKind::Text,
            width,
        }
    }

    /// Decode exactly `self.width` bytes into a value. A longer slice is a
    /// caller bug, silently truncating it would hide a misaligned layout.
    pub fn decode(&self, raw: &[u8]) -> Result<FieldValue> {
        if raw.len() < self.width {
            return Err(Error::BufferTooSmall {
                needed: self.width,
                have: raw.len(),
            });
        }
        if raw.len() > self.width {
            return Err(Error::InvalidValue {
                field: self.name.to_string(),
                reason: format!("got {} bytes, field is {} wide", raw.len(), self.width),
            });
        }
        match self.kind {
            FieldKind::Uint => {
                let value = raw.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
                Ok(FieldValue::Uint(value))
            }
            FieldKind::DotBytes => {
                let tokens: Vec<String> = raw.iter().map(|b| b.to_string()).collect();
                Ok(FieldValue::Text(tokens.join(".")))
            }
            FieldKind::Text => {
                let trimmed: Vec<u8> = raw.iter().copied().filter(|b| *b != 0).collect();
                let text = String::from_utf8(trimmed).map_err(|e| Error::InvalidValue {
                    field: self.name.to_string(),
                    reason: format!("not valid UTF-8: {e}"),
                })?;
                Ok(FieldValue::Text(text))
            }
        }
    }

    /// Encode a value into exactly `self.width` bytes appended to `out`.
    pub fn encode(&self, value: &FieldValue, out: &mut BytesMut) -> Result<()> {
        match (self.kind, value) {
            (FieldKind::Uint, FieldValue::Uint(v)) => {
                if self.width < 8 && *v >= 1u64 << (8 * self.width) {
                    return Err(Error::ValueTooWide {
                        field: self.name.to_string(),
                        value: *v,
                        width: self.width,
                    });
                }
                for i in (0..self.width).rev() {
                    out.put_u8((v >> (8 * i)) as u8);
                }
                Ok(())
            }
            (FieldKind::DotBytes, FieldValue::Text(text)) => {
                let mut bytes = Vec::with_capacity(self.width);
                for token in text.split('.') {
                    let byte: u8 = token.parse().map_err(|_| Error::InvalidValue {
                        field: self.name.to_string(),
                        reason: format!("token {token:?} is not a byte"),
                    })?;
                    bytes.push(byte);
                }
                // A short address would shift every following field, so the
                // token count must match the declared width exactly.
                if bytes.len() != self.width {
                    return Err(Error::InvalidValue {
                        field: self.name.to_string(),
                        reason: format!("expected {} dot-separated bytes, got {}", self.width, bytes.len()),
                    });
                }
                out.put_slice(&bytes);
                Ok(())
            }
            (FieldKind::Text, FieldValue::Text(text)) => {
                let bytes = text.as_bytes();
                if bytes.len() > self.width {
                    return Err(Error::InvalidValue {
                        field: self.name.to_string(),
                        reason: format!("text is {} bytes, field holds {}", bytes.len(), self.width),
                    });
                }
                out.put_slice(bytes);
                out.put_bytes(0, self.width - bytes.len());
                Ok(())
            }
            (_, value) => Err(Error::WrongKind {
                field: self.name.to_string(),
                expected: match self.kind {
                    FieldKind::Uint => "uint",
                    FieldKind::DotBytes | FieldKind::Text => "text",
                },
                actual: value.kind_name(),
            }),
        }
    }

    /// Encode the all-zero placeholder used for fields with no data yet.
    pub fn encode_empty(&self, out: &mut BytesMut) {
        out.put_bytes(0, self.width);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(field: &Field, value: FieldValue) -> Result<Vec<u8>> {
        let mut out = BytesMut::new();
        field.encode(&value, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn test_uint_roundtrip() {
        let field = Field::uint("TotalLength", 2);
        let encoded = encode(&field, FieldValue::Uint(0x020A)).unwrap();
        assert_eq!(encoded, vec![0x02, 0x0A]);
        assert_eq!(field.decode(&encoded).unwrap(), FieldValue::Uint(0x020A));
    }

    #[test]
    fn test_uint_left_pads() {
        let field = Field::uint("Port", 2);
        assert_eq!(encode(&field, FieldValue::Uint(8)).unwrap(), vec![0x00, 0x08]);
    }

    #[test]
    fn test_uint_too_wide() {
        let field = Field::uint("StructureLength", 1);
        assert!(matches!(
            encode(&field, FieldValue::Uint(256)),
            Err(Error::ValueTooWide { .. })
        ));
    }

    #[test]
    fn test_dot_bytes_roundtrip() {
        let field = Field::dot_bytes("IPAddress", 4);
        let encoded = encode(&field, FieldValue::Text("192.168.1.138".into())).unwrap();
        assert_eq!(encoded, vec![192, 168, 1, 138]);
        assert_eq!(
            field.decode(&encoded).unwrap(),
            FieldValue::Text("192.168.1.138".into())
        );
    }

    #[test]
    fn test_dot_bytes_serial_number() {
        let field = Field::dot_bytes("DeviceKnxSerialNumber", 6);
        let encoded = encode(&field, FieldValue::Text("0.250.0.0.0.1".into())).unwrap();
        assert_eq!(encoded, vec![0, 250, 0, 0, 0, 1]);
    }

    #[test]
    fn test_dot_bytes_rejects_short_input() {
        let field = Field::dot_bytes("IPAddress", 4);
        assert!(matches!(
            encode(&field, FieldValue::Text("192.168.1".into())),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_dot_bytes_rejects_non_byte_token() {
        let field = Field::dot_bytes("IPAddress", 4);
        assert!(encode(&field, FieldValue::Text("192.168.1.999".into())).is_err());
        assert!(encode(&field, FieldValue::Text("a.b.c.d".into())).is_err());
    }

    #[test]
    fn test_text_pads_and_trims() {
        let field = Field::text("DeviceFriendlyName", 30);
        let encoded = encode(&field, FieldValue::Text("SMARTHOMEKNX.DE".into())).unwrap();
        assert_eq!(encoded.len(), 30);
        assert_eq!(&encoded[..15], b"SMARTHOMEKNX.DE");
        assert!(encoded[15..].iter().all(|b| *b == 0));
        assert_eq!(
            field.decode(&encoded).unwrap(),
            FieldValue::Text("SMARTHOMEKNX.DE".into())
        );
    }

    #[test]
    fn test_text_too_long() {
        let field = Field::text("DeviceTypeName", 4);
        assert!(encode(&field, FieldValue::Text("N146B".into())).is_err());
    }

    #[test]
    fn test_kind_mismatch() {
        let field = Field::uint("Status", 1);
        assert!(matches!(
            encode(&field, FieldValue::Text("1".into())),
            Err(Error::WrongKind { .. })
        ));
    }

    #[test]
    fn test_decode_short_buffer() {
        let field = Field::uint("TotalLength", 2);
        assert!(matches!(
            field.decode(&[0x01]),
            Err(Error::BufferTooSmall { needed: 2, have: 1 })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_slice() {
        let field = Field::dot_bytes("IPAddress", 4);
        assert!(matches!(
            field.decode(&[192, 168, 1, 1, 99]),
            Err(Error::InvalidValue { .. })
        ));
        let field = Field::uint("Port", 2);
        assert!(field.decode(&[0x0E, 0x57, 0x00]).is_err());
        let field = Field::text("DeviceTypeName", 4);
        assert!(field.decode(b"N146B").is_err());
    }
}
