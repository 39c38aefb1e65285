//! Error types for the KNXnet/IP codec

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// KNXnet/IP codec error types
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer shorter than the region a structure or field needs
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    /// Integer value does not fit the field's declared byte width
    #[error("value {value} does not fit {width} byte(s) for field {field}")]
    ValueTooWide {
        field: String,
        value: u64,
        width: usize,
    },

    /// Field value rejected by its codec (bad dot-byte token, oversized text)
    #[error("invalid value for field {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Field not present in the structure data
    #[error("missing field: {0}")]
    MissingField(String),

    /// Field holds a different kind of value than the accessor expects
    #[error("field {field} holds {actual}, expected {expected}")]
    WrongKind {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Generic decode error
    #[error("decode error: {0}")]
    Decode(String),

    /// Debug projection (JSON/YAML) failed
    #[error("projection error: {0}")]
    Projection(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Projection(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Projection(e.to_string())
    }
}
