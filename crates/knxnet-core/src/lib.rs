//! KNXnet/IP Core
//!
//! Structure and message codec for the KNXnet/IP discovery and connection
//! services.
//!
//! This crate provides:
//! - Scalar field codecs ([`Field`], [`FieldValue`])
//! - Declarative structure schemas ([`Schema`], [`schema::SchemaNode`])
//! - Wire structures and messages ([`Structure`], [`Message`])
//! - Protocol constants ([`ServiceType`], [`protocol`])

pub mod error;
pub mod field;
pub mod message;
pub mod messages;
pub mod protocol;
pub mod schema;
pub mod structure;
pub mod structures;

pub use error::{Error, Result};
pub use field::{Field, FieldValue};
pub use message::Message;
pub use protocol::{ConnectStatus, HostProtocol, ServiceFamily, ServiceType};
pub use schema::{DataMap, DataValue, Schema};
pub use structure::Structure;

pub use protocol::{DEFAULT_PORT, HEADER_SIZE, MULTICAST_ADDRESS, PROTOCOL_VERSION};
