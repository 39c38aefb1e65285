//! KNXnet/IP Transport Layer
//!
//! This crate provides the transports the device layer runs on:
//! - UDP (discovery over multicast, unicast request/reply)
//! - TCP (stream connections to a gateway's control endpoint)
//!
//! Inbound traffic is wrapped in [`Request`] values carrying the sender's
//! address and a correlation id; replies go back through [`Response`]
//! handles bound to the transport that carried the request.

pub mod error;
pub mod request;
pub mod tcp;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use request::{Request, Response, TcpResponse, UdpResponse};
pub use tcp::{TcpConfig, TcpReceiver, TcpSender, TcpServer, TcpTransport};
pub use traits::{TransportEvent, TransportReceiver, TransportSender, TransportServer};
pub use udp::{UdpConfig, UdpReceiver, UdpSender, UdpTransport};
