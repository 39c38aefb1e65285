//! Transport traits
//!
//! Common interface over the UDP and TCP transports so the device layer can
//! drive either without caring which one carries the bytes.

use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;

use crate::error::Result;

/// Events emitted by a transport receiver
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connection established (stream transports only)
    Connected,
    /// Connection closed
    Disconnected { reason: Option<String> },
    /// One complete protocol frame
    Data(Bytes),
    /// Transport-level error
    Error(String),
}

/// Sending side of a transport
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one encoded message
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Check if the transport is still usable
    fn is_connected(&self) -> bool;

    /// Close the transport
    async fn close(&self) -> Result<()>;
}

/// Receiving side of a transport
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event, `None` when the transport is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Listening side of a stream transport
#[async_trait]
pub trait TransportServer: Send {
    type Sender: TransportSender;
    type Receiver: TransportReceiver;

    /// Accept the next inbound connection
    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)>;

    /// Local listening address
    fn local_addr(&self) -> Result<SocketAddr>;

    /// Stop listening
    async fn close(&self) -> Result<()>;
}
