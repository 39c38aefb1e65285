//! Inbound request and reply wrappers
//!
//! Every inbound datagram or stream frame is wrapped in a [`Request`] pairing
//! the raw bytes with the sender's address and a fresh correlation id for
//! logging. Identification decodes only the 6-byte header; garbage on the
//! discovery port is expected (the multicast group is unauthenticated), so a
//! buffer that fails to identify yields the `Undefined` sentinel instead of
//! an error.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use uuid::Uuid;

use knxnet_core::{structures, Message, ServiceType};

use crate::error::{Result, TransportError};
use crate::tcp::TcpSender;
use crate::traits::TransportSender;

/// Hex dump helper for forensic logging of raw buffers.
pub fn hex(buffer: &[u8]) -> String {
    buffer.iter().map(|b| format!("{b:02x}")).collect()
}

/// One inbound message with its addressing and correlation id
#[derive(Debug, Clone)]
pub struct Request {
    id: Uuid,
    data: Bytes,
    remote: SocketAddr,
    service_type: ServiceType,
}

impl Request {
    pub fn new(data: Bytes, remote: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            remote,
            service_type: ServiceType::Undefined,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn service_type(&self) -> ServiceType {
        self.service_type
    }

    /// Decode the header and record the service type. Malformed input is a
    /// local recovery, never an error: the buffer stays routable as
    /// `Undefined` and the raw bytes are logged for forensics.
    pub fn identify(&mut self) -> ServiceType {
        let mut header = structures::header();
        match header.from_buffer(&self.data) {
            Ok(_) => {
                let code = header.uint("ServiceType").unwrap_or(0);
                self.service_type = ServiceType::from_code(code as u16);
                debug!(
                    message_id = %self.id,
                    source = %self.remote,
                    service_type = %self.service_type,
                    "identified inbound message"
                );
            }
            Err(e) => {
                warn!(
                    message_id = %self.id,
                    source = %self.remote,
                    buffer = %hex(&self.data),
                    "can't identify message, using {}: {}",
                    ServiceType::Undefined,
                    e
                );
                self.service_type = ServiceType::Undefined;
            }
        }
        self.service_type
    }
}

/// One-shot UDP reply bound to its originating request
#[derive(Clone)]
pub struct UdpResponse {
    socket: Arc<UdpSocket>,
    target: SocketAddr,
}

impl UdpResponse {
    pub fn new(socket: Arc<UdpSocket>, target: SocketAddr) -> Self {
        Self { socket, target }
    }

    /// Redirect the reply somewhere other than the request origin.
    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Encode and send one reply datagram to the target.
    pub async fn send(&self, message: &mut Message) -> Result<()> {
        let buffer = message.to_buffer()?;
        self.socket
            .send_to(&buffer, self.target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        info!(
            target = %self.target,
            service_type = %message.service_type(),
            buffer = %hex(&buffer),
            "sent message"
        );
        if let Ok(yaml) = message.to_yaml() {
            debug!("outgoing message:\n{}", yaml);
        }
        Ok(())
    }
}

/// Reply handle writing to an already-open TCP stream
#[derive(Clone)]
pub struct TcpResponse {
    sender: TcpSender,
    peer: SocketAddr,
}

impl TcpResponse {
    pub fn new(sender: TcpSender, peer: SocketAddr) -> Self {
        Self { sender, peer }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Encode and write one reply to the stream.
    pub async fn send(&self, message: &mut Message) -> Result<()> {
        let buffer = message.to_buffer()?;
        self.sender.send(buffer.clone()).await?;
        info!(
            target = %self.peer,
            service_type = %message.service_type(),
            buffer = %hex(&buffer),
            "wrote message"
        );
        Ok(())
    }
}

/// Reply handle over whichever transport carried the request
#[derive(Clone)]
pub enum Response {
    Udp(UdpResponse),
    Tcp(TcpResponse),
}

impl Response {
    pub async fn send(&self, message: &mut Message) -> Result<()> {
        match self {
            Response::Udp(response) => response.send(message).await,
            Response::Tcp(response) => response.send(message).await,
        }
    }

    pub fn target(&self) -> SocketAddr {
        match self {
            Response::Udp(response) => response.target(),
            Response::Tcp(response) => response.peer(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knxnet_core::messages;

    fn remote() -> SocketAddr {
        "192.168.1.50:3671".parse().unwrap()
    }

    #[test]
    fn test_identify_search_request() {
        let mut message = messages::search_request();
        messages::set_endpoint(&mut message, "hpai", "192.168.1.50", 3671);
        let buffer = message.to_buffer().unwrap();

        let mut request = Request::new(buffer, remote());
        assert_eq!(request.service_type(), ServiceType::Undefined);
        assert_eq!(request.identify(), ServiceType::SearchRequest);
        assert_eq!(request.service_type(), ServiceType::SearchRequest);
    }

    #[test]
    fn test_identify_malformed_buffer_is_undefined() {
        let mut request = Request::new(Bytes::from_static(&[0x06, 0x10, 0x02]), remote());
        assert_eq!(request.identify(), ServiceType::Undefined);
    }

    #[test]
    fn test_identify_unknown_service_code() {
        let mut request = Request::new(
            Bytes::from_static(&[0x06, 0x10, 0xBE, 0xEF, 0x00, 0x06]),
            remote(),
        );
        assert_eq!(request.identify(), ServiceType::Undefined);
    }

    #[test]
    fn test_requests_get_unique_ids() {
        let a = Request::new(Bytes::new(), remote());
        let b = Request::new(Bytes::new(), remote());
        assert_ne!(a.id(), b.id());
    }
}
