//! UDP transport implementation
//!
//! One socket per device, bound to a configured local address. Discovery
//! uses a multicast group join on the same socket; replies always go out
//! unicast via `send_to`.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::request::{Request, UdpResponse};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Multicast TTL for discovery datagrams
const MULTICAST_TTL: u32 = 128;

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Maximum datagram size
    pub max_packet_size: usize,
    /// Receiver channel depth
    pub channel_buffer_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 65507,
            channel_buffer_size: 100,
        }
    }
}

/// UDP transport (connectionless)
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default()).await
    }

    /// Bind with config
    pub async fn bind_with_config(addr: &str, config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        info!("UDP bound to {}", socket.local_addr()?);

        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// Join a discovery multicast group: enables broadcast, raises the
    /// multicast TTL, and adds group membership on all interfaces.
    pub fn join_multicast(&self, group: Ipv4Addr) -> Result<()> {
        self.socket.set_broadcast(true)?;
        self.socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
        self.socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        info!("joined multicast group {}", group);
        Ok(())
    }

    /// Send to a specific address
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    /// Create a sender bound to a specific remote address
    pub fn sender_to(&self, remote: SocketAddr) -> UdpSender {
        UdpSender {
            socket: self.socket.clone(),
            remote,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Build the one-shot reply handle for an inbound request, targeting the
    /// request's source address unless overridden.
    pub fn responder(&self, request: &Request) -> UdpResponse {
        UdpResponse::new(self.socket.clone(), request.remote())
    }

    /// Start receiving datagrams on a spawned task
    pub fn start_receiver(&self) -> UdpReceiver {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let socket = self.socket.clone();
        let max_size = self.config.max_packet_size;

        tokio::spawn(async move {
            let mut buf = vec![0u8; max_size];

            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => {
                        debug!("UDP received {} bytes from {}", len, from);
                        let data = Bytes::copy_from_slice(&buf[..len]);
                        if tx.send((TransportEvent::Data(data), from)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("UDP receive error: {}", e);
                        if tx
                            .send((
                                TransportEvent::Error(e.to_string()),
                                SocketAddr::from(([0, 0, 0, 0], 0)),
                            ))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        UdpReceiver { rx }
    }
}

/// UDP sender (to a specific remote)
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }
        self.socket
            .send_to(&data, self.remote)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// UDP receiver
pub struct UdpReceiver {
    rx: mpsc::Receiver<(TransportEvent, SocketAddr)>,
}

impl UdpReceiver {
    /// Receive the next event with source address
    pub async fn recv_from(&mut self) -> Option<(TransportEvent, SocketAddr)> {
        self.rx.recv().await
    }
}

#[async_trait]
impl TransportReceiver for UdpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await.map(|(event, _)| event)
    }
}
