//! TCP transport implementation
//!
//! Stream transport for connection requests to a discovered gateway.
//! KNXnet/IP needs no extra framing on TCP: every message starts with the
//! 6-byte header whose TotalLength field covers the whole message, so the
//! reader reassembles frames by peeking that field.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use knxnet_core::HEADER_SIZE;

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender, TransportServer};

/// Maximum message size; discovery/connection messages are tiny but leave
/// headroom for tunneling payloads.
const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default channel buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Maximum message size in bytes
    pub max_message_size: usize,
    /// Read buffer size
    pub read_buffer_size: usize,
    /// Keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_message_size: MAX_MESSAGE_SIZE,
            read_buffer_size: 8192,
            keepalive_secs: 30,
        }
    }
}

/// TCP transport
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Connect to a gateway's control endpoint
    pub async fn connect(&self, addr: &str) -> Result<(TcpSender, TcpReceiver)> {
        info!("Connecting to TCP: {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        if self.config.keepalive_secs > 0 {
            let socket = socket2::SockRef::from(&stream);
            let keepalive = socket2::TcpKeepalive::new()
                .with_time(std::time::Duration::from_secs(self.config.keepalive_secs));
            let _ = socket.set_tcp_keepalive(&keepalive);
        }

        let (sender, receiver) = spawn_io(stream, self.config.max_message_size);
        info!("TCP connected to {}", addr);
        Ok((sender, receiver))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_io(stream: TcpStream, max_size: usize) -> (TcpSender, TcpReceiver) {
    let connected = Arc::new(Mutex::new(true));
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
    let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

    let sender = TcpSender {
        tx: outgoing_tx,
        connected: connected.clone(),
    };
    let receiver = TcpReceiver { rx: incoming_rx };

    let connected_clone = connected;
    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        run_tcp_io_loop(reader, writer, outgoing_rx, incoming_tx, max_size, connected_clone).await;
    });

    (sender, receiver)
}

/// Pull one complete KNXnet/IP message off the front of `read_buf`, if the
/// header's TotalLength worth of bytes has arrived.
fn extract_frame(read_buf: &mut BytesMut, max_size: usize) -> std::result::Result<Option<Bytes>, String> {
    if read_buf.len() < HEADER_SIZE {
        return Ok(None);
    }
    let total = u16::from_be_bytes([read_buf[4], read_buf[5]]) as usize;
    if total < HEADER_SIZE {
        return Err(format!("declared total length {total} below header size"));
    }
    if total > max_size {
        return Err(format!("message too large: {total} > {max_size}"));
    }
    if read_buf.len() < total {
        return Ok(None);
    }
    Ok(Some(read_buf.split_to(total).freeze()))
}

/// Shared IO loop for TCP connections
async fn run_tcp_io_loop(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    max_size: usize,
    connected: Arc<Mutex<bool>>,
) {
    let mut read_buf = BytesMut::with_capacity(8192);

    loop {
        tokio::select! {
            Some(data) = outgoing_rx.recv() => {
                if let Err(e) = writer.write_all(&data).await {
                    error!("TCP write error: {}", e);
                    break;
                }
            }

            result = reader.read_buf(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("TCP connection closed");
                        let _ = incoming_tx.send(TransportEvent::Disconnected { reason: None }).await;
                        break;
                    }
                    Ok(_) => {
                        loop {
                            match extract_frame(&mut read_buf, max_size) {
                                Ok(Some(frame)) => {
                                    if incoming_tx.send(TransportEvent::Data(frame)).await.is_err() {
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(reason) => {
                                    error!("TCP framing error: {}", reason);
                                    let _ = incoming_tx.send(TransportEvent::Disconnected {
                                        reason: Some(reason)
                                    }).await;
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("TCP read error: {}", e);
                        let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        }
    }

    *connected.lock() = false;
}

/// TCP sender for writing messages
#[derive(Clone)]
pub struct TcpSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<Mutex<bool>>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !*self.connected.lock() {
            return Err(TransportError::NotConnected);
        }
        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::SendFailed("Channel closed".into()))
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        *self.connected.lock() = false;
        Ok(())
    }
}

/// TCP receiver for reading messages
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// TCP server for accepting connections
pub struct TcpServer {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpServer {
    /// Bind to an address and create a new TCP server
    pub async fn bind(addr: &str) -> Result<Self> {
        Self::bind_with_config(addr, TcpConfig::default()).await
    }

    /// Bind with custom configuration
    pub async fn bind_with_config(addr: &str, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        info!("TCP server listening on {}", addr);

        Ok(Self { listener, config })
    }
}

#[async_trait]
impl TransportServer for TcpServer {
    type Sender = TcpSender;
    type Receiver = TcpReceiver;

    async fn accept(&mut self) -> Result<(Self::Sender, Self::Receiver, SocketAddr)> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;

        info!("TCP connection accepted from {}", peer_addr);

        let (sender, receiver) = spawn_io(stream, self.config.max_message_size);
        Ok((sender, receiver, peer_addr))
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| TransportError::Other(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        // TcpListener closes when dropped
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[test]
    fn test_extract_frame_waits_for_full_message() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x06, 0x10, 0x02, 0x01, 0x00, 0x0E, 0x08, 0x01]);
        assert!(extract_frame(&mut buf, MAX_MESSAGE_SIZE).unwrap().is_none());

        buf.extend_from_slice(&[192, 168, 1, 138, 0x0E, 0x57]);
        let frame = extract_frame(&mut buf, MAX_MESSAGE_SIZE).unwrap().unwrap();
        assert_eq!(frame.len(), 14);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_extract_frame_splits_coalesced_messages() {
        let one: &[u8] = &[0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x22];
        let mut buf = BytesMut::new();
        buf.extend_from_slice(one);
        buf.extend_from_slice(one);

        let first = extract_frame(&mut buf, MAX_MESSAGE_SIZE).unwrap().unwrap();
        let second = extract_frame(&mut buf, MAX_MESSAGE_SIZE).unwrap().unwrap();
        assert_eq!(first, second);
        assert!(extract_frame(&mut buf, MAX_MESSAGE_SIZE).unwrap().is_none());
    }

    #[test]
    fn test_extract_frame_rejects_undersized_length() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0x06, 0x10, 0x02, 0x01, 0x00, 0x03]);
        assert!(extract_frame(&mut buf, MAX_MESSAGE_SIZE).is_err());
    }

    #[tokio::test]
    async fn test_tcp_client_server_echo() {
        let mut server = TcpServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        let accept_handle = tokio::spawn(async move {
            let (sender, mut receiver, _peer) = server.accept().await.unwrap();
            if let Some(TransportEvent::Data(data)) = receiver.recv().await {
                sender.send(data).await.unwrap();
            }
        });

        sleep(Duration::from_millis(50)).await;

        let transport = TcpTransport::new();
        let (client_sender, mut client_receiver) =
            transport.connect(&addr.to_string()).await.unwrap();

        let frame = Bytes::from_static(&[0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x00]);
        client_sender.send(frame.clone()).await.unwrap();

        match client_receiver.recv().await {
            Some(TransportEvent::Data(received)) => assert_eq!(received, frame),
            other => panic!("Expected Data event, got {other:?}"),
        }

        client_sender.close().await.unwrap();
        let _ = accept_handle.await;
    }
}
