//! TCP device
//!
//! Stream-side counterpart to the UDP device: a client that connects to a
//! remote control endpoint and writes encoded messages, and a listener that
//! accepts connections and runs each stream through its own dispatcher.
//! Frames are already reassembled by the transport, so inbound handling is
//! identical to the datagram path.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use knxnet_core::Message;
use knxnet_transport::{
    request::hex, Request, Response, TcpResponse, TcpSender, TcpServer, TcpTransport,
    TransportEvent, TransportReceiver, TransportSender, TransportServer,
};

use crate::dispatcher::Dispatcher;
use crate::error::{DeviceError, Result};
use crate::identity::DeviceIdentity;

/// TCP device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpDeviceSettings {
    /// Remote control endpoint for client connections
    #[serde(default)]
    pub remote: Option<EndpointConfig>,
    /// Local endpoint for the listening counterpart
    #[serde(default)]
    pub local: Option<EndpointConfig>,
    #[serde(default)]
    pub identity: DeviceIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointConfig {
    pub ip_address: String,
    pub port: u16,
}

impl EndpointConfig {
    pub fn to_string_addr(&self) -> String {
        format!("{}:{}", self.ip_address, self.port)
    }
}

struct TcpDeviceInner {
    id: String,
    settings: TcpDeviceSettings,
    dispatcher: Dispatcher,
    sender: Mutex<Option<TcpSender>>,
    peer: Mutex<Option<SocketAddr>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// A TCP network endpoint, client connect-then-write plus a listener
#[derive(Clone)]
pub struct TcpDevice {
    inner: Arc<TcpDeviceInner>,
}

impl TcpDevice {
    pub fn new(id: impl Into<String>, settings: TcpDeviceSettings) -> Self {
        Self {
            inner: Arc::new(TcpDeviceInner {
                id: id.into(),
                settings,
                dispatcher: Dispatcher::new(),
                sender: Mutex::new(None),
                peer: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .sender
            .lock()
            .as_ref()
            .map(|s| s.is_connected())
            .unwrap_or(false)
    }

    /// Connect to the configured remote control endpoint and start reading
    /// response frames into the dispatcher.
    pub async fn connect(&self) -> Result<()> {
        let remote = self
            .inner
            .settings
            .remote
            .clone()
            .ok_or_else(|| DeviceError::NoRemote(self.inner.id.clone()))?;

        let transport = TcpTransport::new();
        let (sender, mut receiver) = transport.connect(&remote.to_string_addr()).await?;
        let peer: SocketAddr = remote.to_string_addr().parse().map_err(|e| {
            DeviceError::InvalidAddress(remote.to_string_addr(), format!("{e}"))
        })?;

        *self.inner.sender.lock() = Some(sender.clone());
        *self.inner.peer.lock() = Some(peer);

        let dispatcher = self.inner.dispatcher.clone();
        let handle = tokio::spawn(async move {
            run_stream(&dispatcher, &mut receiver, sender, peer).await;
        });
        self.inner.tasks.lock().push(handle);

        info!("TCPDevice {} connected to {}", self.inner.id, peer);
        Ok(())
    }

    /// Write one encoded message to the connected stream. Fails when the
    /// socket was never connected or has closed.
    pub async fn write(&self, message: &mut Message) -> Result<()> {
        let sender = self
            .inner
            .sender
            .lock()
            .clone()
            .ok_or(DeviceError::NotListening)?;
        let buffer = message.to_buffer()?;
        sender.send(buffer.clone()).await?;
        info!(
            service_type = %message.service_type(),
            buffer = %hex(&buffer),
            "write completed"
        );
        Ok(())
    }

    /// Convenience for one-shot exchanges: connect, then write.
    pub async fn connect_write(&self, message: &mut Message) -> Result<()> {
        if !self.is_connected() {
            self.connect().await?;
        }
        self.write(message).await
    }

    /// Accept connections on the configured local endpoint, running every
    /// stream through this device's dispatcher.
    pub async fn listen(&self) -> Result<SocketAddr> {
        let local = self
            .inner
            .settings
            .local
            .clone()
            .ok_or_else(|| DeviceError::NoRemote(format!("{} (local)", self.inner.id)))?;

        let mut server = TcpServer::bind(&local.to_string_addr()).await?;
        let bound = server.local_addr()?;
        let dispatcher = self.inner.dispatcher.clone();
        let id = self.inner.id.clone();

        let handle = tokio::spawn(async move {
            loop {
                match server.accept().await {
                    Ok((sender, mut receiver, peer)) => {
                        info!("TCPDevice {} accepted connection from {}", id, peer);
                        let dispatcher = dispatcher.clone();
                        tokio::spawn(async move {
                            run_stream(&dispatcher, &mut receiver, sender, peer).await;
                        });
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                        break;
                    }
                }
            }
        });
        self.inner.tasks.lock().push(handle);

        info!("TCPDevice {} listening on {}", self.inner.id, bound);
        Ok(bound)
    }

    /// Close the connection and stop all spawned loops.
    pub async fn close(&self) {
        if let Some(sender) = self.inner.sender.lock().take() {
            let _ = sender.close().await;
        }
        for handle in self.inner.tasks.lock().drain(..) {
            handle.abort();
        }
        self.inner.dispatcher.clear();
        info!("TCPDevice {} closed", self.inner.id);
    }
}

/// Feed one stream's frames through the dispatcher until it disconnects.
async fn run_stream(
    dispatcher: &Dispatcher,
    receiver: &mut (impl TransportReceiver + Send),
    sender: TcpSender,
    peer: SocketAddr,
) {
    while let Some(event) = receiver.recv().await {
        match event {
            TransportEvent::Data(data) => {
                let request = Request::new(data, peer);
                let response = Response::Tcp(TcpResponse::new(sender.clone(), peer));
                dispatcher.dispatch(request, response).await;
            }
            TransportEvent::Disconnected { reason } => {
                info!(
                    "stream from {} closed{}",
                    peer,
                    reason.map(|r| format!(": {r}")).unwrap_or_default()
                );
                break;
            }
            TransportEvent::Error(e) => {
                warn!("stream error from {}: {}", peer, e);
            }
            TransportEvent::Connected => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Handler;
    use knxnet_core::{messages, ServiceType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn local_only() -> TcpDeviceSettings {
        TcpDeviceSettings {
            remote: None,
            local: Some(EndpointConfig {
                ip_address: "127.0.0.1".to_string(),
                port: 0,
            }),
            identity: DeviceIdentity::default(),
        }
    }

    #[tokio::test]
    async fn test_write_without_connect_fails() {
        let device = TcpDevice::new("tcp1", local_only());
        let mut message = messages::description_request();
        assert!(matches!(
            device.write(&mut message).await,
            Err(DeviceError::NotListening)
        ));
    }

    #[tokio::test]
    async fn test_connect_without_remote_fails() {
        let device = TcpDevice::new("tcp1", local_only());
        assert!(matches!(
            device.connect().await,
            Err(DeviceError::NoRemote(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_write_reaches_listener_dispatcher() {
        let listener = TcpDevice::new("srv", local_only());
        let (tx, mut rx) = mpsc::channel::<ServiceType>(4);
        let handler: Handler = Arc::new(move |request, _response| {
            let tx = tx.clone();
            Box::pin(async move {
                let _ = tx.send(request.service_type()).await;
            })
        });
        listener
            .dispatcher()
            .add_typed_callback(ServiceType::DescriptionRequest, handler)
            .unwrap();
        let bound = listener.listen().await.unwrap();

        let client = TcpDevice::new(
            "cli",
            TcpDeviceSettings {
                remote: Some(EndpointConfig {
                    ip_address: "127.0.0.1".to_string(),
                    port: bound.port(),
                }),
                local: None,
                identity: DeviceIdentity::default(),
            },
        );
        let mut message = messages::description_request();
        messages::set_endpoint(&mut message, "hpai", "127.0.0.1", 0);
        client.connect_write(&mut message).await.unwrap();

        let seen = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, ServiceType::DescriptionRequest);

        client.close().await;
        listener.close().await;
    }

    #[tokio::test]
    async fn test_listener_counts_coalesced_frames_separately() {
        let listener = TcpDevice::new("srv", local_only());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let handler: Handler = Arc::new(move |_request, _response| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        listener.dispatcher().add_all_callback(handler).unwrap();
        let bound = listener.listen().await.unwrap();

        // two messages in one connect_write burst must dispatch twice
        let client = TcpDevice::new(
            "cli",
            TcpDeviceSettings {
                remote: Some(EndpointConfig {
                    ip_address: "127.0.0.1".to_string(),
                    port: bound.port(),
                }),
                local: None,
                identity: DeviceIdentity::default(),
            },
        );
        let mut first = messages::description_request();
        messages::set_endpoint(&mut first, "hpai", "127.0.0.1", 0);
        client.connect_write(&mut first).await.unwrap();
        let mut second = messages::search_request();
        messages::set_endpoint(&mut second, "hpai", "127.0.0.1", 0);
        client.write(&mut second).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while hits.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        client.close().await;
        listener.close().await;
    }
}
