//! UDP device
//!
//! One device owns one socket and one dispatcher. Client-role devices drive
//! the discovery flow (search over multicast, description and connect over
//! unicast) and track at most one outstanding search; server-role devices
//! answer SearchRequests with their own identity.
//!
//! The search timer never cancels anything. Each trigger bumps a generation
//! counter and the deferred reset only clears pending state while its
//! captured generation is still current, so a second search issued before
//! the first timer fires cannot be stale-cleared.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use knxnet_core::{messages, ConnectStatus, Message, ServiceType};
use knxnet_transport::{
    request::hex, Request, Response, TransportEvent, UdpTransport,
};

use crate::dispatcher::{Dispatcher, Handler};
use crate::error::{DeviceError, Result};
use crate::identity::DeviceIdentity;

const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which default callbacks `start_listener` registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    /// Drives search/description/connect, handles the responses
    Client,
    /// Discoverable endpoint, handles SearchRequests
    Server,
}

/// Multicast group settings for discovery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MulticastConfig {
    pub ip_address: String,
    pub port: u16,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            ip_address: knxnet_core::MULTICAST_ADDRESS.to_string(),
            port: knxnet_core::DEFAULT_PORT,
        }
    }
}

/// UDP device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpDeviceSettings {
    pub ip_address: String,
    pub port: u16,
    #[serde(default)]
    pub multicast: Option<MulticastConfig>,
    /// Window for accepting search responses, milliseconds
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    #[serde(default)]
    pub identity: DeviceIdentity,
}

fn default_search_timeout_ms() -> u64 {
    DEFAULT_SEARCH_TIMEOUT.as_millis() as u64
}

impl UdpDeviceSettings {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }
}

/// Outcome of a connect exchange. A non-success status is data, not an
/// error; the wire-level reason is available for logging and decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOutcome {
    pub channel_id: u8,
    pub status: u8,
}

impl ConnectOutcome {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn reason(&self) -> &'static str {
        ConnectStatus::from_code(self.status)
            .map(|s| s.describe())
            .unwrap_or("unknown status code")
    }
}

/// Business-level callback invoked after a response is decoded
pub type MessageCallback = Arc<dyn Fn(Request, Response, Message) + Send + Sync>;

/// At-most-one-outstanding-search state with a generation guard
#[derive(Debug, Default)]
struct PendingSearch {
    since: Option<Instant>,
    generation: u64,
}

impl PendingSearch {
    /// Mark a new search pending, returning the generation the deferred
    /// reset must match.
    fn begin(&mut self) -> u64 {
        self.since = Some(Instant::now());
        self.generation += 1;
        self.generation
    }

    /// Clear pending state only if no newer search has superseded the one
    /// that scheduled this reset.
    fn clear_if_current(&mut self, generation: u64) -> bool {
        if self.generation == generation {
            self.since = None;
            true
        } else {
            false
        }
    }

    /// Elapsed time since the pending search, `None` when nothing pends.
    fn elapsed(&self) -> Option<Duration> {
        self.since.map(|since| since.elapsed())
    }
}

struct DeviceInner {
    id: String,
    settings: UdpDeviceSettings,
    role: DeviceRole,
    dispatcher: Dispatcher,
    transport: Mutex<Option<Arc<UdpTransport>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    pending_search: Mutex<PendingSearch>,
    pending_connects: DashMap<SocketAddr, oneshot::Sender<ConnectOutcome>>,
    search_response_callback: Mutex<Option<MessageCallback>>,
    description_response_callback: Mutex<Option<MessageCallback>>,
    connection_response_callback: Mutex<Option<MessageCallback>>,
}

/// A UDP network endpoint with protocol-level discovery operations
#[derive(Clone)]
pub struct UdpDevice {
    inner: Arc<DeviceInner>,
}

impl UdpDevice {
    pub fn new(id: impl Into<String>, settings: UdpDeviceSettings, role: DeviceRole) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                id: id.into(),
                settings,
                role,
                dispatcher: Dispatcher::new(),
                transport: Mutex::new(None),
                listener: Mutex::new(None),
                pending_search: Mutex::new(PendingSearch::default()),
                pending_connects: DashMap::new(),
                search_response_callback: Mutex::new(None),
                description_response_callback: Mutex::new(None),
                connection_response_callback: Mutex::new(None),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn settings(&self) -> &UdpDeviceSettings {
        &self.inner.settings
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    pub fn set_search_response_callback(&self, callback: MessageCallback) {
        *self.inner.search_response_callback.lock() = Some(callback);
    }

    pub fn set_description_response_callback(&self, callback: MessageCallback) {
        *self.inner.description_response_callback.lock() = Some(callback);
    }

    pub fn set_connection_response_callback(&self, callback: MessageCallback) {
        *self.inner.connection_response_callback.lock() = Some(callback);
    }

    /// Register the role's default callbacks, bind the socket, join the
    /// multicast group when configured, and start the receive loop. A bind
    /// failure propagates; no partial-listening state remains.
    pub async fn start_listener(&self) -> Result<()> {
        match self.inner.role {
            DeviceRole::Client => {
                self.register(ServiceType::SearchResponse, Self::handle_search_response)?;
                self.register(
                    ServiceType::DescriptionResponse,
                    Self::handle_description_response,
                )?;
                self.register(
                    ServiceType::ConnectResponse,
                    Self::handle_connection_response,
                )?;
            }
            DeviceRole::Server => {
                self.register(ServiceType::SearchRequest, Self::handle_search_request)?;
            }
        }

        let settings = &self.inner.settings;
        let bind_addr = format!("{}:{}", settings.ip_address, settings.port);
        let transport = Arc::new(UdpTransport::bind(&bind_addr).await?);

        if let Some(multicast) = &settings.multicast {
            let group: Ipv4Addr = multicast.ip_address.parse().map_err(|e| {
                DeviceError::InvalidAddress(multicast.ip_address.clone(), format!("{e}"))
            })?;
            transport.join_multicast(group)?;
            info!(
                "UDPDevice {} membership for multicasts at {}",
                self.inner.id, multicast.ip_address
            );
        }

        let local = transport.local_addr()?;
        *self.inner.transport.lock() = Some(transport.clone());

        let mut receiver = transport.start_receiver();
        let dispatcher = self.inner.dispatcher.clone();
        let handle = tokio::spawn(async move {
            while let Some((event, from)) = receiver.recv_from().await {
                match event {
                    TransportEvent::Data(data) => {
                        let request = Request::new(data, from);
                        let response = Response::Udp(transport.responder(&request));
                        // run to completion before the next datagram
                        dispatcher.dispatch(request, response).await;
                    }
                    TransportEvent::Error(e) => {
                        error!("receive error: {}", e);
                    }
                    _ => {}
                }
            }
        });
        *self.inner.listener.lock() = Some(handle);

        info!("UDPDevice {} listening on {}", self.inner.id, local);
        Ok(())
    }

    /// Stop the receive loop and release the socket.
    pub fn stop_listener(&self) {
        if let Some(handle) = self.inner.listener.lock().take() {
            handle.abort();
        }
        *self.inner.transport.lock() = None;
        self.inner.dispatcher.clear();
        info!("UDPDevice {} stopped", self.inner.id);
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.transport()?.local_addr()?)
    }

    fn transport(&self) -> Result<Arc<UdpTransport>> {
        self.inner
            .transport
            .lock()
            .clone()
            .ok_or(DeviceError::NotListening)
    }

    /// The address/port this device writes into reply-to HPAIs. Falls back
    /// to the socket's actual port when configured with port 0.
    fn reply_endpoint(&self) -> (String, u16) {
        let settings = &self.inner.settings;
        let port = if settings.port != 0 {
            settings.port
        } else {
            self.local_addr().map(|a| a.port()).unwrap_or(0)
        };
        (settings.ip_address.clone(), port)
    }

    fn register(
        &self,
        service_type: ServiceType,
        method: fn(UdpDevice, Request, Response) -> futures::future::BoxFuture<'static, ()>,
    ) -> Result<()> {
        let device = self.clone();
        let handler: Handler = Arc::new(move |request, response| {
            method(device.clone(), request, response)
        });
        self.inner.dispatcher.add_typed_callback(service_type, handler)
    }

    async fn send(&self, message: &mut Message, target: SocketAddr) -> Result<()> {
        let transport = self.transport()?;
        let buffer = message.to_buffer()?;
        transport.send_to(&buffer, target).await?;
        info!(
            target = %target,
            service_type = %message.service_type(),
            buffer = %hex(&buffer),
            "sent message"
        );
        Ok(())
    }

    /// Broadcast a SearchRequest to the configured multicast group and mark
    /// the search pending until a response arrives or the timeout elapses.
    /// Structurally multicast-only.
    pub async fn trigger_search_request(&self, timeout: Option<Duration>) -> Result<()> {
        let multicast = self
            .inner
            .settings
            .multicast
            .as_ref()
            .ok_or(DeviceError::NoMulticastConfig)?;
        let target: SocketAddr = format!("{}:{}", multicast.ip_address, multicast.port)
            .parse()
            .map_err(|e| {
                DeviceError::InvalidAddress(multicast.ip_address.clone(), format!("{e}"))
            })?;

        let mut message = messages::search_request();
        let (ip, port) = self.reply_endpoint();
        messages::set_endpoint(&mut message, "hpai", &ip, port);
        self.send(&mut message, target).await?;

        let timeout = timeout.unwrap_or_else(|| self.inner.settings.search_timeout());
        let generation = self.inner.pending_search.lock().begin();
        info!(
            "triggered search request with timeout {:?} (generation {})",
            timeout, generation
        );

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if inner.pending_search.lock().clear_if_current(generation) {
                debug!("search generation {} expired", generation);
            }
        });
        Ok(())
    }

    /// Unicast a DescriptionRequest to a discovered peer. No pending-state
    /// tracking; description exchanges are point-to-point.
    pub async fn trigger_description_request(&self, remote: SocketAddr) -> Result<()> {
        let mut message = messages::description_request();
        let (ip, port) = self.reply_endpoint();
        messages::set_endpoint(&mut message, "hpai", &ip, port);
        self.send(&mut message, remote).await
    }

    /// Unicast a ConnectRequest to a discovered peer.
    pub async fn trigger_connection_request(&self, remote: SocketAddr) -> Result<()> {
        let mut message = messages::connect_request();
        let (ip, port) = self.reply_endpoint();
        messages::set_endpoint(&mut message, "control_endpoint", &ip, port);
        messages::set_endpoint(
            &mut message,
            "data_endpoint",
            &remote.ip().to_string(),
            remote.port(),
        );
        if let Some(cri) = message.structure_mut("cri") {
            self.inner.settings.identity.fill_device_info(cri);
        }
        self.send(&mut message, remote).await
    }

    /// Send a ConnectRequest and wait for the matching ConnectResponse. The
    /// returned outcome carries channel id and status; a rejection status is
    /// reported here, not raised as an error. Times out after `timeout`
    /// (default 10s).
    pub async fn connect(
        &self,
        remote: SocketAddr,
        timeout: Option<Duration>,
    ) -> Result<ConnectOutcome> {
        let (tx, rx) = oneshot::channel();
        self.inner.pending_connects.insert(remote, tx);

        if let Err(e) = self.trigger_connection_request(remote).await {
            self.inner.pending_connects.remove(&remote);
            return Err(e);
        }

        let timeout = timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => {
                if outcome.is_success() {
                    info!(
                        "connected to {} on channel {}",
                        remote, outcome.channel_id
                    );
                } else {
                    warn!(
                        "connect to {} rejected with status {:#04x}: {}",
                        remote,
                        outcome.status,
                        outcome.reason()
                    );
                }
                Ok(outcome)
            }
            _ => {
                self.inner.pending_connects.remove(&remote);
                Err(DeviceError::ConnectTimeout(remote, timeout))
            }
        }
    }

    fn handle_search_response(
        device: UdpDevice,
        request: Request,
        response: Response,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move {
            let timeout = device.inner.settings.search_timeout();
            match device.inner.pending_search.lock().elapsed() {
                None => {
                    debug!(
                        message_id = %request.id(),
                        "ignoring SearchResponse, no pending search request from this device"
                    );
                    return;
                }
                Some(elapsed) if elapsed > timeout => {
                    info!(
                        message_id = %request.id(),
                        "ignoring SearchResponse, pending search request timed out after {:?}",
                        timeout
                    );
                    return;
                }
                Some(elapsed) => {
                    debug!("SearchResponse arrived {:?} after request", elapsed);
                }
            }

            let mut message = messages::search_response();
            if let Err(e) = message.from_buffer(request.data()) {
                warn!(
                    message_id = %request.id(),
                    buffer = %hex(request.data()),
                    "dropping undecodable SearchResponse: {}",
                    e
                );
                return;
            }
            if let Ok((ip, port)) = messages::endpoint(&message, "hpai") {
                info!("received search response from {}:{}", ip, port);
            }
            device.invoke(&device.inner.search_response_callback, request, response, message);
        })
    }

    fn handle_description_response(
        device: UdpDevice,
        request: Request,
        response: Response,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move {
            let mut message = messages::description_response();
            if let Err(e) = message.from_buffer(request.data()) {
                warn!(
                    message_id = %request.id(),
                    buffer = %hex(request.data()),
                    "dropping undecodable DescriptionResponse: {}",
                    e
                );
                return;
            }
            info!(
                "received description response from {}",
                request.remote()
            );
            device.invoke(
                &device.inner.description_response_callback,
                request,
                response,
                message,
            );
        })
    }

    fn handle_connection_response(
        device: UdpDevice,
        request: Request,
        response: Response,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move {
            let mut message = messages::connect_response();
            if let Err(e) = message.from_buffer(request.data()) {
                warn!(
                    message_id = %request.id(),
                    buffer = %hex(request.data()),
                    "dropping undecodable ConnectResponse: {}",
                    e
                );
                return;
            }

            let outcome = match message.structure("connection_base") {
                Some(base) => ConnectOutcome {
                    channel_id: base.uint("CommunicationChannelID").unwrap_or(0) as u8,
                    status: base.uint("Status").unwrap_or(0) as u8,
                },
                None => return,
            };
            if outcome.is_success() {
                info!(
                    "connect response from {}: channel {}",
                    request.remote(),
                    outcome.channel_id
                );
            } else {
                warn!(
                    "connect response from {} reports status {:#04x}: {}",
                    request.remote(),
                    outcome.status,
                    outcome.reason()
                );
            }

            if let Some((_, waiter)) = device.inner.pending_connects.remove(&request.remote()) {
                let _ = waiter.send(outcome);
            }
            device.invoke(
                &device.inner.connection_response_callback,
                request,
                response,
                message,
            );
        })
    }

    fn handle_search_request(
        device: UdpDevice,
        request: Request,
        response: Response,
    ) -> futures::future::BoxFuture<'static, ()> {
        Box::pin(async move {
            // decoded for logging only, the reply needs nothing from it
            let mut incoming = messages::search_request();
            if let Err(e) = incoming.from_buffer(request.data()) {
                warn!(
                    message_id = %request.id(),
                    buffer = %hex(request.data()),
                    "dropping undecodable SearchRequest: {}",
                    e
                );
                return;
            }
            debug!(
                message_id = %request.id(),
                "handling SearchRequest from {}",
                request.remote()
            );

            let mut answer = messages::search_response();
            let (ip, port) = device.reply_endpoint();
            messages::set_endpoint(&mut answer, "hpai", &ip, port);
            if let Some(dib) = answer.structure_mut("dib_hardware") {
                device.inner.settings.identity.fill_device_info(dib);
            }
            // reply targets the request origin, never a configured peer
            if let Err(e) = response.send(&mut answer).await {
                error!("failed to answer SearchRequest: {}", e);
            }
        })
    }

    fn invoke(
        &self,
        slot: &Mutex<Option<MessageCallback>>,
        request: Request,
        response: Response,
        message: Message,
    ) {
        let callback = slot.lock().clone();
        match callback {
            Some(callback) => callback(request, response, message),
            None => {
                debug!("message not forwarded, no callback is provided");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::UdpSocket;

    use knxnet_transport::UdpResponse;

    fn client_settings() -> UdpDeviceSettings {
        UdpDeviceSettings {
            ip_address: "127.0.0.1".to_string(),
            port: 0,
            multicast: None,
            search_timeout_ms: 10_000,
            identity: DeviceIdentity::default(),
        }
    }

    async fn loopback_response() -> Response {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = socket.local_addr().unwrap();
        Response::Udp(UdpResponse::new(Arc::new(socket), target))
    }

    fn search_response_bytes() -> Bytes {
        let mut message = messages::search_response();
        messages::set_endpoint(&mut message, "hpai", "192.168.1.138", 3671);
        let dib = message.structure_mut("dib_hardware").unwrap();
        DeviceIdentity::default().fill_device_info(dib);
        message.to_buffer().unwrap()
    }

    #[test]
    fn test_generation_guard_ignores_stale_reset() {
        let mut pending = PendingSearch::default();
        let first = pending.begin();
        let second = pending.begin();

        // the first search's timer fires after the second search started
        assert!(!pending.clear_if_current(first));
        assert!(pending.elapsed().is_some());

        assert!(pending.clear_if_current(second));
        assert!(pending.elapsed().is_none());
    }

    #[tokio::test]
    async fn test_search_without_multicast_config_fails() {
        let device = UdpDevice::new("d1", client_settings(), DeviceRole::Client);
        device.start_listener().await.unwrap();
        assert!(matches!(
            device.trigger_search_request(None).await,
            Err(DeviceError::NoMulticastConfig)
        ));
        device.stop_listener();
    }

    #[tokio::test]
    async fn test_stale_search_response_never_invokes_callback() {
        let device = UdpDevice::new("d1", client_settings(), DeviceRole::Client);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        device.set_search_response_callback(Arc::new(move |_request, _response, _message| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let remote: SocketAddr = "192.168.1.138:3671".parse().unwrap();
        for _ in 0..3 {
            let request = Request::new(search_response_bytes(), remote);
            UdpDevice::handle_search_response(device.clone(), request, loopback_response().await)
                .await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // with a pending search the same datagram reaches the callback
        device.inner.pending_search.lock().begin();
        let request = Request::new(search_response_bytes(), remote);
        UdpDevice::handle_search_response(device.clone(), request, loopback_response().await).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_connect_resolves_on_response_receipt() {
        // fake gateway answering any datagram with the rejection fixture
        let gateway = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let gateway_addr = gateway.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            if let Ok((_, from)) = gateway.recv_from(&mut buf).await {
                let reply = [0x06, 0x10, 0x02, 0x06, 0x00, 0x08, 0x00, 0x22];
                let _ = gateway.send_to(&reply, from).await;
            }
        });

        let device = UdpDevice::new("d1", client_settings(), DeviceRole::Client);
        device.start_listener().await.unwrap();

        let outcome = device
            .connect(gateway_addr, Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(outcome.channel_id, 0);
        assert_eq!(outcome.status, 0x22);
        assert!(!outcome.is_success());
        assert!(outcome.reason().contains("connection type"));
        device.stop_listener();
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silence() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let silent_addr = silent.local_addr().unwrap();

        let device = UdpDevice::new("d1", client_settings(), DeviceRole::Client);
        device.start_listener().await.unwrap();

        let result = device
            .connect(silent_addr, Some(Duration::from_millis(100)))
            .await;
        assert!(matches!(result, Err(DeviceError::ConnectTimeout(_, _))));
        assert!(device.inner.pending_connects.is_empty());
        device.stop_listener();
    }

    #[tokio::test]
    async fn test_server_answers_search_request_to_origin() {
        let settings = UdpDeviceSettings {
            identity: DeviceIdentity {
                friendly_name: "MYHOME".to_string(),
                ..DeviceIdentity::default()
            },
            ..client_settings()
        };
        let server = UdpDevice::new("srv", settings, DeviceRole::Server);
        server.start_listener().await.unwrap();
        let server_addr = server.local_addr().unwrap();

        // plain socket playing the searching client
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut search = messages::search_request();
        messages::set_endpoint(&mut search, "hpai", "127.0.0.1", 0);
        client
            .send_to(&search.to_buffer().unwrap(), server_addr)
            .await
            .unwrap();

        let mut buf = [0u8; 512];
        let (len, from) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(from, server_addr);

        let mut answer = messages::search_response();
        answer.from_buffer(&buf[..len]).unwrap();
        let dib = answer.structure("dib_hardware").unwrap();
        assert_eq!(dib.text("DeviceFriendlyName").unwrap(), "MYHOME");
        server.stop_listener();
    }
}
