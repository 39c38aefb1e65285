//! Network scanner
//!
//! Client-role composite driving the discovery flow: broadcast a
//! SearchRequest, collect the SearchResponses that arrive inside the
//! timeout window, and ask each discovered server for its description.
//! Connecting to a discovered server is a separate, explicit step.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use knxnet_core::messages;

use crate::error::Result;
use crate::udp_device::{ConnectOutcome, DeviceRole, UdpDevice, UdpDeviceSettings};

/// One server learned from a SearchResponse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub ip_address: String,
    pub port: u16,
    pub friendly_name: String,
    pub serial_number: String,
    /// Set once the server answered a DescriptionRequest
    pub described: bool,
}

impl DiscoveredServer {
    pub fn endpoint(&self) -> Option<SocketAddr> {
        format!("{}:{}", self.ip_address, self.port).parse().ok()
    }
}

/// Add a server to the discovery list unless its endpoint is already known.
fn record_server(servers: &Mutex<Vec<DiscoveredServer>>, server: DiscoveredServer) -> bool {
    let mut servers = servers.lock();
    if servers
        .iter()
        .any(|s| s.ip_address == server.ip_address && s.port == server.port)
    {
        return false;
    }
    servers.push(server);
    true
}

pub struct IpScanner {
    device: UdpDevice,
    servers: Arc<Mutex<Vec<DiscoveredServer>>>,
}

impl IpScanner {
    pub fn new(id: impl Into<String>, settings: UdpDeviceSettings) -> Self {
        Self {
            device: UdpDevice::new(id, settings, DeviceRole::Client),
            servers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn id(&self) -> &str {
        self.device.id()
    }

    pub fn device(&self) -> &UdpDevice {
        &self.device
    }

    /// Install the collection callbacks and start listening.
    pub async fn power_on(&self) -> Result<()> {
        let device = self.device.clone();
        let servers = self.servers.clone();
        self.device
            .set_search_response_callback(Arc::new(move |request, _response, message| {
                let (ip, port) = match messages::endpoint(&message, "hpai") {
                    Ok(endpoint) => endpoint,
                    Err(e) => {
                        warn!("SearchResponse without usable control endpoint: {}", e);
                        return;
                    }
                };
                let (friendly_name, serial_number) = match message.structure("dib_hardware") {
                    Some(dib) => (
                        dib.text("DeviceFriendlyName").unwrap_or_default().to_string(),
                        dib.text("DeviceKNXSerialNumber").unwrap_or_default().to_string(),
                    ),
                    None => (String::new(), String::new()),
                };

                let added = record_server(
                    &servers,
                    DiscoveredServer {
                        ip_address: ip.clone(),
                        port,
                        friendly_name,
                        serial_number,
                        described: false,
                    },
                );
                if !added {
                    debug!("server {}:{} already discovered", ip, port);
                    return;
                }

                // ask the server to describe itself; prefer the announced
                // endpoint, fall back to the datagram's source
                let remote = format!("{ip}:{port}")
                    .parse::<SocketAddr>()
                    .unwrap_or_else(|_| request.remote());
                let device = device.clone();
                tokio::spawn(async move {
                    if let Err(e) = device.trigger_description_request(remote).await {
                        warn!("description request to {} failed: {}", remote, e);
                    }
                });
            }));

        let servers = self.servers.clone();
        self.device
            .set_description_response_callback(Arc::new(move |request, _response, message| {
                let remote = request.remote();
                let friendly_name = message
                    .structure("dib_hardware")
                    .and_then(|dib| dib.text("DeviceFriendlyName").ok().map(str::to_string));
                let mut servers = servers.lock();
                for server in servers.iter_mut() {
                    if server.port == remote.port() && server.ip_address == remote.ip().to_string() {
                        server.described = true;
                        if let Some(name) = &friendly_name {
                            server.friendly_name = name.clone();
                        }
                    }
                }
            }));

        self.device.start_listener().await
    }

    pub fn power_off(&self) {
        self.device.stop_listener();
    }

    /// Broadcast a SearchRequest; responses are collected by the installed
    /// callbacks until the timeout window closes.
    pub async fn search(&self, timeout: Option<Duration>) -> Result<()> {
        self.device.trigger_search_request(timeout).await
    }

    /// Servers discovered so far.
    pub fn servers(&self) -> Vec<DiscoveredServer> {
        self.servers.lock().clone()
    }

    /// Open a connection to a previously discovered server.
    pub async fn connect(
        &self,
        remote: SocketAddr,
        timeout: Option<Duration>,
    ) -> Result<ConnectOutcome> {
        self.device.connect(remote, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DeviceIdentity;
    use crate::server::IpServer;
    use crate::udp_device::MulticastConfig;

    fn settings() -> UdpDeviceSettings {
        UdpDeviceSettings {
            ip_address: "127.0.0.1".to_string(),
            port: 0,
            multicast: None,
            search_timeout_ms: 10_000,
            identity: DeviceIdentity::default(),
        }
    }

    #[tokio::test]
    async fn test_scanner_discovers_loopback_server() {
        let server = IpServer::new(
            "srv",
            UdpDeviceSettings {
                identity: DeviceIdentity {
                    friendly_name: "MYHOME".to_string(),
                    ..DeviceIdentity::default()
                },
                ..settings()
            },
        );
        server.power_on().await.unwrap();
        let server_addr = server.local_addr().unwrap();

        // point the discovery target at the server's unicast address, the
        // send path is identical to the multicast group case
        let scanner = IpScanner::new(
            "scan",
            UdpDeviceSettings {
                multicast: Some(MulticastConfig {
                    ip_address: "127.0.0.1".to_string(),
                    port: server_addr.port(),
                }),
                ..settings()
            },
        );
        scanner.power_on().await.unwrap();
        scanner.search(None).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            while scanner.servers().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let servers = scanner.servers();
        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].friendly_name, "MYHOME");
        assert_eq!(servers[0].ip_address, "127.0.0.1");
        assert_eq!(servers[0].port, server_addr.port());

        scanner.power_off();
        server.power_off();
    }

    #[test]
    fn test_duplicate_search_responses_collapse() {
        let servers = Mutex::new(Vec::new());
        let gateway = DiscoveredServer {
            ip_address: "192.168.1.138".to_string(),
            port: 3671,
            friendly_name: "GW".to_string(),
            serial_number: "0.250.0.0.0.1".to_string(),
            described: false,
        };
        assert!(record_server(&servers, gateway.clone()));
        assert!(!record_server(&servers, gateway.clone()));
        // same host on another port is a distinct server
        assert!(record_server(
            &servers,
            DiscoveredServer {
                port: 3672,
                ..gateway
            }
        ));
        assert_eq!(servers.lock().len(), 2);
        assert!(servers.lock()[0].endpoint().is_some());
    }
}
