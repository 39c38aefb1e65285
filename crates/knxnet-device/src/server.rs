//! Discoverable server device
//!
//! A server-role UDP device: joins the discovery group when configured and
//! answers every SearchRequest with a SearchResponse filled from its own
//! hardware identity, sent back to the requester's source address.

use std::net::SocketAddr;

use crate::error::Result;
use crate::udp_device::{DeviceRole, UdpDevice, UdpDeviceSettings};

pub struct IpServer {
    device: UdpDevice,
}

impl IpServer {
    pub fn new(id: impl Into<String>, settings: UdpDeviceSettings) -> Self {
        Self {
            device: UdpDevice::new(id, settings, DeviceRole::Server),
        }
    }

    pub fn id(&self) -> &str {
        self.device.id()
    }

    pub fn device(&self) -> &UdpDevice {
        &self.device
    }

    pub async fn power_on(&self) -> Result<()> {
        self.device.start_listener().await
    }

    pub fn power_off(&self) {
        self.device.stop_listener();
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.device.local_addr()
    }
}
