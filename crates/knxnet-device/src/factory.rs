//! Device factory
//!
//! Maps the `type` string of a config descriptor to a concrete device. An
//! unknown type is a configuration mistake and fails the build.

use tracing::info;

use crate::config::{ConfigFile, DeviceConfig};
use crate::error::{DeviceError, Result};
use crate::scanner::IpScanner;
use crate::server::IpServer;
use crate::tcp_device::TcpDevice;

/// A device built from configuration
pub enum Device {
    Server(IpServer),
    Scanner(IpScanner),
    Tcp(TcpDevice),
}

impl Device {
    pub fn id(&self) -> &str {
        match self {
            Device::Server(server) => server.id(),
            Device::Scanner(scanner) => scanner.id(),
            Device::Tcp(device) => device.id(),
        }
    }

    /// Bring the device up: bind, join groups, start the receive loop.
    pub async fn power_on(&self) -> Result<()> {
        match self {
            Device::Server(server) => server.power_on().await,
            Device::Scanner(scanner) => scanner.power_on().await,
            Device::Tcp(device) => {
                device.listen().await?;
                Ok(())
            }
        }
    }

    pub async fn power_off(&self) {
        match self {
            Device::Server(server) => server.power_off(),
            Device::Scanner(scanner) => scanner.power_off(),
            Device::Tcp(device) => device.close().await,
        }
    }
}

/// Build one device from its descriptor.
pub fn build(config: &DeviceConfig) -> Result<Device> {
    let device = match config.device_type.to_lowercase().as_str() {
        "ipserver" | "iprouter" => Device::Server(IpServer::new(
            config.id.clone(),
            serde_json::from_value(config.settings.clone())?,
        )),
        "ipscanner" => Device::Scanner(IpScanner::new(
            config.id.clone(),
            serde_json::from_value(config.settings.clone())?,
        )),
        "tcpdevice" => Device::Tcp(TcpDevice::new(
            config.id.clone(),
            serde_json::from_value(config.settings.clone())?,
        )),
        other => return Err(DeviceError::UnknownDeviceType(other.to_string())),
    };
    info!("built device {} of type {}", config.id, config.device_type);
    Ok(device)
}

/// Build every device in a config file, failing on the first bad descriptor.
pub fn build_all(config: &ConfigFile) -> Result<Vec<Device>> {
    config.devices.iter().map(build).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(device_type: &str, settings: serde_json::Value) -> DeviceConfig {
        DeviceConfig {
            id: "d1".to_string(),
            device_type: device_type.to_string(),
            settings,
        }
    }

    #[test]
    fn test_build_known_types() {
        let udp_settings = serde_json::json!({ "ip_address": "127.0.0.1", "port": 0 });
        assert!(matches!(
            build(&descriptor("IPServer", udp_settings.clone())).unwrap(),
            Device::Server(_)
        ));
        // type matching is case-insensitive, IPRouter aliases the server
        assert!(matches!(
            build(&descriptor("iprouter", udp_settings.clone())).unwrap(),
            Device::Server(_)
        ));
        assert!(matches!(
            build(&descriptor("IPScanner", udp_settings)).unwrap(),
            Device::Scanner(_)
        ));
        assert!(matches!(
            build(&descriptor("TCPDevice", serde_json::json!({}))).unwrap(),
            Device::Tcp(_)
        ));
    }

    #[test]
    fn test_unknown_type_fails() {
        assert!(matches!(
            build(&descriptor("Toaster", serde_json::json!({}))),
            Err(DeviceError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn test_bad_settings_are_a_config_error() {
        let bad = serde_json::json!({ "ip_address": 42 });
        assert!(matches!(
            build(&descriptor("IPServer", bad)),
            Err(DeviceError::Config(_))
        ));
    }
}
