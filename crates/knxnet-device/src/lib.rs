//! KNXnet/IP Device Layer
//!
//! Message dispatch and the device connection state machine on top of the
//! transport crate:
//! - [`Dispatcher`] routes inbound buffers by service type
//! - [`UdpDevice`] drives discovery (search / description / connect)
//! - [`IpServer`] answers SearchRequests with its own identity
//! - [`IpScanner`] collects and describes discovered servers
//! - [`TcpDevice`] is the stream-side connect-then-write counterpart
//! - [`factory`] builds devices from config descriptors

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod factory;
pub mod identity;
pub mod scanner;
pub mod server;
pub mod tcp_device;
pub mod udp_device;

pub use config::{ConfigFile, DeviceConfig};
pub use dispatcher::{Dispatcher, Handler};
pub use error::{DeviceError, Result};
pub use factory::Device;
pub use identity::DeviceIdentity;
pub use scanner::{DiscoveredServer, IpScanner};
pub use server::IpServer;
pub use tcp_device::{EndpointConfig, TcpDevice, TcpDeviceSettings};
pub use udp_device::{
    ConnectOutcome, DeviceRole, MessageCallback, MulticastConfig, UdpDevice, UdpDeviceSettings,
};
