//! KNXnet/IP protocol constants
//!
//! Code points from the KNX Standard v2.1, 03_08_02 Core. Only the core
//! discovery/connection services carry message implementations; the
//! device-management, tunneling, and routing codes are named here so the
//! dispatcher can report them by name when they show up on the wire.

/// KNXnet/IP protocol version byte
pub const PROTOCOL_VERSION: u8 = 0x10;

/// Header size in bytes, fixed by the standard
pub const HEADER_SIZE: usize = 0x06;

/// HPAI block size in bytes
pub const HPAI_SIZE: usize = 0x08;

/// Hardware DIB size in bytes
pub const HARDWARE_DIB_SIZE: usize = 0x36;

/// Default KNXnet/IP port
pub const DEFAULT_PORT: u16 = 3671;

/// Default discovery multicast group
pub const MULTICAST_ADDRESS: &str = "224.0.23.12";

/// Service type discriminant carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ServiceType {
    /// Sentinel for unidentifiable buffers, never valid on the wire
    Undefined = 0x0000,
    SearchRequest = 0x0201,
    SearchResponse = 0x0202,
    DescriptionRequest = 0x0203,
    DescriptionResponse = 0x0204,
    ConnectRequest = 0x0205,
    ConnectResponse = 0x0206,
    ConnectionStateRequest = 0x0207,
    ConnectionStateResponse = 0x0208,
    DisconnectRequest = 0x0209,
    DisconnectResponse = 0x020A,
    DeviceConfigurationRequest = 0x0310,
    DeviceConfigurationAck = 0x0311,
    TunnelingRequest = 0x0420,
    TunnelingAck = 0x0421,
    RoutingIndication = 0x0530,
    RoutingLostMessage = 0x0531,
}

impl ServiceType {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Map a wire code to a service type; unknown codes become `Undefined`.
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0201 => ServiceType::SearchRequest,
            0x0202 => ServiceType::SearchResponse,
            0x0203 => ServiceType::DescriptionRequest,
            0x0204 => ServiceType::DescriptionResponse,
            0x0205 => ServiceType::ConnectRequest,
            0x0206 => ServiceType::ConnectResponse,
            0x0207 => ServiceType::ConnectionStateRequest,
            0x0208 => ServiceType::ConnectionStateResponse,
            0x0209 => ServiceType::DisconnectRequest,
            0x020A => ServiceType::DisconnectResponse,
            0x0310 => ServiceType::DeviceConfigurationRequest,
            0x0311 => ServiceType::DeviceConfigurationAck,
            0x0420 => ServiceType::TunnelingRequest,
            0x0421 => ServiceType::TunnelingAck,
            0x0530 => ServiceType::RoutingIndication,
            0x0531 => ServiceType::RoutingLostMessage,
            _ => ServiceType::Undefined,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServiceType::Undefined => "UNDEFINED",
            ServiceType::SearchRequest => "SEARCH_REQUEST",
            ServiceType::SearchResponse => "SEARCH_RESPONSE",
            ServiceType::DescriptionRequest => "DESCRIPTION_REQUEST",
            ServiceType::DescriptionResponse => "DESCRIPTION_RESPONSE",
            ServiceType::ConnectRequest => "CONNECT_REQUEST",
            ServiceType::ConnectResponse => "CONNECT_RESPONSE",
            ServiceType::ConnectionStateRequest => "CONNECTIONSTATE_REQUEST",
            ServiceType::ConnectionStateResponse => "CONNECTIONSTATE_RESPONSE",
            ServiceType::DisconnectRequest => "DISCONNECT_REQUEST",
            ServiceType::DisconnectResponse => "DISCONNECT_RESPONSE",
            ServiceType::DeviceConfigurationRequest => "DEVICE_CONFIGURATION_REQUEST",
            ServiceType::DeviceConfigurationAck => "DEVICE_CONFIGURATION_ACK",
            ServiceType::TunnelingRequest => "TUNNELING_REQUEST",
            ServiceType::TunnelingAck => "TUNNELING_ACK",
            ServiceType::RoutingIndication => "ROUTING_INDICATION",
            ServiceType::RoutingLostMessage => "ROUTING_LOST_MESSAGE",
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Service families announced in the supported-service-family DIB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServiceFamily {
    Core = 0x02,
    DeviceManagement = 0x03,
    Tunneling = 0x04,
    Routing = 0x05,
    RemoteLogging = 0x06,
    RemoteConfigAndDiag = 0x07,
    ObjectServer = 0x08,
}

impl ServiceFamily {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Host protocol codes carried in an HPAI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HostProtocol {
    Ipv4Udp = 0x01,
    Ipv4Tcp = 0x02,
}

impl HostProtocol {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Description type codes identifying DIB variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DescriptionType {
    DeviceInfo = 0x01,
    SuppSvcFamilies = 0x02,
    IpConfig = 0x03,
    IpCurConfig = 0x04,
    KnxAddresses = 0x05,
    ManufacturerData = 0xFE,
}

impl DescriptionType {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// KNX medium codes for the hardware DIB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KnxMedium {
    Tp1 = 0x02,
    Pl110 = 0x04,
    Rf = 0x10,
    KnxIp = 0x20,
}

impl KnxMedium {
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

/// Device status bits: programming mode on/off
pub const PROG_MODE_ON: u8 = 0x01;
pub const PROG_MODE_OFF: u8 = 0x00;

/// Connection type codes for the CRI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionType {
    DeviceMgmt = 0x03,
    Tunnel = 0x04,
    RemoteLogging = 0x06,
    RemoteConfiguration = 0x07,
    ObjectServer = 0x08,
}

/// Tunneling layer codes
pub const TUNNEL_LINKLAYER: u8 = 0x02;
pub const TUNNEL_RAW: u8 = 0x04;
pub const TUNNEL_BUSMONITOR: u8 = 0x80;

/// Status codes reported in a ConnectResponse base block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectStatus {
    NoError = 0x00,
    HostProtocolType = 0x01,
    VersionNotSupported = 0x02,
    SequenceNumber = 0x04,
    ConnectionStateLost = 0x15,
    ConnectionId = 0x21,
    ConnectionType = 0x22,
    ConnectionOption = 0x23,
    NoMoreConnections = 0x24,
    DataConnection = 0x26,
    KnxConnection = 0x27,
    TunnelingLayer = 0x29,
}

impl ConnectStatus {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(ConnectStatus::NoError),
            0x01 => Some(ConnectStatus::HostProtocolType),
            0x02 => Some(ConnectStatus::VersionNotSupported),
            0x04 => Some(ConnectStatus::SequenceNumber),
            0x15 => Some(ConnectStatus::ConnectionStateLost),
            0x21 => Some(ConnectStatus::ConnectionId),
            0x22 => Some(ConnectStatus::ConnectionType),
            0x23 => Some(ConnectStatus::ConnectionOption),
            0x24 => Some(ConnectStatus::NoMoreConnections),
            0x26 => Some(ConnectStatus::DataConnection),
            0x27 => Some(ConnectStatus::KnxConnection),
            0x29 => Some(ConnectStatus::TunnelingLayer),
            _ => None,
        }
    }

    /// Human-readable rejection reason for logging.
    pub fn describe(&self) -> &'static str {
        match self {
            ConnectStatus::NoError => "connection established successfully",
            ConnectStatus::HostProtocolType => "host protocol type not supported",
            ConnectStatus::VersionNotSupported => "protocol version not supported",
            ConnectStatus::SequenceNumber => "sequence number out of order",
            ConnectStatus::ConnectionStateLost => "connection state lost",
            ConnectStatus::ConnectionId => "no active data connection with the given id",
            ConnectStatus::ConnectionType => "requested connection type not supported",
            ConnectStatus::ConnectionOption => "requested connection option not supported",
            ConnectStatus::NoMoreConnections => "maximum concurrent connections reached",
            ConnectStatus::DataConnection => "error concerning the data connection",
            ConnectStatus::KnxConnection => "error concerning the KNX bus connection",
            ConnectStatus::TunnelingLayer => "requested tunneling layer not supported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_code_roundtrip() {
        for st in [
            ServiceType::SearchRequest,
            ServiceType::SearchResponse,
            ServiceType::DescriptionRequest,
            ServiceType::DescriptionResponse,
            ServiceType::ConnectRequest,
            ServiceType::ConnectResponse,
            ServiceType::DisconnectResponse,
            ServiceType::RoutingLostMessage,
        ] {
            assert_eq!(ServiceType::from_code(st.code()), st);
        }
    }

    #[test]
    fn test_unknown_code_is_undefined() {
        assert_eq!(ServiceType::from_code(0xBEEF), ServiceType::Undefined);
        assert_eq!(ServiceType::from_code(0x020B), ServiceType::Undefined);
    }

    #[test]
    fn test_connect_status_describe() {
        let status = ConnectStatus::from_code(0x24).unwrap();
        assert_eq!(status, ConnectStatus::NoMoreConnections);
        assert!(status.describe().contains("maximum"));
        assert!(ConnectStatus::from_code(0xFF).is_none());
    }
}
