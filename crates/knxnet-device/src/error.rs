//! Device error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DeviceError>;

#[derive(Error, Debug)]
pub enum DeviceError {
    /// Search is structurally multicast-only
    #[error("can't send search request without multicast settings")]
    NoMulticastConfig,

    #[error("no remote address configured for {0}")]
    NoRemote(String),

    #[error("device not listening, call start_listener first")]
    NotListening,

    #[error("handler already registered for {0}")]
    DuplicateHandler(String),

    #[error("typed and catch-all registrations are mutually exclusive: {0}")]
    ConflictingHandler(String),

    #[error("no known hardware of type {0}")]
    UnknownDeviceType(String),

    #[error("invalid address {0}: {1}")]
    InvalidAddress(String, String),

    #[error("no connect response from {0} within {1:?}")]
    ConnectTimeout(std::net::SocketAddr, std::time::Duration),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] knxnet_transport::TransportError),

    #[error(transparent)]
    Codec(#[from] knxnet_core::Error),
}

impl From<serde_json::Error> for DeviceError {
    fn from(e: serde_json::Error) -> Self {
        DeviceError::Config(e.to_string())
    }
}
