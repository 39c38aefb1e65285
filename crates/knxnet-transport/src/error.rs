//! Transport error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("accept failed: {0}")]
    AcceptFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encode error: {0}")]
    Encode(#[from] knxnet_core::Error),

    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Other(String),
}
