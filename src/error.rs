//! Error types for socksd

use thiserror::Error;

/// Main error type for socksd
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid protocol: {0}")]
    InvalidProtocol(String),

    #[error("Unsupported command: {0}")]
    UnsupportedCommand(u8),

    #[error("Address family not supported by this protocol")]
    UnsupportedAddressFamily,

    #[error("Upstream handshake failed: {0}")]
    UpstreamHandshake(String),
}

/// Result type alias for socksd
pub type Result<T> = std::result::Result<T, Error>;
