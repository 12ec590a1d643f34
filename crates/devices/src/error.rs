//! Error types for the device links

use thiserror::Error;

/// Socket or serial I/O failure
#[derive(Error, Debug)]
pub enum TransportError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serial port could not be opened or configured
    #[error("Serial port error: {0}")]
    Serial(String),
    /// Connect attempt timed out
    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),
    /// The link is currently down (e.g. during a serial reconnect window)
    #[error("Link not connected")]
    NotConnected,
}

/// Malformed data on one of the device links. Always absorbed locally.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Accumulated object did not parse as JSON
    #[error("Malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// Byte outside the ASCII range in a text protocol
    #[error("Non-ASCII byte {0:#04x} in telemetry stream")]
    NonAscii(u8),
    /// Object still open after the framer's size limit
    #[error("Telemetry object exceeds {0} bytes")]
    Oversized(usize),
}

/// Failure while issuing a device command. Logged and counted, never retried.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The target device link is not available
    #[error("{0} link unavailable")]
    Unavailable(&'static str),
    /// The write itself failed
    #[error("Write failed: {0}")]
    Transport(#[from] TransportError),
    /// Command could not be encoded
    #[error("Encode failed: {0}")]
    Encode(#[from] serde_json::Error),
    /// Gateway is shutting down and no longer emits commands
    #[error("Gateway is shutting down")]
    ShuttingDown,
}

impl From<serialport::Error> for TransportError {
    fn from(err: serialport::Error) -> Self {
        TransportError::Serial(err.to_string())
    }
}

impl From<std::io::Error> for CommandError {
    fn from(err: std::io::Error) -> Self {
        CommandError::Transport(TransportError::Io(err))
    }
}
