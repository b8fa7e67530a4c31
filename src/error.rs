//! Error types for Lorax.

use std::io;

use thiserror::Error;
use uuid::Uuid;

use crate::protocol::Opcode;

/// Result type alias for Lorax operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Lorax.
#[derive(Error, Debug)]
pub enum Error {
    // Session establishment errors
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    // Transport errors
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("transport busy after {attempts} attempts")]
    TransportBusy { attempts: u32 },

    #[error("device disconnected")]
    Disconnected,

    #[error("reply timeout for {opcode} (seq {sequence})")]
    ReplyTimeout { opcode: Opcode, sequence: u16 },

    // Protocol errors
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("operation not supported in {0} mode")]
    Unsupported(&'static str),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Transport layer errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("another GATT operation is in progress")]
    Busy,

    #[error("not connected")]
    NotConnected,

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),

    #[error("pairing rejected: {0}")]
    PairingRejected(String),
}

/// Protocol parsing and handling errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame truncated: {len} bytes (need {need})")]
    Truncated { len: usize, need: usize },

    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("device reported error for {opcode}")]
    DeviceError { opcode: Opcode },

    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),

    #[error("path too long: {len} bytes (max {max})")]
    PathTooLong { len: usize, max: usize },

    #[error("profile index {0} out of range")]
    InvalidProfileIndex(usize),

    #[error("path {0} is not open")]
    NotOpen(String),
}

impl Error {
    /// Check if error is recoverable (operation may be retried).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransportBusy { .. }
                | Error::Transport(TransportError::Busy)
                | Error::ReplyTimeout { .. }
                | Error::Protocol(ProtocolError::DeviceError { .. })
        )
    }

    /// Check if error leaves the session unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectFailed(_)
                | Error::HandshakeFailed(_)
                | Error::Disconnected
                | Error::Transport(TransportError::NotConnected)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_handshake_are_distinct() {
        let connect = Error::ConnectFailed("no lorax service".into());
        let handshake = Error::HandshakeFailed("unlock rejected".into());

        assert!(connect.is_fatal());
        assert!(handshake.is_fatal());
        assert_ne!(connect.to_string(), handshake.to_string());
        assert!(matches!(connect, Error::ConnectFailed(_)));
        assert!(matches!(handshake, Error::HandshakeFailed(_)));
    }

    #[test]
    fn test_recoverable() {
        assert!(Error::TransportBusy { attempts: 3 }.is_recoverable());
        assert!(Error::from(TransportError::Busy).is_recoverable());
        assert!(!Error::Disconnected.is_recoverable());
    }
}
