//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding RSP traffic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unexpected byte {0:#04x} at start of message")]
    UnexpectedByte(u8),

    #[error("checksum mismatch: received {received:02X}, computed {computed:02X}")]
    ChecksumMismatch { received: u8, computed: u8 },

    #[error("invalid checksum digits: {0:?}")]
    InvalidChecksumDigits([u8; 2]),

    #[error("run-length encoded packets are not supported")]
    RleUnsupported,

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

impl ProtocolError {
    /// Returns whether the reader can recover by sending a Nak and reading on.
    ///
    /// Framing faults are recoverable; an RLE marker ends the current read.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProtocolError::RleUnsupported)
    }
}
