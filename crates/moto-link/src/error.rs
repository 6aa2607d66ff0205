//! Link layer errors

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("no compatible USB serial adapter found")]
    NoPortFound,

    #[error("failed to open serial port {port}: {reason}")]
    PortOpen { port: String, reason: String },

    #[error("serial I/O failed: {0}")]
    Io(String),

    #[error("CAN id 0x{0:X} exceeds 11 bits")]
    InvalidId(u16),

    #[error("invalid DLC value: {0}")]
    InvalidDlc(u8),

    #[error("checksum mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    CrcMismatch { expected: u8, received: u8 },

    #[error("invalid escape sequence 0x1B 0x{0:02X}")]
    InvalidEscape(u8),

    #[error("incomplete frame: expected {expected} body bytes, received {received}")]
    MalformedFrame { expected: usize, received: usize },

    #[error("no acknowledgement from the bridge after retries")]
    NoAck,

    #[error("link is shut down")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,
}
