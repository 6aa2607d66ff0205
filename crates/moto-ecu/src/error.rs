//! ECU lifecycle and key generation errors

use moto_uds::{NegativeResponseCode, UdsError};
use thiserror::Error;

/// Seed/key derivation errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum KeygenError {
    #[error("no key generation magic is known for level {0}")]
    MissingMagic(u8),

    #[error("invalid security access level {0}")]
    InvalidLevel(u8),
}

#[derive(Debug, Error)]
pub enum EcuError {
    #[error("incompatible {field}: {value}")]
    Incompatible { field: &'static str, value: String },

    #[error("no ECU is connected")]
    NotConnected,

    #[error("unknown ECU: {0}")]
    UnknownEcu(String),

    #[error("negative response to service 0x{service_id:02X}: {nrc}")]
    NegativeResponse {
        service_id: u8,
        nrc: NegativeResponseCode,
    },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Uds(#[from] UdsError),

    #[error(transparent)]
    Keygen(#[from] KeygenError),

    #[error("operation cancelled")]
    Cancelled,
}

impl EcuError {
    /// Whether the error came from cooperative shutdown rather than a
    /// fault; such errors are never worth an error-severity log line.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            EcuError::Cancelled | EcuError::Uds(UdsError::Cancelled)
        )
    }
}
