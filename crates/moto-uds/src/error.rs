//! Transport and session errors

use moto_link::LinkError;
use thiserror::Error;

/// ISO-TP transport errors.
#[derive(Debug, Error)]
pub enum TpError {
    #[error("timeout while waiting for flow control frame from the ECU")]
    FlowControlTimeout,

    #[error("timeout while waiting for consecutive frames from the ECU")]
    ConsecutiveTimeout,

    #[error("unexpected frame index: expected {expected}, received {received}")]
    UnexpectedSequence { expected: u8, received: u8 },

    #[error("payload of {0} bytes exceeds the 4095 byte transport limit")]
    Oversize(usize),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("operation cancelled")]
    Cancelled,
}

/// UDS session errors.
///
/// A negative response from the ECU is not an error: it is returned to the
/// caller as a regular [`crate::Message`] for inspection.
#[derive(Debug, Error)]
pub enum UdsError {
    #[error("timeout waiting for a matching response")]
    ReadTimeout,

    #[error("session is not running")]
    NotRunning,

    #[error(transparent)]
    Transport(#[from] TpError),

    #[error("operation cancelled")]
    Cancelled,
}
