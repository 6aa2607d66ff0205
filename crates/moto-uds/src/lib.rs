//! moto-uds - diagnostic protocol stack on top of the CAN bridge
//!
//! Two layers live here:
//!
//! - [`isotp`]: ISO 15765-2 transport. Splits UDS payloads of up to 4095
//!   bytes into single/first/consecutive frames, paces consecutive frames
//!   by the peer's flow control, and reassembles inbound messages.
//! - [`session`]: ISO 14229 session handling. Keeps the ECU awake with a
//!   periodic TesterPresent, decodes every inbound message and fans it out
//!   to subscribers, and correlates responses by service and subfunction.
//!
//! [`Message`] is the shared currency: a request or a positive/negative
//! response with the optional-field rules encoded in the type.

pub mod isotp;
pub mod message;
pub mod nrc;
pub mod service;
pub mod session;
pub mod subfunction;

mod error;

pub use error::{TpError, UdsError};
pub use message::{Body, Message, ECU_ID, TESTER_ID};
pub use nrc::NegativeResponseCode;
pub use session::UdsSession;
