//! moto-link - serial link driver for the USB CAN bridge
//!
//! The bridge is a microcontroller on a USB serial port that forwards
//! discrete 11-bit CAN frames between the host and the bike's diagnostic
//! bus. This crate owns the wire protocol towards that bridge:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       SerialLink                          │
//! │                                                          │
//! │  read loop ──► Deframer ──► ACK channel (lone 0x06/0x15) │
//! │                    │                                     │
//! │                    └──► validate ──► Broadcaster<CanFrame>│
//! │                                                          │
//! │  send_frame ──► write queue ──► write loop ──► port      │
//! │  (ACK wait, retry with backoff)                          │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every frame travels as `0x7E stuffed(body) 0x7F` with a CRC-8 trailer,
//! and is acknowledged by the bridge with a single ACK/NACK byte outside
//! frame boundaries. The [`CanTransport`] trait abstracts the link for the
//! protocol layers; [`mock::MockCan`] implements it in-memory for tests.

pub mod broadcaster;
pub mod codec;
pub mod config;
pub mod frame;
pub mod link;
pub mod mock;
pub mod port;
pub mod transport;

mod error;

pub use broadcaster::{Broadcaster, Subscription, SUBSCRIBER_CAPACITY};
pub use config::LinkConfig;
pub use error::LinkError;
pub use frame::CanFrame;
pub use link::SerialLink;
pub use transport::CanTransport;
