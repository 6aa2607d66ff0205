//! moto-ecu - ECU discovery and diagnostic operations
//!
//! Sits on top of the UDS session layer. [`EcuManager`] probes the bus
//! for known ECU families, gates them against per-family compatibility
//! lists, and owns the connect/disconnect lifecycle. A connected [`Ecu`]
//! exposes the diagnostic operations: reading and clearing trouble codes
//! and unlocking security access with the family's seed/key scheme.

pub mod dtc;
pub mod ecu;
pub mod manager;
pub mod profile;
pub mod seedkey;

mod error;

pub use dtc::{Dtc, DtcDictionary, EmptyDictionary};
pub use ecu::{Ecu, EcuIdentification};
pub use error::{EcuError, KeygenError};
pub use manager::{EcuEvent, EcuManager};
pub use profile::EcuProfile;
