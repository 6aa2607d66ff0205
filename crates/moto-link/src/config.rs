//! Link configuration

use serde::{Deserialize, Serialize};

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Explicit serial port name. When absent the port is discovered by
    /// scanning for a supported USB vendor id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Baud rate of the bridge firmware.
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    921_600
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: default_baud_rate(),
        }
    }
}
