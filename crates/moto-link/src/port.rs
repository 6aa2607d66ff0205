//! Bridge adapter discovery and serial port setup

use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tracing::{debug, info};

use crate::{LinkConfig, LinkError};

/// USB vendor ids the bridge boards enumerate with.
const SUPPORTED_VENDOR_IDS: [u16; 3] = [0x2341, 0x1A86, 0x2A03];

/// Grace period between enumeration and open so the adapter can settle.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Per-byte read timeout used by the link's read loop.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_millis(5);

/// Name of the first serial port backed by a supported USB adapter.
pub fn find_adapter_port() -> Result<String, LinkError> {
    let ports = serialport::available_ports().map_err(|e| LinkError::Io(e.to_string()))?;
    for port in ports {
        if let SerialPortType::UsbPort(usb) = &port.port_type {
            if SUPPORTED_VENDOR_IDS.contains(&usb.vid) {
                debug!(
                    port = %port.port_name,
                    vid = format!("0x{:04X}", usb.vid),
                    "found bridge adapter"
                );
                return Ok(port.port_name);
            }
        }
    }
    Err(LinkError::NoPortFound)
}

/// Discover (unless configured) and open the adapter port, 8N1.
pub async fn open_adapter(config: &LinkConfig) -> Result<Box<dyn SerialPort>, LinkError> {
    let name = match &config.port {
        Some(name) => name.clone(),
        None => find_adapter_port()?,
    };

    tokio::time::sleep(SETTLE_DELAY).await;

    let baud_rate = config.baud_rate;
    let open_name = name.clone();
    let port = tokio::task::spawn_blocking(move || {
        serialport::new(&open_name, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
    })
    .await
    .map_err(|e| LinkError::Io(e.to_string()))?
    .map_err(|e| LinkError::PortOpen {
        port: name.clone(),
        reason: e.to_string(),
    })?;

    info!(port = %name, baud_rate, "serial port open");
    Ok(port)
}
