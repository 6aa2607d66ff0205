//! Per-family ECU configuration

use moto_uds::{ECU_ID, TESTER_ID};
use serde::{Deserialize, Serialize};

/// Subfunctions of the family's read-identification service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IdentSubfunctions {
    pub vin: u8,
    pub hardware_id: u8,
    pub software_id: u8,
    pub country: u8,
    pub manufacturer: u8,
    pub model: u8,
}

impl Default for IdentSubfunctions {
    fn default() -> Self {
        Self {
            vin: 0x01,
            hardware_id: 0x02,
            software_id: 0x05,
            country: 0x06,
            manufacturer: 0x07,
            model: 0x08,
        }
    }
}

/// Everything the stack needs to know about one ECU family: addressing,
/// the family-specific service ids and the compatibility allow-lists
/// that gate a discovered ECU.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcuProfile {
    /// Short family name, e.g. `"K01"`.
    pub name: String,
    /// What the family covers, for log output.
    #[serde(default)]
    pub description: String,

    #[serde(default = "default_tester_id")]
    pub tester_id: u16,
    #[serde(default = "default_ecu_id")]
    pub ecu_id: u16,

    /// Identification service, 0x1A on the supported families.
    #[serde(default = "default_read_identification_service")]
    pub read_identification_service: u8,
    /// Family-specific "read errors" service. Not a standard UDS id.
    #[serde(default = "default_read_errors_service")]
    pub read_errors_service: u8,
    /// Family-specific "clear errors" service. Not a standard UDS id.
    #[serde(default = "default_clear_errors_service")]
    pub clear_errors_service: u8,

    #[serde(default)]
    pub ident_subfunctions: IdentSubfunctions,

    /// Hardware ids this stack is known to work with.
    pub compatible_hardware_ids: Vec<String>,
    /// Software ids this stack is known to work with.
    pub compatible_software_ids: Vec<String>,
    /// Model strings this stack is known to work with.
    pub compatible_models: Vec<String>,
}

fn default_tester_id() -> u16 {
    TESTER_ID
}

fn default_ecu_id() -> u16 {
    ECU_ID
}

fn default_read_identification_service() -> u8 {
    0x1A
}

fn default_read_errors_service() -> u8 {
    0x03
}

fn default_clear_errors_service() -> u8 {
    0x04
}

impl EcuProfile {
    /// Built-in profile covering the KTM/Husqvarna/GasGas 690/701/700
    /// Euro 4 models.
    pub fn k01() -> Self {
        Self {
            name: "K01".to_string(),
            description: "KTM/Husqvarna/GasGas 690/701/700 Euro 4".to_string(),
            tester_id: default_tester_id(),
            ecu_id: default_ecu_id(),
            read_identification_service: default_read_identification_service(),
            read_errors_service: default_read_errors_service(),
            clear_errors_service: default_clear_errors_service(),
            ident_subfunctions: IdentSubfunctions::default(),
            compatible_hardware_ids: vec!["613.41.031.300".to_string()],
            compatible_software_ids: vec!["KM2A0EU17H0631".to_string()],
            compatible_models: vec!["FE/FS 701".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn k01_profile_defaults() {
        let profile = EcuProfile::k01();
        assert_eq!(profile.tester_id, 0x7E0);
        assert_eq!(profile.ecu_id, 0x7E8);
        assert_eq!(profile.read_identification_service, 0x1A);
        assert_eq!(profile.ident_subfunctions.hardware_id, 0x02);
        assert_eq!(profile.ident_subfunctions.software_id, 0x05);
        assert_eq!(profile.ident_subfunctions.model, 0x08);
        assert!(profile
            .compatible_hardware_ids
            .contains(&"613.41.031.300".to_string()));
    }
}
